//! Durable records of side-effecting attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    /// Upload of a sealed batch payload to shared storage.
    SharedStorageBatchBroadcast,
    /// Submission of a batch's pins to the ledger.
    BlockchainPinBatch,
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpType::SharedStorageBatchBroadcast => f.write_str("sharedstorage_batch_broadcast"),
            OpType::BlockchainPinBatch => f.write_str("blockchain_pin_batch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

/// Natural key of an operation. At most one record exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationKey {
    pub namespace: String,
    pub tx: Uuid,
    pub op_type: OpType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub namespace: String,
    pub tx: Uuid,
    #[serde(rename = "type")]
    pub op_type: OpType,
    pub status: OpStatus,
    /// Name of the plugin that performs the action.
    pub plugin: String,
    #[serde(default)]
    pub input: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Operation {
    pub fn new(plugin: &str, namespace: &str, tx: Uuid, op_type: OpType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            namespace: namespace.to_string(),
            tx,
            op_type,
            status: OpStatus::Pending,
            plugin: plugin.to_string(),
            input: serde_json::Map::new(),
            output: None,
            error: None,
            created: now,
            updated: now,
        }
    }

    pub fn key(&self) -> OperationKey {
        OperationKey {
            namespace: self.namespace.clone(),
            tx: self.tx,
            op_type: self.op_type,
        }
    }

    pub fn with_input(mut self, key: &str, value: serde_json::Value) -> Self {
        self.input.insert(key.to_string(), value);
        self
    }

    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.input.get(key).and_then(|v| v.as_str())
    }

    pub fn input_uuid(&self, key: &str) -> Option<Uuid> {
        self.input_str(key).and_then(|s| s.parse().ok())
    }

    pub fn output_str(&self, key: &str) -> Option<&str> {
        self.output.as_ref().and_then(|o| o.get(key)).and_then(|v| v.as_str())
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == OpStatus::Succeeded
    }
}

/// Targeted update of an operation's outcome fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OperationUpdate {
    pub status: Option<OpStatus>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl OperationUpdate {
    pub fn succeeded(output: Option<serde_json::Value>) -> Self {
        Self {
            status: Some(OpStatus::Succeeded),
            output,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(OpStatus::Failed),
            output: None,
            error: Some(error.into()),
        }
    }
}

/// In-memory projection of an operation, ready to execute.
///
/// `data` is the handler-specific typed action; only the handler that
/// produced it knows its concrete type.
pub struct PreparedOperation {
    pub id: Uuid,
    pub namespace: String,
    pub plugin: String,
    pub op_type: OpType,
    pub data: Box<dyn Any + Send + Sync>,
}

impl PreparedOperation {
    pub fn new<T: Any + Send + Sync>(op: &Operation, data: T) -> Self {
        Self {
            id: op.id,
            namespace: op.namespace.clone(),
            plugin: op.plugin.clone(),
            op_type: op.op_type,
            data: Box::new(data),
        }
    }

    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }
}

impl fmt::Debug for PreparedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedOperation")
            .field("id", &self.id)
            .field("namespace", &self.namespace)
            .field("plugin", &self.plugin)
            .field("op_type", &self.op_type)
            .finish()
    }
}
