//! Definitions that are broadcast as system messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Bytes32;

/// Namespace system definitions (such as namespaces) are broadcast on.
pub const SYSTEM_NAMESPACE: &str = "ff_system";
/// Validator of the data carried by definition messages.
pub const DEFINITION_VALIDATOR: &str = "definition";
pub const DEFINITION_TOPIC: &str = "ff_definition";
pub const TAG_DEFINE_DATATYPE: &str = "ff_define_datatype";
pub const TAG_DEFINE_NAMESPACE: &str = "ff_define_namespace";
pub const TAG_DEFINE_POOL: &str = "ff_define_pool";

/// Anything that can be serialized into a definition message.
pub trait Definition: Serialize + Send + Sync {
    /// Topic the definition message is ordered on.
    fn topic(&self) -> String;

    /// Record the ID of the message carrying this definition.
    fn set_broadcast_message(&mut self, msg_id: Uuid);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Datatype {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Uuid>,
    #[serde(default)]
    pub validator: String,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<Bytes32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl Definition for Datatype {
    fn topic(&self) -> String {
        format!("{}_{}", DEFINITION_TOPIC, self.namespace)
    }

    fn set_broadcast_message(&mut self, msg_id: Uuid) {
        self.message = Some(msg_id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceType {
    Local,
    #[default]
    Broadcast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NamespaceDef {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub ns_type: NamespaceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl Definition for NamespaceDef {
    fn topic(&self) -> String {
        DEFINITION_TOPIC.to_string()
    }

    fn set_broadcast_message(&mut self, msg_id: Uuid) {
        self.message = Some(msg_id);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Identity {
    pub id: Uuid,
    pub did: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Uuid>,
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Uuid>,
}

/// Claim of an identity, broadcast so other members can verify it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IdentityClaim {
    pub identity: Identity,
}

impl Definition for IdentityClaim {
    fn topic(&self) -> String {
        format!("{}_identity_{}", DEFINITION_TOPIC, self.identity.did)
    }

    fn set_broadcast_message(&mut self, msg_id: Uuid) {
        self.identity.message = Some(msg_id);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TokenPool {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub standard: String,
    #[serde(default)]
    pub locator: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TokenPoolAnnouncement {
    pub pool: TokenPool,
}

impl Definition for TokenPoolAnnouncement {
    fn topic(&self) -> String {
        format!("{}_pool_{}", DEFINITION_TOPIC, self.pool.namespace)
    }

    fn set_broadcast_message(&mut self, msg_id: Uuid) {
        self.pool.message = Some(msg_id);
    }
}

/// Check a name is 1-64 characters of `[0-9a-zA-Z._-]`, starting and ending
/// with an alphanumeric.
pub fn validate_name(name: &str) -> Result<(), String> {
    let valid_char = |c: char| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-';
    let bytes = name.as_bytes();
    if name.is_empty() || name.len() > 64 {
        return Err(format!("name '{}' must be 1-64 characters", name));
    }
    if !name.chars().all(valid_char) {
        return Err(format!("name '{}' contains invalid characters", name));
    }
    if !bytes[0].is_ascii_alphanumeric() || !bytes[bytes.len() - 1].is_ascii_alphanumeric() {
        return Err(format!("name '{}' must start and end with a letter or digit", name));
    }
    Ok(())
}
