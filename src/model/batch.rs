//! Sealed batches of messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Bytes32, Data, Message, SignerRef, TransactionRef};

/// The content published to shared storage for a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPayload {
    pub tx: TransactionRef,
    pub messages: Vec<Message>,
    pub data: Vec<Data>,
}

impl BatchPayload {
    /// SHA-256 over the payload content. Blob public references are left out:
    /// they are filled in after sealing and only say where content lives.
    pub fn content_hash(&self) -> Result<Bytes32, serde_json::Error> {
        let mut content = self.clone();
        for blob in content.data.iter_mut().filter_map(|d| d.blob.as_mut()) {
            blob.public = None;
        }
        Ok(Bytes32::hash(serde_json::to_vec(&content)?))
    }
}

/// A sealed group of messages, dispatched and anchored together.
///
/// Immutable once handed to a dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub namespace: String,
    #[serde(flatten)]
    pub signer: SignerRef,
    /// Content hash of the payload, see [`BatchPayload::content_hash`].
    pub hash: Bytes32,
    pub created: DateTime<Utc>,
    pub payload: BatchPayload,
    /// Shared-storage reference of the uploaded payload, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_ref: Option<String>,
}

impl Batch {
    /// Seal a new batch over the given messages and data.
    pub fn seal(
        namespace: &str,
        signer: SignerRef,
        tx: TransactionRef,
        messages: Vec<Message>,
        data: Vec<Data>,
    ) -> Result<Self, serde_json::Error> {
        let payload = BatchPayload { tx, messages, data };
        let hash = payload.content_hash()?;
        Ok(Self {
            id: Uuid::new_v4(),
            namespace: namespace.to_string(),
            signer,
            hash,
            created: Utc::now(),
            payload,
            payload_ref: None,
        })
    }

    /// The anchoring transaction this batch belongs to.
    pub fn tx(&self) -> &TransactionRef {
        &self.payload.tx
    }

    pub fn message_ids(&self) -> Vec<Uuid> {
        self.payload.messages.iter().map(|m| m.header.id).collect()
    }

    /// Copy blob public references from `records` into the payload.
    /// Returns false when nothing changed.
    pub fn apply_public_refs(&mut self, records: &[Data]) -> bool {
        let mut changed = false;
        for entry in self.payload.data.iter_mut() {
            let Some(blob) = entry.blob.as_mut() else {
                continue;
            };
            let public = records
                .iter()
                .find(|r| r.id == entry.id)
                .and_then(|r| r.blob.as_ref())
                .and_then(|b| b.public.clone());
            if public.is_some() && blob.public != public {
                blob.public = public;
                changed = true;
            }
        }
        changed
    }
}
