//! Messages, data records and blobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::model::Bytes32;

/// Transaction types a message can be anchored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[default]
    BatchPin,
    None,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::BatchPin => f.write_str("batch_pin"),
            TransactionType::None => f.write_str("none"),
        }
    }
}

/// Broadcast message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Broadcast,
    Definition,
    TransferBroadcast,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::Broadcast => "broadcast",
            MessageType::Definition => "definition",
            MessageType::TransferBroadcast => "transfer_broadcast",
        };
        f.write_str(s)
    }
}

/// Reference to the transaction a batch is anchored by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionRef {
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub id: Uuid,
}

impl TransactionRef {
    pub fn new_batch_pin() -> Self {
        Self {
            tx_type: TransactionType::BatchPin,
            id: Uuid::new_v4(),
        }
    }
}

/// Identity used to sign a message: the author DID/name plus the signing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct SignerRef {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    #[default]
    Ready,
    Sent,
    Confirmed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<Uuid>,
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(rename = "txtype")]
    pub tx_type: TransactionType,
    #[serde(flatten)]
    pub signer: SignerRef,
    pub created: DateTime<Utc>,
    pub namespace: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datahash: Option<Bytes32>,
}

/// Reference from a message to one of its data records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRef {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<Bytes32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub header: MessageHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<Bytes32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<Uuid>,
    #[serde(default)]
    pub state: MessageState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: Vec<DataRef>,
}

impl Message {
    /// Compute the data hash and the message hash.
    ///
    /// The data hash covers the hashes of the referenced data in order; the
    /// message hash covers the serialized header (which includes the data hash).
    pub fn seal(&mut self) -> Result<(), serde_json::Error> {
        let data_hashes: Vec<[u8; 32]> = self
            .data
            .iter()
            .map(|d| d.hash.unwrap_or_default().0)
            .collect();
        self.header.datahash = Some(Bytes32::hash_parts(data_hashes.iter()));
        let header = serde_json::to_vec(&self.header)?;
        self.hash = Some(Bytes32::hash(header));
        Ok(())
    }

    /// Rough serialized size, used for batch byte limits.
    pub fn estimate_size(&self) -> u64 {
        serde_json::to_vec(self).map(|v| v.len() as u64).unwrap_or(0)
    }
}

/// Blob descriptor attached to a data record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub hash: Bytes32,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub name: String,
    /// Shared-storage reference, set once the blob has been published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub id: Uuid,
    pub validator: String,
    pub namespace: String,
    pub hash: Bytes32,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<BlobRef>,
}

impl Data {
    /// A new value-only data record, hashed over its JSON serialization.
    pub fn from_value(
        namespace: &str,
        validator: &str,
        value: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let hash = Bytes32::hash(serde_json::to_vec(&value)?);
        Ok(Self {
            id: Uuid::new_v4(),
            validator: validator.to_string(),
            namespace: namespace.to_string(),
            hash,
            created: Utc::now(),
            value: Some(value),
            blob: None,
        })
    }

    /// A new data record wrapping an uploaded blob.
    pub fn from_blob(namespace: &str, blob: BlobRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            validator: "none".to_string(),
            namespace: namespace.to_string(),
            hash: blob.hash,
            created: Utc::now(),
            value: None,
            blob: Some(blob),
        }
    }

    pub fn data_ref(&self) -> DataRef {
        DataRef {
            id: self.id,
            hash: Some(self.hash),
        }
    }
}

/// Blob held by the private data transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub hash: Bytes32,
    /// Private transport reference the content can be downloaded from.
    pub payload_ref: String,
    pub size: u64,
    pub created: DateTime<Utc>,
}

/// A data record together with the blob it references.
#[derive(Debug, Clone, PartialEq)]
pub struct DataAndBlob {
    pub data: Data,
    pub blob: Blob,
}

/// Inline data supplied with a new message: either a value or a reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InlineData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<Bytes32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// Caller-supplied header fields of a new message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageHeaderInput {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<MessageType>,
    #[serde(default, rename = "txtype", skip_serializing_if = "Option::is_none")]
    pub tx_type: Option<TransactionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<Uuid>,
    #[serde(flatten)]
    pub signer: SignerRef,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub tag: String,
}

/// A new message as submitted over the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageInput {
    #[serde(default)]
    pub header: MessageHeaderInput,
    #[serde(default)]
    pub data: Vec<InlineData>,
}

impl MessageInput {
    /// Convenience for a message with a single inline JSON value.
    pub fn with_value(value: serde_json::Value) -> Self {
        Self {
            header: MessageHeaderInput::default(),
            data: vec![InlineData {
                value: Some(value),
                ..Default::default()
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> MessageHeader {
        MessageHeader {
            id: Uuid::new_v4(),
            cid: None,
            msg_type: MessageType::Broadcast,
            tx_type: TransactionType::BatchPin,
            signer: SignerRef {
                author: "org1".into(),
                key: "0x1234".into(),
            },
            created: Utc::now(),
            namespace: "ns1".into(),
            topics: vec!["topic1".into()],
            tag: String::new(),
            datahash: None,
        }
    }

    #[test]
    fn test_seal_sets_hashes() {
        let data = Data::from_value("ns1", "json", serde_json::json!({"a": 1})).unwrap();
        let mut msg = Message {
            header: header(),
            hash: None,
            batch: None,
            state: MessageState::Ready,
            confirmed: None,
            data: vec![data.data_ref()],
        };
        msg.seal().unwrap();
        assert_eq!(msg.header.datahash, Some(Bytes32::hash(data.hash.0)));
        assert!(msg.hash.is_some());
    }

    #[test]
    fn test_message_type_wire_names() {
        let json = serde_json::to_string(&MessageType::TransferBroadcast).unwrap();
        assert_eq!(json, "\"transfer_broadcast\"");
        assert_eq!(TransactionType::BatchPin.to_string(), "batch_pin");
    }

    #[test]
    fn test_header_signer_is_flattened() {
        let value = serde_json::to_value(header()).unwrap();
        assert_eq!(value["author"], "org1");
        assert_eq!(value["type"], "broadcast");
        assert_eq!(value["txtype"], "batch_pin");
    }
}
