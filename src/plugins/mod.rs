//! Backend plugin capabilities.
//!
//! # Data Flow
//! ```text
//! Dispatch coordinator / blob publisher
//!     → DataExchange::download_blob    (private transport, scoped stream)
//!     → SharedStorage::publish_data    (content-addressed upload)
//!     → Database::update_data          (targeted field update)
//!     → Blockchain::submit_batch_pin   (ledger anchoring, via batchpin)
//! ```
//!
//! # Design Decisions
//! - Each backend is a narrow trait; production and test implementations
//!   share the identical surface
//! - Every call takes the caller's [`Context`] for cancellation and deadlines
//! - Records are only ever changed through inserts and targeted updates

pub mod database;
pub mod dataexchange;
pub mod ipfs;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::context::Context;
use crate::model::{
    Batch, Blob, Bytes32, Data, Message, MessageState, Operation, OperationUpdate,
};

pub use database::LocalDatabase;
pub use dataexchange::HttpDataExchange;
pub use ipfs::IpfsStorage;

/// Errors reported by backend plugins.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PluginError {
    /// The backend rejected or failed the request.
    #[error("{plugin} request failed: {message}")]
    Request { plugin: String, message: String },

    /// The referenced record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Local I/O failure (snapshot files, stream reads).
    #[error("I/O error: {0}")]
    Io(String),

    /// The caller's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the backend responded.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl PluginError {
    pub fn request(plugin: &str, message: impl std::fmt::Display) -> Self {
        Self::Request {
            plugin: plugin.to_string(),
            message: message.to_string(),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, PluginError::Cancelled | PluginError::DeadlineExceeded)
    }
}

impl From<std::io::Error> for PluginError {
    fn from(e: std::io::Error) -> Self {
        PluginError::Io(e.to_string())
    }
}

/// Result type for plugin calls.
pub type PluginResult<T> = Result<T, PluginError>;

/// Byte stream handed between plugins. Dropping it releases the underlying
/// transfer.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Targeted update of a data record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataUpdate {
    /// New value for `blob.public`.
    pub blob_public: Option<String>,
}

impl DataUpdate {
    pub fn blob_public(public_ref: impl Into<String>) -> Self {
        Self {
            blob_public: Some(public_ref.into()),
        }
    }
}

/// Targeted update of a message record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageUpdate {
    pub state: Option<MessageState>,
    pub batch: Option<Uuid>,
}

/// Persistence layer.
#[async_trait]
pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    /// Insert the operation unless one already exists for its natural key,
    /// returning whichever record is persisted.
    async fn insert_operation_or_get(&self, ctx: &Context, op: Operation) -> PluginResult<Operation>;

    async fn get_operation(&self, ctx: &Context, id: &Uuid) -> PluginResult<Option<Operation>>;

    async fn update_operation(
        &self,
        ctx: &Context,
        id: &Uuid,
        update: OperationUpdate,
    ) -> PluginResult<()>;

    async fn upsert_batch(&self, ctx: &Context, batch: &Batch) -> PluginResult<()>;

    async fn get_batch(&self, ctx: &Context, id: &Uuid) -> PluginResult<Option<Batch>>;

    /// Set the shared-storage reference of a batch payload.
    async fn update_batch_payload_ref(
        &self,
        ctx: &Context,
        id: &Uuid,
        payload_ref: &str,
    ) -> PluginResult<()>;

    async fn insert_message(&self, ctx: &Context, msg: &Message) -> PluginResult<()>;

    async fn get_message(&self, ctx: &Context, id: &Uuid) -> PluginResult<Option<Message>>;

    async fn update_message(
        &self,
        ctx: &Context,
        id: &Uuid,
        update: MessageUpdate,
    ) -> PluginResult<()>;

    async fn insert_data(&self, ctx: &Context, data: &Data) -> PluginResult<()>;

    async fn get_data(&self, ctx: &Context, id: &Uuid) -> PluginResult<Option<Data>>;

    async fn update_data(&self, ctx: &Context, id: &Uuid, update: DataUpdate) -> PluginResult<()>;

    async fn insert_blob(&self, ctx: &Context, blob: &Blob) -> PluginResult<()>;

    async fn get_blob(&self, ctx: &Context, hash: &Bytes32) -> PluginResult<Option<Blob>>;
}

/// Content-addressable shared storage network.
#[async_trait]
pub trait SharedStorage: Send + Sync {
    fn name(&self) -> &str;

    /// Upload the stream, returning a stable public reference.
    async fn publish_data(&self, ctx: &Context, data: BlobReader) -> PluginResult<String>;
}

/// Result of uploading a blob to the private transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedBlob {
    pub payload_ref: String,
    pub hash: Bytes32,
    pub size: u64,
}

/// Peer-to-peer private data transport.
#[async_trait]
pub trait DataExchange: Send + Sync {
    fn name(&self) -> &str;

    /// Open a read stream for a blob held by the transport.
    async fn download_blob(&self, ctx: &Context, payload_ref: &str) -> PluginResult<BlobReader>;

    async fn upload_blob(
        &self,
        ctx: &Context,
        namespace: &str,
        id: &Uuid,
        content: Vec<u8>,
    ) -> PluginResult<UploadedBlob>;
}

/// Everything the ledger needs to anchor one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPin {
    pub namespace: String,
    pub transaction_id: Uuid,
    pub batch_id: Uuid,
    pub batch_hash: Bytes32,
    pub payload_ref: String,
    pub contexts: Vec<Bytes32>,
}

/// Distributed ledger.
#[async_trait]
pub trait Blockchain: Send + Sync {
    fn name(&self) -> &str;

    /// Submit the anchoring transaction for a batch, signed by `signing_key`.
    async fn submit_batch_pin(
        &self,
        ctx: &Context,
        signing_key: &str,
        pin: &BatchPin,
    ) -> PluginResult<()>;
}
