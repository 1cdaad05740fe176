//! Domain types shared by every subsystem.
//!
//! # Data Flow
//! ```text
//! MessageInput (API)
//!     → Message + Data (sealed, staged)
//!     → Batch (sealed by the scheduler, with one pin per message)
//!     → Operation records (upload, pin) tracked per batch transaction
//! ```

pub mod batch;
pub mod bytes32;
pub mod definitions;
pub mod message;
pub mod operation;

pub use batch::{Batch, BatchPayload};
pub use bytes32::Bytes32;
pub use definitions::{
    validate_name, Datatype, Definition, Identity, IdentityClaim, NamespaceDef, NamespaceType,
    TokenPool, TokenPoolAnnouncement, DEFINITION_VALIDATOR, SYSTEM_NAMESPACE, TAG_DEFINE_DATATYPE,
    TAG_DEFINE_NAMESPACE, TAG_DEFINE_POOL,
};
pub use message::{
    Blob, BlobRef, Data, DataAndBlob, DataRef, InlineData, Message, MessageHeader,
    MessageHeaderInput, MessageInput, MessageState, MessageType, SignerRef, TransactionRef,
    TransactionType,
};
pub use operation::{
    OpStatus, OpType, Operation, OperationKey, OperationUpdate, PreparedOperation,
};
