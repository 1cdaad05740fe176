//! Error taxonomy of the broadcast pipeline.

use thiserror::Error;

use crate::model::OpType;
use crate::plugins::PluginError;

/// Errors surfaced by the broadcast manager and its collaborators.
#[derive(Debug, Clone, Error)]
pub enum BroadcastError {
    /// A required collaborator was not supplied at construction.
    #[error("broadcast manager initialization failed: missing {0}")]
    Initialization(&'static str),

    /// An upsert or targeted update failed.
    #[error("persistence failed: {0}")]
    Persistence(#[source] PluginError),

    /// A blob could not be moved between the private transport and shared storage.
    #[error("transfer of '{reference}' failed: {source}")]
    Transfer {
        reference: String,
        #[source]
        source: PluginError,
    },

    /// Ledger submission failed.
    #[error("pin submission failed: {0}")]
    Submission(#[source] PluginError),

    /// No handler is registered for the operation's type.
    #[error("no handler registered for operation type {0}")]
    HandlerMismatch(OpType),

    /// An operation's persisted input could not be decoded.
    #[error("operation {op_type} input invalid: {message}")]
    Translation { op_type: OpType, message: String },

    /// The operation ran but did not report completion.
    #[error("operation {0} did not complete")]
    Incomplete(uuid::Uuid),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("identity resolution failed: {0}")]
    Identity(String),

    /// The referenced record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    #[error("request cancelled")]
    Cancelled,

    /// A synchronous send gave up waiting for its batch.
    #[error("timed out waiting for message {0} to be dispatched")]
    ConfirmTimeout(uuid::Uuid),

    /// The batch carrying a synchronously sent message failed to dispatch.
    #[error("dispatch of message {message} failed: {reason}")]
    DispatchFailed { message: uuid::Uuid, reason: String },

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl BroadcastError {
    /// True when the error originates from a cancelled or expired context.
    pub fn is_cancellation(&self) -> bool {
        match self {
            BroadcastError::Cancelled => true,
            BroadcastError::Persistence(e) | BroadcastError::Submission(e) => e.is_cancellation(),
            BroadcastError::Transfer { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }

    /// Wrap a persistence failure, keeping not-found distinct.
    pub fn persistence(e: PluginError) -> Self {
        match e {
            PluginError::NotFound(what) => BroadcastError::NotFound(what),
            other => BroadcastError::Persistence(other),
        }
    }

    pub fn transfer(reference: impl Into<String>, source: PluginError) -> Self {
        BroadcastError::Transfer {
            reference: reference.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for BroadcastError {
    fn from(e: serde_json::Error) -> Self {
        BroadcastError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_detected_through_wrappers() {
        assert!(BroadcastError::Persistence(PluginError::Cancelled).is_cancellation());
        assert!(BroadcastError::transfer("ref1", PluginError::DeadlineExceeded).is_cancellation());
        assert!(!BroadcastError::Submission(PluginError::request("eth", "boom")).is_cancellation());
    }

    #[test]
    fn test_transfer_display_carries_reference() {
        let err = BroadcastError::transfer("ns1/blob-a", PluginError::NotFound("blob".into()));
        assert!(err.to_string().contains("ns1/blob-a"));
    }

    #[test]
    fn test_persistence_not_found_mapped() {
        let err = BroadcastError::persistence(PluginError::NotFound("operation x".into()));
        assert!(matches!(err, BroadcastError::NotFound(_)));
    }
}
