//! Batch assembly and dispatch scheduling.
//!
//! # Data Flow
//! ```text
//! Staged message (tx type, message type)
//!     → route to the registered dispatcher
//!     → assembler per (dispatcher, namespace, author, key)
//!         flush on max count / max bytes / timeout
//!     → seal + persist batch, compute one pin per message
//!         (retried; listeners told which messages failed to seal)
//!     → dispatch handler (retried with backoff on failure)
//!     → BatchListener notified of the outcome
//! ```
//!
//! # Design Decisions
//! - The scheduler owns all retry and backoff policy; dispatch handlers
//!   never retry internally
//! - Batches for one assembler are dispatched one at a time, in order
//! - Idle assemblers are disposed and recreated on the next message

pub mod manager;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::BroadcastConfig;
use crate::context::Context;
use crate::error::BroadcastError;
use crate::model::{Batch, Bytes32, Message, MessageType, TransactionType};

pub use manager::LocalBatchManager;

/// Callback invoked with each sealed batch and its pins.
pub type DispatchHandler = Arc<
    dyn Fn(Context, Arc<Batch>, Arc<Vec<Bytes32>>) -> BoxFuture<'static, Result<(), BroadcastError>>
        + Send
        + Sync,
>;

/// Batch thresholds for one dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherOptions {
    /// Maximum messages per batch.
    pub max_count: usize,
    /// Maximum estimated payload bytes per batch.
    pub max_bytes: u64,
    /// How long the first message of a batch may wait before the batch is flushed.
    pub timeout: Duration,
    /// How long an assembler may sit idle before it is disposed.
    pub dispose_timeout: Duration,
}

impl From<&BroadcastConfig> for DispatcherOptions {
    fn from(config: &BroadcastConfig) -> Self {
        Self {
            max_count: config.batch_size,
            max_bytes: config.batch_payload_limit,
            timeout: Duration::from_millis(config.batch_timeout_ms),
            dispose_timeout: Duration::from_secs(config.batch_agent_timeout_secs),
        }
    }
}

/// Accumulates messages into batches and hands them to registered dispatchers.
#[async_trait]
pub trait BatchScheduler: Send + Sync {
    /// Route messages of `tx_type` and any of `msg_types` to `handler`.
    fn register_dispatcher(
        &self,
        name: &str,
        tx_type: TransactionType,
        msg_types: &[MessageType],
        handler: DispatchHandler,
        options: DispatcherOptions,
    );

    /// Queue a persisted message for batching.
    async fn new_message(&self, ctx: &Context, msg: &Message) -> Result<(), BroadcastError>;
}

/// Observer of dispatch outcomes.
pub trait BatchListener: Send + Sync {
    fn batch_dispatched(&self, batch: &Batch);

    /// Called once retries for a batch are exhausted.
    fn batch_failed(&self, batch: &Batch, error: &BroadcastError);

    /// Called when messages could not be sealed into a batch at all.
    fn messages_failed(&self, ids: &[Uuid], error: &BroadcastError);
}

/// The commitment anchored for one message: covers its namespace, its
/// topics and its hash.
pub fn message_pin(msg: &Message) -> Bytes32 {
    let mut parts: Vec<Vec<u8>> = Vec::with_capacity(msg.header.topics.len() + 2);
    parts.push(msg.header.namespace.as_bytes().to_vec());
    for topic in &msg.header.topics {
        parts.push(topic.as_bytes().to_vec());
    }
    parts.push(msg.hash.unwrap_or_default().0.to_vec());
    Bytes32::hash_parts(parts.iter())
}

/// One pin per message, aligned with the batch's message order.
pub fn batch_pins(batch: &Batch) -> Vec<Bytes32> {
    batch.payload.messages.iter().map(message_pin).collect()
}
