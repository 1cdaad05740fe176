//! Synchronous waits on asynchronous batch dispatch.
//!
//! # Data Flow
//! ```text
//! API request (confirm=true)
//!     → wait_for_message: register waiter for the message ID
//!     → run the send (stage message)
//!     → batch scheduler dispatches the message's batch
//!     → BatchListener callback resolves or rejects the waiter
//! ```

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::batch::BatchListener;
use crate::context::Context;
use crate::error::BroadcastError;
use crate::model::{Batch, Message};
use crate::plugins::Database;

/// Turns a fire-and-forget send into a call that returns once the message
/// has been dispatched.
#[async_trait]
pub trait SyncAsyncBridge: Send + Sync {
    /// Register interest in `id`, run `send`, then wait for the message's batch.
    async fn wait_for_message(
        &self,
        ctx: &Context,
        id: Uuid,
        send: BoxFuture<'_, Result<(), BroadcastError>>,
    ) -> Result<Message, BroadcastError>;
}

/// In-process bridge fed by the batch scheduler's listener callbacks.
pub struct LocalBridge {
    database: Arc<dyn Database>,
    waiters: DashMap<Uuid, oneshot::Sender<Result<(), String>>>,
    timeout: Duration,
}

impl LocalBridge {
    pub fn new(database: Arc<dyn Database>, timeout: Duration) -> Self {
        Self {
            database,
            waiters: DashMap::new(),
            timeout,
        }
    }

    pub fn pending_waiters(&self) -> usize {
        self.waiters.len()
    }

    fn resolve(&self, ids: &[Uuid], outcome: Result<(), String>) {
        for id in ids {
            if let Some((_, waiter)) = self.waiters.remove(id) {
                let _ = waiter.send(outcome.clone());
            }
        }
    }
}

#[async_trait]
impl SyncAsyncBridge for LocalBridge {
    async fn wait_for_message(
        &self,
        ctx: &Context,
        id: Uuid,
        send: BoxFuture<'_, Result<(), BroadcastError>>,
    ) -> Result<Message, BroadcastError> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id, tx);

        if let Err(e) = send.await {
            self.waiters.remove(&id);
            return Err(e);
        }

        let outcome = tokio::select! {
            _ = ctx.cancelled() => {
                self.waiters.remove(&id);
                return Err(BroadcastError::Cancelled);
            }
            res = tokio::time::timeout(self.timeout, rx) => res,
        };
        match outcome {
            Err(_) => {
                self.waiters.remove(&id);
                Err(BroadcastError::ConfirmTimeout(id))
            }
            Ok(Err(_)) => Err(BroadcastError::DispatchFailed {
                message: id,
                reason: "waiter dropped".to_string(),
            }),
            Ok(Ok(Err(reason))) => Err(BroadcastError::DispatchFailed { message: id, reason }),
            Ok(Ok(Ok(()))) => self
                .database
                .get_message(ctx, &id)
                .await
                .map_err(BroadcastError::Persistence)?
                .ok_or_else(|| BroadcastError::NotFound(format!("message {}", id))),
        }
    }
}

impl BatchListener for LocalBridge {
    fn batch_dispatched(&self, batch: &Batch) {
        self.resolve(&batch.message_ids(), Ok(()));
    }

    fn batch_failed(&self, batch: &Batch, error: &BroadcastError) {
        self.resolve(&batch.message_ids(), Err(error.to_string()));
    }

    fn messages_failed(&self, ids: &[Uuid], error: &BroadcastError) {
        self.resolve(ids, Err(error.to_string()));
    }
}
