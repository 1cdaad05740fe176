//! In-process batch scheduler.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::batch::{
    batch_pins, BatchListener, BatchScheduler, DispatchHandler, DispatcherOptions,
};
use crate::config::RetryConfig;
use crate::context::Context;
use crate::error::BroadcastError;
use crate::model::{
    Batch, Bytes32, Message, MessageState, MessageType, SignerRef, TransactionRef,
    TransactionType,
};
use crate::plugins::{Database, MessageUpdate};
use crate::resilience::retry_delay;

struct Dispatcher {
    name: String,
    tx_type: TransactionType,
    handler: DispatchHandler,
    options: DispatcherOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AssemblerKey {
    dispatcher: String,
    namespace: String,
    signer: SignerRef,
}

struct Inner {
    database: Arc<dyn Database>,
    retries: RetryConfig,
    /// Root context; cancelling it stops every assembler.
    ctx: Context,
    dispatchers: DashMap<String, Arc<Dispatcher>>,
    routes: DashMap<(TransactionType, MessageType), String>,
    assemblers: DashMap<AssemblerKey, mpsc::UnboundedSender<Message>>,
    listeners: RwLock<Vec<Arc<dyn BatchListener>>>,
}

/// Batch scheduler running one assembler task per
/// (dispatcher, namespace, author, key).
#[derive(Clone)]
pub struct LocalBatchManager {
    inner: Arc<Inner>,
}

impl LocalBatchManager {
    pub fn new(database: Arc<dyn Database>, retries: RetryConfig, ctx: Context) -> Self {
        Self {
            inner: Arc::new(Inner {
                database,
                retries,
                ctx,
                dispatchers: DashMap::new(),
                routes: DashMap::new(),
                assemblers: DashMap::new(),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn BatchListener>) {
        if let Ok(mut listeners) = self.inner.listeners.write() {
            listeners.push(listener);
        }
    }

    /// Number of assemblers currently alive.
    pub fn active_assemblers(&self) -> usize {
        self.inner.assemblers.len()
    }

    pub fn dispatcher_names(&self) -> Vec<String> {
        self.inner.dispatchers.iter().map(|d| d.key().clone()).collect()
    }

    fn spawn_assembler(
        &self,
        key: AssemblerKey,
        dispatcher: Arc<Dispatcher>,
    ) -> mpsc::UnboundedSender<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        tracing::debug!(
            dispatcher = %key.dispatcher,
            namespace = %key.namespace,
            author = %key.signer.author,
            "Starting batch assembler"
        );
        tokio::spawn(run_assembler(Arc::clone(&self.inner), key, dispatcher, rx));
        tx
    }
}

#[async_trait]
impl BatchScheduler for LocalBatchManager {
    fn register_dispatcher(
        &self,
        name: &str,
        tx_type: TransactionType,
        msg_types: &[MessageType],
        handler: DispatchHandler,
        options: DispatcherOptions,
    ) {
        let dispatcher = Arc::new(Dispatcher {
            name: name.to_string(),
            tx_type,
            handler,
            options,
        });
        self.inner.dispatchers.insert(name.to_string(), dispatcher);
        for msg_type in msg_types {
            self.inner.routes.insert((tx_type, *msg_type), name.to_string());
        }
        tracing::info!(
            dispatcher = name,
            tx_type = %tx_type,
            msg_types = ?msg_types,
            max_count = options.max_count,
            max_bytes = options.max_bytes,
            "Registered batch dispatcher"
        );
    }

    async fn new_message(&self, ctx: &Context, msg: &Message) -> Result<(), BroadcastError> {
        if ctx.is_cancelled() {
            return Err(BroadcastError::Cancelled);
        }
        let route = (msg.header.tx_type, msg.header.msg_type);
        let name = self
            .inner
            .routes
            .get(&route)
            .map(|r| r.value().clone())
            .ok_or_else(|| {
                BroadcastError::InvalidInput(format!(
                    "no dispatcher for transaction type {} and message type {}",
                    route.0, route.1
                ))
            })?;
        let dispatcher = self
            .inner
            .dispatchers
            .get(&name)
            .map(|d| Arc::clone(d.value()))
            .ok_or_else(|| BroadcastError::NotFound(format!("dispatcher {}", name)))?;

        let key = AssemblerKey {
            dispatcher: name,
            namespace: msg.header.namespace.clone(),
            signer: msg.header.signer.clone(),
        };
        let mut pending = msg.clone();
        loop {
            if self.inner.ctx.is_cancelled() {
                return Err(BroadcastError::Cancelled);
            }
            let sender = self
                .inner
                .assemblers
                .entry(key.clone())
                .or_insert_with(|| self.spawn_assembler(key.clone(), Arc::clone(&dispatcher)))
                .clone();
            match sender.send(pending) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => {
                    // Assembler was disposed between lookup and send.
                    self.inner.assemblers.remove_if(&key, |_, s| s.is_closed());
                    pending = returned;
                }
            }
        }
    }
}

async fn run_assembler(
    inner: Arc<Inner>,
    key: AssemblerKey,
    dispatcher: Arc<Dispatcher>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    let options = dispatcher.options;
    let mut pending: Vec<Message> = Vec::new();
    let mut pending_bytes = 0u64;
    let mut flush_at: Option<Instant> = None;

    loop {
        let wake = flush_at;
        let timer = async move {
            match wake {
                Some(at) => tokio::time::sleep_until(at).await,
                None => tokio::time::sleep(options.dispose_timeout).await,
            }
        };

        tokio::select! {
            _ = inner.ctx.cancelled() => {
                tracing::debug!(dispatcher = %key.dispatcher, namespace = %key.namespace, "Batch assembler stopping");
                break;
            }
            received = rx.recv() => {
                let Some(msg) = received else { break };
                let size = msg.estimate_size();
                if !pending.is_empty() && pending_bytes + size > options.max_bytes {
                    inner.flush(&key, &dispatcher, std::mem::take(&mut pending)).await;
                    pending_bytes = 0;
                    flush_at = None;
                }
                pending.push(msg);
                pending_bytes += size;
                if flush_at.is_none() {
                    flush_at = Some(Instant::now() + options.timeout);
                }
                if pending.len() >= options.max_count || pending_bytes >= options.max_bytes {
                    inner.flush(&key, &dispatcher, std::mem::take(&mut pending)).await;
                    pending_bytes = 0;
                    flush_at = None;
                }
            }
            _ = timer => {
                if flush_at.is_some() {
                    inner.flush(&key, &dispatcher, std::mem::take(&mut pending)).await;
                    pending_bytes = 0;
                    flush_at = None;
                    continue;
                }
                rx.close();
                while let Ok(msg) = rx.try_recv() {
                    pending.push(msg);
                }
                if !pending.is_empty() {
                    inner.flush(&key, &dispatcher, std::mem::take(&mut pending)).await;
                }
                inner.assemblers.remove_if(&key, |_, s| s.is_closed());
                tracing::debug!(dispatcher = %key.dispatcher, namespace = %key.namespace, "Disposed idle batch assembler");
                break;
            }
        }
    }
}

impl Inner {
    async fn flush(&self, key: &AssemblerKey, dispatcher: &Dispatcher, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        let Some(batch) = self.seal_with_retry(key, dispatcher, messages).await else {
            return;
        };
        let batch = Arc::new(batch);
        let pins = Arc::new(batch_pins(&batch));
        self.dispatch_with_retry(dispatcher, batch, pins).await;
    }

    /// Seal `messages`, retrying with backoff. Once retries are exhausted the
    /// listeners are told which messages could not be batched; the messages
    /// themselves stay `Ready` in the database.
    async fn seal_with_retry(
        &self,
        key: &AssemblerKey,
        dispatcher: &Dispatcher,
        messages: Vec<Message>,
    ) -> Option<Batch> {
        let max_attempts = self.retries.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let e = match self.seal(key, dispatcher, messages.clone()).await {
                Ok(batch) => return Some(batch),
                Err(e) => e,
            };
            if self.ctx.is_cancelled() {
                tracing::info!(dispatcher = %dispatcher.name, error = %e, "Seal abandoned on shutdown");
                return None;
            }
            if attempt >= max_attempts {
                let ids: Vec<Uuid> = messages.iter().map(|m| m.header.id).collect();
                tracing::error!(
                    dispatcher = %dispatcher.name,
                    namespace = %key.namespace,
                    messages = ids.len(),
                    attempts = attempt,
                    error = %e,
                    "Failed to seal batch"
                );
                for listener in self.listeners() {
                    listener.messages_failed(&ids, &e);
                }
                return None;
            }
            let delay = retry_delay(attempt, &self.retries);
            tracing::warn!(
                dispatcher = %dispatcher.name,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "Failed to seal batch, retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.ctx.cancelled() => return None,
            }
        }
    }

    async fn seal(
        &self,
        key: &AssemblerKey,
        dispatcher: &Dispatcher,
        messages: Vec<Message>,
    ) -> Result<Batch, BroadcastError> {
        let mut data = Vec::new();
        for msg in &messages {
            for data_ref in &msg.data {
                let record = self
                    .database
                    .get_data(&self.ctx, &data_ref.id)
                    .await
                    .map_err(BroadcastError::Persistence)?
                    .ok_or_else(|| BroadcastError::NotFound(format!("data {}", data_ref.id)))?;
                data.push(record);
            }
        }
        let tx = TransactionRef {
            tx_type: dispatcher.tx_type,
            id: Uuid::new_v4(),
        };
        let batch = Batch::seal(&key.namespace, key.signer.clone(), tx, messages, data)?;
        self.database
            .upsert_batch(&self.ctx, &batch)
            .await
            .map_err(BroadcastError::Persistence)?;
        for id in batch.message_ids() {
            let update = MessageUpdate {
                state: None,
                batch: Some(batch.id),
            };
            self.database
                .update_message(&self.ctx, &id, update)
                .await
                .map_err(BroadcastError::persistence)?;
        }
        tracing::info!(
            batch_id = %batch.id,
            namespace = %batch.namespace,
            tx = %tx.id,
            messages = batch.payload.messages.len(),
            "Sealed batch"
        );
        Ok(batch)
    }

    async fn dispatch_with_retry(
        &self,
        dispatcher: &Dispatcher,
        batch: Arc<Batch>,
        pins: Arc<Vec<Bytes32>>,
    ) {
        let max_attempts = self.retries.max_attempts.max(1);
        let timeout = Duration::from_secs(self.retries.dispatch_timeout_secs);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let ctx = self.ctx.with_timeout(timeout);
            let result = (dispatcher.handler)(ctx, Arc::clone(&batch), Arc::clone(&pins)).await;
            match result {
                Ok(()) => {
                    tracing::info!(batch_id = %batch.id, attempt = attempt, "Batch dispatched");
                    self.mark_sent(&batch).await;
                    for listener in self.listeners() {
                        listener.batch_dispatched(&batch);
                    }
                    return;
                }
                Err(e) if self.ctx.is_cancelled() => {
                    tracing::info!(batch_id = %batch.id, error = %e, "Dispatch abandoned on shutdown");
                    return;
                }
                Err(e) if attempt >= max_attempts => {
                    tracing::error!(batch_id = %batch.id, attempts = attempt, error = %e, "Batch dispatch failed");
                    for listener in self.listeners() {
                        listener.batch_failed(&batch, &e);
                    }
                    return;
                }
                Err(e) => {
                    let delay = retry_delay(attempt, &self.retries);
                    tracing::warn!(
                        batch_id = %batch.id,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Batch dispatch failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.ctx.cancelled() => return,
                    }
                }
            }
        }
    }

    async fn mark_sent(&self, batch: &Batch) {
        for id in batch.message_ids() {
            let update = MessageUpdate {
                state: Some(MessageState::Sent),
                batch: Some(batch.id),
            };
            if let Err(e) = self.database.update_message(&self.ctx, &id, update).await {
                tracing::warn!(message = %id, batch_id = %batch.id, error = %e, "Failed to mark message sent");
            }
        }
    }

    fn listeners(&self) -> Vec<Arc<dyn BatchListener>> {
        self.listeners
            .read()
            .map(|l| l.clone())
            .unwrap_or_default()
    }
}
