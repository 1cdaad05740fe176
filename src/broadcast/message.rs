//! Building and sending broadcast messages.

use chrono::Utc;
use futures_util::FutureExt;
use std::sync::Arc;
use uuid::Uuid;

use crate::broadcast::manager::BroadcastManager;
use crate::context::Context;
use crate::error::BroadcastError;
use crate::model::{
    Message, MessageHeader, MessageInput, MessageState, MessageType, TransactionType,
};

/// Topic used when a message names none.
pub const DEFAULT_TOPIC: &str = "default";

/// A broadcast message not yet staged.
///
/// The message ID is fixed at construction so a synchronous send can
/// register its waiter before the message exists.
pub struct BroadcastSender {
    manager: Arc<BroadcastManager>,
    namespace: String,
    input: MessageInput,
    id: Uuid,
    resolve_signer: bool,
}

impl BroadcastManager {
    /// Start a broadcast of `input` on `namespace`.
    pub fn new_broadcast(self: &Arc<Self>, namespace: &str, input: MessageInput) -> BroadcastSender {
        BroadcastSender {
            manager: self.clone(),
            namespace: namespace.to_string(),
            input,
            id: Uuid::new_v4(),
            resolve_signer: true,
        }
    }

    /// Broadcast a message, optionally waiting until its batch is dispatched.
    pub async fn broadcast_message(
        self: &Arc<Self>,
        ctx: &Context,
        namespace: &str,
        input: MessageInput,
        wait_confirm: bool,
    ) -> Result<Message, BroadcastError> {
        let sender = self.new_broadcast(namespace, input);
        if wait_confirm {
            sender.send_and_wait(ctx).await
        } else {
            sender.send(ctx).await
        }
    }
}

impl BroadcastSender {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Send with the signer exactly as supplied. Used for identity claims,
    /// whose author is not yet a resolvable identity.
    pub fn without_signer_resolution(mut self) -> Self {
        self.resolve_signer = false;
        self
    }

    async fn prepare(&mut self, ctx: &Context) -> Result<Message, BroadcastError> {
        let header = &mut self.input.header;
        let msg_type = header.msg_type.unwrap_or(MessageType::Broadcast);
        let tx_type = header.tx_type.unwrap_or(TransactionType::BatchPin);
        if tx_type != TransactionType::BatchPin {
            return Err(BroadcastError::InvalidInput(format!(
                "transaction type '{}' is not supported for broadcast",
                tx_type
            )));
        }
        if header.topics.is_empty() {
            header.topics.push(DEFAULT_TOPIC.to_string());
        }
        if self.resolve_signer {
            self.manager
                .identity
                .resolve_input_signing_identity(ctx, &self.namespace, &mut header.signer)
                .await?;
        } else if header.signer.key.is_empty() {
            return Err(BroadcastError::Identity("signing key is required".to_string()));
        }

        if self.input.data.is_empty() {
            return Err(BroadcastError::InvalidInput(
                "a broadcast message requires at least one data entry".to_string(),
            ));
        }
        let data = self
            .manager
            .data
            .resolve_inline_data(ctx, &self.namespace, &self.input.data)
            .await?;

        let header = &self.input.header;
        let mut msg = Message {
            header: MessageHeader {
                id: self.id,
                cid: header.cid,
                msg_type,
                tx_type,
                signer: header.signer.clone(),
                created: Utc::now(),
                namespace: self.namespace.clone(),
                topics: header.topics.clone(),
                tag: header.tag.clone(),
                datahash: None,
            },
            hash: None,
            batch: None,
            state: MessageState::Ready,
            confirmed: None,
            data: data.iter().map(|d| d.data_ref()).collect(),
        };
        msg.seal()?;

        let data_bytes: u64 = data
            .iter()
            .map(|d| serde_json::to_vec(d).map(|v| v.len() as u64))
            .sum::<Result<u64, serde_json::Error>>()?;
        let size = msg.estimate_size() + data_bytes;
        let limit = self.manager.options().max_bytes;
        if size > limit {
            return Err(BroadcastError::InvalidInput(format!(
                "message size {} exceeds the batch payload limit {}",
                size, limit
            )));
        }
        Ok(msg)
    }

    /// Stage the message for batching and return it without waiting.
    pub async fn send(mut self, ctx: &Context) -> Result<Message, BroadcastError> {
        let msg = self.prepare(ctx).await?;
        self.manager.data.write_new_message(ctx, &msg).await?;
        if self.manager.metrics.enabled() {
            self.manager.metrics.message_submitted(msg.header.msg_type);
        }
        tracing::info!(
            message = %msg.header.id,
            namespace = %msg.header.namespace,
            msg_type = %msg.header.msg_type,
            data = msg.data.len(),
            "Broadcast message staged"
        );
        Ok(msg)
    }

    /// Stage the message and wait until its batch has been dispatched.
    pub async fn send_and_wait(self, ctx: &Context) -> Result<Message, BroadcastError> {
        let id = self.id;
        let syncasync = self.manager.syncasync.clone();
        let send = async move { self.send(ctx).await.map(|_| ()) }.boxed();
        syncasync.wait_for_message(ctx, id, send).await
    }
}
