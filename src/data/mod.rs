//! Data staging.
//!
//! # Data Flow
//! ```text
//! Inline data (values or references)
//!     → resolve_inline_data: persist new values, verify references
//! Sealed message
//!     → write_new_message: persist, hand to the batch scheduler
//! Raw blob upload
//!     → upload_blob: private transport upload, blob + data records
//! Dispatched batch
//!     → blobs_to_publish: blob-backed data still lacking a public reference
//! ```

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::batch::BatchScheduler;
use crate::context::Context;
use crate::error::BroadcastError;
use crate::model::{Batch, Blob, BlobRef, Bytes32, Data, DataAndBlob, InlineData, Message};
use crate::plugins::{DataExchange, Database, PluginError};

/// Validator applied to inline values that do not name one.
pub const DEFAULT_VALIDATOR: &str = "json";

/// Stages data and messages ahead of batching.
#[async_trait]
pub trait DataManager: Send + Sync {
    /// Persist new inline values and resolve references, returning the data
    /// records in input order.
    async fn resolve_inline_data(
        &self,
        ctx: &Context,
        namespace: &str,
        inline: &[InlineData],
    ) -> Result<Vec<Data>, BroadcastError>;

    /// Persist a sealed message and queue it for batching.
    async fn write_new_message(&self, ctx: &Context, msg: &Message) -> Result<(), BroadcastError>;

    /// Upload content to the private transport and record it as blob data.
    async fn upload_blob(
        &self,
        ctx: &Context,
        namespace: &str,
        name: &str,
        content: Vec<u8>,
    ) -> Result<Data, BroadcastError>;

    /// Data-and-blob pairs of `batch` that have no public reference yet.
    async fn blobs_to_publish(
        &self,
        ctx: &Context,
        batch: &Batch,
    ) -> Result<Vec<DataAndBlob>, BroadcastError>;
}

pub struct LocalDataManager {
    database: Arc<dyn Database>,
    exchange: Arc<dyn DataExchange>,
    scheduler: Arc<dyn BatchScheduler>,
}

impl LocalDataManager {
    pub fn new(
        database: Arc<dyn Database>,
        exchange: Arc<dyn DataExchange>,
        scheduler: Arc<dyn BatchScheduler>,
    ) -> Self {
        Self {
            database,
            exchange,
            scheduler,
        }
    }

    async fn resolve_reference(
        &self,
        ctx: &Context,
        namespace: &str,
        id: &Uuid,
        hash: Option<Bytes32>,
    ) -> Result<Data, BroadcastError> {
        let data = self
            .database
            .get_data(ctx, id)
            .await
            .map_err(BroadcastError::Persistence)?
            .filter(|d| d.namespace == namespace)
            .ok_or_else(|| {
                BroadcastError::InvalidInput(format!("data {} not found in namespace {}", id, namespace))
            })?;
        if let Some(expected) = hash {
            if expected != data.hash {
                return Err(BroadcastError::InvalidInput(format!(
                    "data {} hash mismatch: expected {}, stored {}",
                    id, expected, data.hash
                )));
            }
        }
        Ok(data)
    }
}

#[async_trait]
impl DataManager for LocalDataManager {
    async fn resolve_inline_data(
        &self,
        ctx: &Context,
        namespace: &str,
        inline: &[InlineData],
    ) -> Result<Vec<Data>, BroadcastError> {
        let mut resolved = Vec::with_capacity(inline.len());
        for (i, item) in inline.iter().enumerate() {
            let data = match (&item.value, &item.id) {
                (Some(value), _) => {
                    let validator = item.validator.as_deref().unwrap_or(DEFAULT_VALIDATOR);
                    let data = Data::from_value(namespace, validator, value.clone())?;
                    self.database
                        .insert_data(ctx, &data)
                        .await
                        .map_err(BroadcastError::Persistence)?;
                    data
                }
                (None, Some(id)) => self.resolve_reference(ctx, namespace, id, item.hash).await?,
                (None, None) => {
                    return Err(BroadcastError::InvalidInput(format!(
                        "data entry {} has neither a value nor an ID",
                        i
                    )))
                }
            };
            resolved.push(data);
        }
        Ok(resolved)
    }

    async fn write_new_message(&self, ctx: &Context, msg: &Message) -> Result<(), BroadcastError> {
        self.database
            .insert_message(ctx, msg)
            .await
            .map_err(BroadcastError::Persistence)?;
        self.scheduler.new_message(ctx, msg).await?;
        tracing::debug!(
            message = %msg.header.id,
            namespace = %msg.header.namespace,
            "Staged message"
        );
        Ok(())
    }

    async fn upload_blob(
        &self,
        ctx: &Context,
        namespace: &str,
        name: &str,
        content: Vec<u8>,
    ) -> Result<Data, BroadcastError> {
        let id = Uuid::new_v4();
        let hash = Bytes32::hash(&content);
        let size = content.len() as u64;
        let uploaded = self
            .exchange
            .upload_blob(ctx, namespace, &id, content)
            .await
            .map_err(|e| BroadcastError::transfer(format!("{}/{}", namespace, id), e))?;
        if uploaded.hash != hash {
            return Err(BroadcastError::transfer(
                uploaded.payload_ref,
                PluginError::request(
                    self.exchange.name(),
                    format!("hash mismatch: sent {}, stored {}", hash, uploaded.hash),
                ),
            ));
        }

        let blob = Blob {
            hash,
            payload_ref: uploaded.payload_ref,
            size,
            created: Utc::now(),
        };
        self.database
            .insert_blob(ctx, &blob)
            .await
            .map_err(BroadcastError::Persistence)?;

        let data = Data::from_blob(
            namespace,
            BlobRef {
                hash,
                size,
                name: name.to_string(),
                public: None,
            },
        );
        self.database
            .insert_data(ctx, &data)
            .await
            .map_err(BroadcastError::Persistence)?;
        tracing::info!(data = %data.id, hash = %hash, size = size, "Uploaded blob");
        Ok(data)
    }

    async fn blobs_to_publish(
        &self,
        ctx: &Context,
        batch: &Batch,
    ) -> Result<Vec<DataAndBlob>, BroadcastError> {
        let mut pending = Vec::new();
        for entry in batch.payload.data.iter().filter(|d| d.blob.is_some()) {
            // The stored record may have been published by an earlier attempt.
            let data = self
                .database
                .get_data(ctx, &entry.id)
                .await
                .map_err(BroadcastError::Persistence)?
                .ok_or_else(|| BroadcastError::NotFound(format!("data {}", entry.id)))?;
            let Some(blob_ref) = data.blob.as_ref() else {
                continue;
            };
            if blob_ref.public.is_some() {
                continue;
            }
            let blob = self
                .database
                .get_blob(ctx, &blob_ref.hash)
                .await
                .map_err(BroadcastError::Persistence)?
                .ok_or_else(|| BroadcastError::NotFound(format!("blob {}", blob_ref.hash)))?;
            pending.push(DataAndBlob { data, blob });
        }
        Ok(pending)
    }
}
