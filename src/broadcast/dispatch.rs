//! Dispatch coordinator and blob publisher.

use std::sync::Arc;
use std::time::Instant;

use crate::batchpin::BatchPinSubmitter;
use crate::broadcast::operations::{
    batch_broadcast_operation, prepare_batch_broadcast, PAYLOAD_REF_KEY,
};
use crate::context::Context;
use crate::data::DataManager;
use crate::error::BroadcastError;
use crate::model::{Batch, Bytes32, DataAndBlob};
use crate::observability::Metrics;
use crate::operations::OperationRegistry;
use crate::plugins::{DataExchange, DataUpdate, Database, SharedStorage};

/// Runs one batch through upload and anchoring.
///
/// Holds no per-batch state; concurrent dispatches of the same batch meet
/// only at the operation upsert.
pub struct BatchDispatcher {
    pub(crate) database: Arc<dyn Database>,
    pub(crate) data: Arc<dyn DataManager>,
    pub(crate) exchange: Arc<dyn DataExchange>,
    pub(crate) storage: Arc<dyn SharedStorage>,
    pub(crate) operations: Arc<dyn OperationRegistry>,
    pub(crate) batchpin: Arc<dyn BatchPinSubmitter>,
    pub(crate) metrics: Arc<dyn Metrics>,
}

impl BatchDispatcher {
    /// Publish `batch` to shared storage, then anchor it with `pins`.
    pub async fn dispatch_batch(
        &self,
        ctx: &Context,
        batch: &Arc<Batch>,
        pins: &[Bytes32],
    ) -> Result<(), BroadcastError> {
        let started = Instant::now();
        let result = self.dispatch_inner(ctx, batch, pins).await;
        if self.metrics.enabled() {
            self.metrics.batch_dispatched(result.is_ok(), started.elapsed());
        }
        if let Err(e) = &result {
            tracing::warn!(
                batch_id = %batch.id,
                namespace = %batch.namespace,
                tx = %batch.tx().id,
                error = %e,
                "Batch dispatch failed"
            );
        }
        result
    }

    async fn dispatch_inner(
        &self,
        ctx: &Context,
        batch: &Arc<Batch>,
        pins: &[Bytes32],
    ) -> Result<(), BroadcastError> {
        let op = batch_broadcast_operation(self.storage.name(), batch);
        let op = self.operations.add_or_reuse_operation(ctx, op).await?;

        let payload_ref = match op.output_str(PAYLOAD_REF_KEY) {
            Some(existing) if op.is_succeeded() => {
                tracing::info!(
                    batch_id = %batch.id,
                    op_id = %op.id,
                    payload_ref = %existing,
                    "Batch already published"
                );
                existing.to_string()
            }
            _ => {
                let pending = self.data.blobs_to_publish(ctx, batch).await?;
                self.publish_blobs(ctx, &pending).await?;
                let shared = self.with_public_refs(ctx, batch).await?;

                let prepared = prepare_batch_broadcast(&op, shared);
                let outcome = self.operations.run_operation(ctx, prepared).await?;
                if !outcome.complete {
                    return Err(BroadcastError::Incomplete(op.id));
                }
                outcome
                    .output
                    .as_ref()
                    .and_then(|o| o.get(PAYLOAD_REF_KEY))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| BroadcastError::Translation {
                        op_type: op.op_type,
                        message: "upload reported no payload reference".to_string(),
                    })?
            }
        };

        self.batchpin
            .submit_pinned_batch(ctx, batch, pins, &payload_ref)
            .await?;
        if self.metrics.enabled() {
            self.metrics.batch_pinned(pins.len());
        }
        tracing::info!(
            batch_id = %batch.id,
            namespace = %batch.namespace,
            tx = %batch.tx().id,
            payload_ref = %payload_ref,
            pins = pins.len(),
            "Batch dispatched"
        );
        Ok(())
    }

    /// The batch as other parties download it: every blob carries the public
    /// reference recorded on its data record. The refreshed batch is stored so
    /// a later retry reloads it; its hash is unchanged.
    async fn with_public_refs(
        &self,
        ctx: &Context,
        batch: &Arc<Batch>,
    ) -> Result<Arc<Batch>, BroadcastError> {
        let mut records = Vec::new();
        for entry in batch.payload.data.iter().filter(|d| d.blob.is_some()) {
            if let Some(record) = self
                .database
                .get_data(ctx, &entry.id)
                .await
                .map_err(BroadcastError::Persistence)?
            {
                records.push(record);
            }
        }
        let mut shared = Batch::clone(batch);
        if !shared.apply_public_refs(&records) {
            return Ok(Arc::clone(batch));
        }
        self.database
            .upsert_batch(ctx, &shared)
            .await
            .map_err(BroadcastError::Persistence)?;
        Ok(Arc::new(shared))
    }

    /// Move each blob from the private transport to shared storage and record
    /// its public reference. Stops at the first failure.
    pub async fn publish_blobs(
        &self,
        ctx: &Context,
        pairs: &[DataAndBlob],
    ) -> Result<(), BroadcastError> {
        for pair in pairs {
            let payload_ref = &pair.blob.payload_ref;
            let reader = self
                .exchange
                .download_blob(ctx, payload_ref)
                .await
                .map_err(|e| BroadcastError::transfer(payload_ref.clone(), e))?;

            // The reader is consumed by the upload and dropped on every path.
            let public_ref = self
                .storage
                .publish_data(ctx, reader)
                .await
                .map_err(|e| BroadcastError::transfer(payload_ref.clone(), e))?;

            self.database
                .update_data(ctx, &pair.data.id, DataUpdate::blob_public(public_ref.clone()))
                .await
                .map_err(BroadcastError::Persistence)?;
            if self.metrics.enabled() {
                self.metrics.blob_published();
            }
            tracing::info!(
                data = %pair.data.id,
                hash = %pair.blob.hash,
                payload_ref = %payload_ref,
                public_ref = %public_ref,
                "Published blob"
            );
        }
        Ok(())
    }
}
