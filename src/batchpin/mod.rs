//! Ledger pin submission.
//!
//! # Data Flow
//! ```text
//! dispatch coordinator (content already published)
//!     → LedgerPinSubmitter::submit_pinned_batch
//!     → blockchain_pin_batch operation (upsert on the batch transaction)
//!         already Succeeded → skip
//!     → PinBatchHandler: reload batch, build BatchPin
//!     → Blockchain::submit_batch_pin
//! ```
//!
//! # Design Decisions
//! - Pin submission is itself a tracked operation, so a dispatch retried
//!   after a successful pin does not anchor the batch twice
//! - Concurrent submissions for one batch within a node are claimed per
//!   operation; the loser returns `Incomplete` and is retried by the scheduler
//! - Ledger errors surface unmodified as `BroadcastError::Submission`

use async_trait::async_trait;
use dashmap::DashSet;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::context::Context;
use crate::error::BroadcastError;
use crate::model::{Batch, Bytes32, OpType, Operation, PreparedOperation};
use crate::operations::{OperationHandler, OperationRegistry, RunOutcome};
use crate::plugins::{BatchPin, Blockchain, Database};

/// Submits the pins of a published batch to the ledger.
#[async_trait]
pub trait BatchPinSubmitter: Send + Sync {
    fn name(&self) -> &str;

    /// Anchor `batch`, whose payload is published at `payload_ref`. `pins`
    /// are aligned with the batch's messages.
    async fn submit_pinned_batch(
        &self,
        ctx: &Context,
        batch: &Batch,
        pins: &[Bytes32],
        payload_ref: &str,
    ) -> Result<(), BroadcastError>;
}

/// Pin submitter that tracks each submission as an operation.
pub struct LedgerPinSubmitter {
    plugin: String,
    operations: Arc<dyn OperationRegistry>,
    /// Pin operations currently being submitted.
    in_flight: DashSet<Uuid>,
}

impl LedgerPinSubmitter {
    pub fn new(blockchain: &dyn Blockchain, operations: Arc<dyn OperationRegistry>) -> Self {
        Self {
            plugin: blockchain.name().to_string(),
            operations,
            in_flight: DashSet::new(),
        }
    }

    fn claim(&self, id: Uuid) -> Option<PinClaim<'_>> {
        self.in_flight.insert(id).then(|| PinClaim {
            in_flight: &self.in_flight,
            id,
        })
    }
}

/// Released on drop, including when the submitting future is cancelled.
struct PinClaim<'a> {
    in_flight: &'a DashSet<Uuid>,
    id: Uuid,
}

impl Drop for PinClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

#[async_trait]
impl BatchPinSubmitter for LedgerPinSubmitter {
    fn name(&self) -> &str {
        "LedgerPinSubmitter"
    }

    async fn submit_pinned_batch(
        &self,
        ctx: &Context,
        batch: &Batch,
        pins: &[Bytes32],
        payload_ref: &str,
    ) -> Result<(), BroadcastError> {
        let contexts: Vec<String> = pins.iter().map(|p| p.to_string()).collect();
        let op = Operation::new(
            &self.plugin,
            &batch.namespace,
            batch.tx().id,
            OpType::BlockchainPinBatch,
        )
        .with_input("batch", json!(batch.id.to_string()))
        .with_input("payloadRef", json!(payload_ref))
        .with_input("contexts", json!(contexts))
        .with_input("signingKey", json!(batch.signer.key));

        let op = self.operations.add_or_reuse_operation(ctx, op).await?;
        if op.is_succeeded() {
            tracing::info!(batch_id = %batch.id, op_id = %op.id, "Batch already pinned");
            return Ok(());
        }
        let Some(_claim) = self.claim(op.id) else {
            tracing::info!(batch_id = %batch.id, op_id = %op.id, "Batch pin already in flight");
            return Err(BroadcastError::Incomplete(op.id));
        };
        // Another submission may have finished between the upsert and the claim.
        let op = self.operations.get_operation(ctx, &op.id).await?;
        if op.is_succeeded() {
            tracing::info!(batch_id = %batch.id, op_id = %op.id, "Batch already pinned");
            return Ok(());
        }
        let prepared = self.operations.prepare_operation(ctx, &op).await?;
        self.operations.run_operation(ctx, prepared).await?;
        Ok(())
    }
}

/// Typed form of a `blockchain_pin_batch` operation.
#[derive(Debug, Clone, PartialEq)]
pub struct PinBatchData {
    pub signing_key: String,
    pub pin: BatchPin,
}

/// Runs `blockchain_pin_batch` operations.
pub struct PinBatchHandler {
    blockchain: Arc<dyn Blockchain>,
    database: Arc<dyn Database>,
}

impl PinBatchHandler {
    pub fn new(blockchain: Arc<dyn Blockchain>, database: Arc<dyn Database>) -> Self {
        Self {
            blockchain,
            database,
        }
    }
}

fn translation(message: impl Into<String>) -> BroadcastError {
    BroadcastError::Translation {
        op_type: OpType::BlockchainPinBatch,
        message: message.into(),
    }
}

#[async_trait]
impl OperationHandler for PinBatchHandler {
    fn name(&self) -> &str {
        "PinBatchHandler"
    }

    async fn prepare_operation(
        &self,
        ctx: &Context,
        op: &Operation,
    ) -> Result<PreparedOperation, BroadcastError> {
        let batch_id: Uuid = op
            .input_uuid("batch")
            .ok_or_else(|| translation("missing batch ID"))?;
        let payload_ref = op
            .input_str("payloadRef")
            .ok_or_else(|| translation("missing payload reference"))?;
        let signing_key = op
            .input_str("signingKey")
            .ok_or_else(|| translation("missing signing key"))?;
        let contexts = op
            .input
            .get("contexts")
            .and_then(|v| v.as_array())
            .ok_or_else(|| translation("missing contexts"))?
            .iter()
            .map(|v| {
                v.as_str()
                    .ok_or_else(|| translation("context is not a string"))?
                    .parse::<Bytes32>()
                    .map_err(translation)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let batch = self
            .database
            .get_batch(ctx, &batch_id)
            .await
            .map_err(BroadcastError::Persistence)?
            .ok_or_else(|| BroadcastError::NotFound(format!("batch {}", batch_id)))?;

        let data = PinBatchData {
            signing_key: signing_key.to_string(),
            pin: BatchPin {
                namespace: batch.namespace.clone(),
                transaction_id: batch.tx().id,
                batch_id: batch.id,
                batch_hash: batch.hash,
                payload_ref: payload_ref.to_string(),
                contexts,
            },
        };
        Ok(PreparedOperation::new(op, data))
    }

    async fn run_operation(
        &self,
        ctx: &Context,
        prepared: &PreparedOperation,
    ) -> Result<RunOutcome, BroadcastError> {
        let data = prepared
            .data::<PinBatchData>()
            .ok_or(BroadcastError::HandlerMismatch(prepared.op_type))?;
        self.blockchain
            .submit_batch_pin(ctx, &data.signing_key, &data.pin)
            .await
            .map_err(BroadcastError::Submission)?;
        Ok(RunOutcome::complete(json!({
            "batch": data.pin.batch_id.to_string(),
            "contexts": data.pin.contexts.len(),
        })))
    }
}
