//! Operation registry backed by the persistence plugin.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::context::Context;
use crate::error::BroadcastError;
use crate::model::{OpType, Operation, OperationUpdate, PreparedOperation};
use crate::operations::{OperationHandler, OperationRegistry, RunOutcome};
use crate::plugins::Database;

/// Tracks operations in the database and runs them through registered handlers.
pub struct OperationManager {
    database: Arc<dyn Database>,
    handlers: DashMap<OpType, Arc<dyn OperationHandler>>,
}

impl OperationManager {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self {
            database,
            handlers: DashMap::new(),
        }
    }

    /// Operation types that currently have a handler.
    pub fn registered_types(&self) -> Vec<OpType> {
        self.handlers.iter().map(|e| *e.key()).collect()
    }

    fn handler_for(&self, op_type: OpType) -> Result<Arc<dyn OperationHandler>, BroadcastError> {
        self.handlers
            .get(&op_type)
            .map(|h| Arc::clone(h.value()))
            .ok_or(BroadcastError::HandlerMismatch(op_type))
    }

    async fn record(&self, ctx: &Context, id: &Uuid, update: OperationUpdate) -> Result<(), BroadcastError> {
        self.database
            .update_operation(ctx, id, update)
            .await
            .map_err(BroadcastError::persistence)
    }
}

#[async_trait]
impl OperationRegistry for OperationManager {
    fn register_handler(&self, handler: Arc<dyn OperationHandler>, types: &[OpType]) {
        for op_type in types {
            tracing::debug!(handler = handler.name(), op_type = %op_type, "Registered operation handler");
            self.handlers.insert(*op_type, Arc::clone(&handler));
        }
    }

    async fn add_or_reuse_operation(
        &self,
        ctx: &Context,
        op: Operation,
    ) -> Result<Operation, BroadcastError> {
        let requested = op.id;
        let stored = self
            .database
            .insert_operation_or_get(ctx, op)
            .await
            .map_err(BroadcastError::Persistence)?;
        if stored.id != requested {
            tracing::debug!(
                op_id = %stored.id,
                tx = %stored.tx,
                op_type = %stored.op_type,
                status = ?stored.status,
                "Reusing existing operation"
            );
        }
        Ok(stored)
    }

    async fn prepare_operation(
        &self,
        ctx: &Context,
        op: &Operation,
    ) -> Result<PreparedOperation, BroadcastError> {
        self.handler_for(op.op_type)?.prepare_operation(ctx, op).await
    }

    async fn run_operation(
        &self,
        ctx: &Context,
        prepared: PreparedOperation,
    ) -> Result<RunOutcome, BroadcastError> {
        let handler = self.handler_for(prepared.op_type)?;
        match handler.run_operation(ctx, &prepared).await {
            Ok(outcome) if outcome.complete => {
                self.record(ctx, &prepared.id, OperationUpdate::succeeded(outcome.output.clone()))
                    .await?;
                tracing::info!(op_id = %prepared.id, op_type = %prepared.op_type, "Operation succeeded");
                Ok(outcome)
            }
            Ok(outcome) => {
                tracing::debug!(op_id = %prepared.id, op_type = %prepared.op_type, "Operation pending");
                Ok(outcome)
            }
            Err(e) if e.is_cancellation() => {
                // Interrupted, not failed: left pending for the next attempt.
                tracing::info!(op_id = %prepared.id, error = %e, "Operation interrupted");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(op_id = %prepared.id, op_type = %prepared.op_type, error = %e, "Operation failed");
                if let Err(update_err) = self
                    .record(ctx, &prepared.id, OperationUpdate::failed(e.to_string()))
                    .await
                {
                    tracing::error!(op_id = %prepared.id, error = %update_err, "Failed to record operation failure");
                }
                Err(e)
            }
        }
    }

    async fn retry_operation(&self, ctx: &Context, id: &Uuid) -> Result<Operation, BroadcastError> {
        let op = self.get_operation(ctx, id).await?;
        if op.is_succeeded() {
            return Ok(op);
        }
        tracing::info!(op_id = %op.id, op_type = %op.op_type, "Retrying operation");
        let prepared = self.prepare_operation(ctx, &op).await?;
        self.run_operation(ctx, prepared).await?;
        self.get_operation(ctx, id).await
    }

    async fn get_operation(&self, ctx: &Context, id: &Uuid) -> Result<Operation, BroadcastError> {
        self.database
            .get_operation(ctx, id)
            .await
            .map_err(BroadcastError::Persistence)?
            .ok_or_else(|| BroadcastError::NotFound(format!("operation {}", id)))
    }
}
