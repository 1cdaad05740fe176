//! Operation tracking and execution.
//!
//! # Data Flow
//! ```text
//! Caller builds Operation (plugin, namespace, tx, type, input)
//!     → add_or_reuse_operation   (idempotent upsert on the natural key)
//!     → handler.prepare_operation (persisted input → typed PreparedOperation)
//!     → handler.run_operation     (side effect, reports complete/incomplete)
//!     → registry records outcome  (Succeeded / Pending / Failed)
//! ```
//!
//! # Design Decisions
//! - Handlers are looked up by operation type; the registry owns the
//!   status policy, handlers only report what happened
//! - Operations are never deleted and only change through targeted updates
//! - A failed operation can be re-run from its persisted input

pub mod manager;

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::context::Context;
use crate::error::BroadcastError;
use crate::model::{OpType, Operation, PreparedOperation};

pub use manager::OperationManager;

/// What a handler reports after running an operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunOutcome {
    /// The side effect finished. Incomplete operations stay pending.
    pub complete: bool,
    /// Output recorded on the operation when it succeeds.
    pub output: Option<serde_json::Value>,
}

impl RunOutcome {
    pub fn complete(output: serde_json::Value) -> Self {
        Self {
            complete: true,
            output: Some(output),
        }
    }

    pub fn incomplete() -> Self {
        Self::default()
    }
}

/// Executes one or more operation types.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Decode a persisted operation into its typed, ready-to-run form.
    async fn prepare_operation(
        &self,
        ctx: &Context,
        op: &Operation,
    ) -> Result<PreparedOperation, BroadcastError>;

    async fn run_operation(
        &self,
        ctx: &Context,
        prepared: &PreparedOperation,
    ) -> Result<RunOutcome, BroadcastError>;
}

/// Durable tracking of operations, plus dispatch to their handlers.
#[async_trait]
pub trait OperationRegistry: Send + Sync {
    /// Route the given operation types to `handler`. A later registration for
    /// the same type replaces the earlier one.
    fn register_handler(&self, handler: Arc<dyn OperationHandler>, types: &[OpType]);

    /// Persist the operation, or return the record already stored under its
    /// natural key.
    async fn add_or_reuse_operation(
        &self,
        ctx: &Context,
        op: Operation,
    ) -> Result<Operation, BroadcastError>;

    async fn prepare_operation(
        &self,
        ctx: &Context,
        op: &Operation,
    ) -> Result<PreparedOperation, BroadcastError>;

    /// Run a prepared operation and record its outcome.
    async fn run_operation(
        &self,
        ctx: &Context,
        prepared: PreparedOperation,
    ) -> Result<RunOutcome, BroadcastError>;

    /// Re-run an operation from its persisted input. Returns the updated record.
    async fn retry_operation(&self, ctx: &Context, id: &Uuid) -> Result<Operation, BroadcastError>;

    async fn get_operation(&self, ctx: &Context, id: &Uuid) -> Result<Operation, BroadcastError>;
}
