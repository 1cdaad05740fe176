//! Shared-storage upload of a sealed batch.

use async_trait::async_trait;
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;

use crate::context::Context;
use crate::error::BroadcastError;
use crate::model::{Batch, OpType, Operation, PreparedOperation};
use crate::operations::{OperationHandler, RunOutcome};
use crate::plugins::{Database, SharedStorage};

/// Output key holding the shared-storage reference of an uploaded batch.
pub const PAYLOAD_REF_KEY: &str = "payloadRef";

/// Typed form of a `sharedstorage_batch_broadcast` operation.
#[derive(Debug, Clone)]
pub struct BatchBroadcastData {
    pub batch: Arc<Batch>,
}

/// Input of a `sharedstorage_batch_broadcast` operation for `batch`.
pub fn batch_broadcast_operation(plugin: &str, batch: &Batch) -> Operation {
    Operation::new(
        plugin,
        &batch.namespace,
        batch.tx().id,
        OpType::SharedStorageBatchBroadcast,
    )
    .with_input("batch", json!(batch.id.to_string()))
}

pub fn prepare_batch_broadcast(op: &Operation, batch: Arc<Batch>) -> PreparedOperation {
    PreparedOperation::new(op, BatchBroadcastData { batch })
}

/// Uploads batch payloads to shared storage.
pub struct BatchBroadcastHandler {
    database: Arc<dyn Database>,
    storage: Arc<dyn SharedStorage>,
}

impl BatchBroadcastHandler {
    pub fn new(database: Arc<dyn Database>, storage: Arc<dyn SharedStorage>) -> Self {
        Self { database, storage }
    }
}

#[async_trait]
impl OperationHandler for BatchBroadcastHandler {
    fn name(&self) -> &str {
        "BroadcastManager"
    }

    async fn prepare_operation(
        &self,
        ctx: &Context,
        op: &Operation,
    ) -> Result<PreparedOperation, BroadcastError> {
        let batch_id = op.input_uuid("batch").ok_or_else(|| BroadcastError::Translation {
            op_type: op.op_type,
            message: "missing batch ID".to_string(),
        })?;
        let batch = self
            .database
            .get_batch(ctx, &batch_id)
            .await
            .map_err(BroadcastError::Persistence)?
            .ok_or_else(|| BroadcastError::NotFound(format!("batch {}", batch_id)))?;
        Ok(prepare_batch_broadcast(op, Arc::new(batch)))
    }

    async fn run_operation(
        &self,
        ctx: &Context,
        prepared: &PreparedOperation,
    ) -> Result<RunOutcome, BroadcastError> {
        let data = prepared
            .data::<BatchBroadcastData>()
            .ok_or(BroadcastError::HandlerMismatch(prepared.op_type))?;
        let batch = &data.batch;

        let payload = serde_json::to_vec(batch.as_ref())?;
        let public_ref = self
            .storage
            .publish_data(ctx, Box::new(Cursor::new(payload)))
            .await
            .map_err(|e| BroadcastError::transfer(format!("batch {}", batch.id), e))?;
        tracing::info!(
            batch_id = %batch.id,
            op_id = %prepared.id,
            public_ref = %public_ref,
            "Published batch to shared storage"
        );

        self.database
            .update_batch_payload_ref(ctx, &batch.id, &public_ref)
            .await
            .map_err(BroadcastError::Persistence)?;
        Ok(RunOutcome::complete(json!({ PAYLOAD_REF_KEY: public_ref })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SignerRef, TransactionRef};
    use crate::plugins::{BlobReader, LocalDatabase, PluginResult};
    use tokio::io::AsyncReadExt;

    struct Echo;

    #[async_trait]
    impl SharedStorage for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn publish_data(&self, _ctx: &Context, mut data: BlobReader) -> PluginResult<String> {
            let mut content = Vec::new();
            data.read_to_end(&mut content).await?;
            Ok(format!("Qm{}", content.len()))
        }
    }

    fn batch() -> Batch {
        Batch::seal(
            "ns1",
            SignerRef::default(),
            TransactionRef::new_batch_pin(),
            vec![],
            vec![],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_prepare_reloads_batch() {
        let db = Arc::new(LocalDatabase::in_memory());
        let handler = BatchBroadcastHandler::new(db.clone(), Arc::new(Echo));
        let ctx = Context::background();
        let batch = batch();
        let op = batch_broadcast_operation("echo", &batch);

        assert!(matches!(
            handler.prepare_operation(&ctx, &op).await,
            Err(BroadcastError::NotFound(_))
        ));

        db.upsert_batch(&ctx, &batch).await.unwrap();
        let prepared = handler.prepare_operation(&ctx, &op).await.unwrap();
        assert_eq!(prepared.data::<BatchBroadcastData>().unwrap().batch.id, batch.id);

        let outcome = handler.run_operation(&ctx, &prepared).await.unwrap();
        assert!(outcome.complete);
        let stored = db.get_batch(&ctx, &batch.id).await.unwrap().unwrap();
        assert_eq!(
            stored.payload_ref.as_deref(),
            outcome.output.as_ref().and_then(|o| o[PAYLOAD_REF_KEY].as_str())
        );
    }

    #[tokio::test]
    async fn test_missing_input_and_wrong_payload() {
        let handler = BatchBroadcastHandler::new(Arc::new(LocalDatabase::in_memory()), Arc::new(Echo));
        let ctx = Context::background();
        let batch = batch();
        let mut op = batch_broadcast_operation("echo", &batch);
        op.input.clear();
        assert!(matches!(
            handler.prepare_operation(&ctx, &op).await,
            Err(BroadcastError::Translation { .. })
        ));

        let wrong = PreparedOperation::new(&op, "not a batch".to_string());
        assert!(matches!(
            handler.run_operation(&ctx, &wrong).await,
            Err(BroadcastError::HandlerMismatch(OpType::SharedStorageBatchBroadcast))
        ));
    }
}
