//! Broadcast manager facade and its builder.

use futures_util::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::batch::{BatchScheduler, DispatchHandler, DispatcherOptions};
use crate::batchpin::BatchPinSubmitter;
use crate::broadcast::dispatch::BatchDispatcher;
use crate::broadcast::operations::BatchBroadcastHandler;
use crate::broadcast::BROADCAST_DISPATCHER_NAME;
use crate::context::Context;
use crate::data::DataManager;
use crate::error::BroadcastError;
use crate::identity::IdentityManager;
use crate::model::{Batch, Bytes32, Data, DataAndBlob, MessageType, OpType, Operation, TransactionType};
use crate::observability::Metrics;
use crate::operations::OperationRegistry;
use crate::plugins::{Blockchain, DataExchange, Database, SharedStorage};
use crate::syncasync::SyncAsyncBridge;

const MANAGER_NAME: &str = "BroadcastManager";

/// Message types carried by the pinned broadcast dispatcher.
pub const BROADCAST_MESSAGE_TYPES: [MessageType; 3] = [
    MessageType::Broadcast,
    MessageType::Definition,
    MessageType::TransferBroadcast,
];

/// Names of the plugins a manager is wired to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerStatus {
    pub name: String,
    pub database: String,
    pub shared_storage: String,
    pub data_exchange: String,
    pub blockchain: String,
    pub batch_pin: String,
    pub metrics_enabled: bool,
}

/// Collects the collaborators of a [`BroadcastManager`].
#[derive(Default)]
pub struct BroadcastManagerBuilder {
    database: Option<Arc<dyn Database>>,
    identity: Option<Arc<dyn IdentityManager>>,
    data: Option<Arc<dyn DataManager>>,
    blockchain: Option<Arc<dyn Blockchain>>,
    exchange: Option<Arc<dyn DataExchange>>,
    storage: Option<Arc<dyn SharedStorage>>,
    scheduler: Option<Arc<dyn BatchScheduler>>,
    syncasync: Option<Arc<dyn SyncAsyncBridge>>,
    batchpin: Option<Arc<dyn BatchPinSubmitter>>,
    metrics: Option<Arc<dyn Metrics>>,
    operations: Option<Arc<dyn OperationRegistry>>,
    options: Option<DispatcherOptions>,
}

impl BroadcastManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityManager>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn data(mut self, data: Arc<dyn DataManager>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn blockchain(mut self, blockchain: Arc<dyn Blockchain>) -> Self {
        self.blockchain = Some(blockchain);
        self
    }

    pub fn data_exchange(mut self, exchange: Arc<dyn DataExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn shared_storage(mut self, storage: Arc<dyn SharedStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn BatchScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn syncasync(mut self, syncasync: Arc<dyn SyncAsyncBridge>) -> Self {
        self.syncasync = Some(syncasync);
        self
    }

    pub fn batchpin(mut self, batchpin: Arc<dyn BatchPinSubmitter>) -> Self {
        self.batchpin = Some(batchpin);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn operations(mut self, operations: Arc<dyn OperationRegistry>) -> Self {
        self.operations = Some(operations);
        self
    }

    /// Batch thresholds, normally from the `[broadcast]` config section. Required.
    pub fn options(mut self, options: DispatcherOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Validate the wiring, then register the dispatcher and the upload
    /// handler. Nothing is registered when a collaborator is missing.
    pub fn build(self) -> Result<Arc<BroadcastManager>, BroadcastError> {
        let database = self.database.ok_or(BroadcastError::Initialization("database"))?;
        let identity = self.identity.ok_or(BroadcastError::Initialization("identity"))?;
        let data = self.data.ok_or(BroadcastError::Initialization("data"))?;
        let blockchain = self.blockchain.ok_or(BroadcastError::Initialization("blockchain"))?;
        let exchange = self.exchange.ok_or(BroadcastError::Initialization("data exchange"))?;
        let storage = self.storage.ok_or(BroadcastError::Initialization("shared storage"))?;
        let scheduler = self.scheduler.ok_or(BroadcastError::Initialization("batch scheduler"))?;
        let syncasync = self.syncasync.ok_or(BroadcastError::Initialization("sync-async bridge"))?;
        let batchpin = self.batchpin.ok_or(BroadcastError::Initialization("batch pin submitter"))?;
        let metrics = self.metrics.ok_or(BroadcastError::Initialization("metrics"))?;
        let operations = self.operations.ok_or(BroadcastError::Initialization("operations"))?;
        let options = self.options.ok_or(BroadcastError::Initialization("options"))?;

        let dispatcher = Arc::new(BatchDispatcher {
            database: database.clone(),
            data: data.clone(),
            exchange: exchange.clone(),
            storage: storage.clone(),
            operations: operations.clone(),
            batchpin: batchpin.clone(),
            metrics: metrics.clone(),
        });

        let target = dispatcher.clone();
        let handler: DispatchHandler = Arc::new(move |ctx: Context, batch: Arc<Batch>, pins: Arc<Vec<Bytes32>>| {
            let target = target.clone();
            async move { target.dispatch_batch(&ctx, &batch, &pins).await }.boxed()
        });
        scheduler.register_dispatcher(
            BROADCAST_DISPATCHER_NAME,
            TransactionType::BatchPin,
            &BROADCAST_MESSAGE_TYPES,
            handler,
            options,
        );
        operations.register_handler(
            Arc::new(BatchBroadcastHandler::new(database.clone(), storage.clone())),
            &[OpType::SharedStorageBatchBroadcast],
        );

        tracing::info!(
            dispatcher = BROADCAST_DISPATCHER_NAME,
            storage = %storage.name(),
            exchange = %exchange.name(),
            blockchain = %blockchain.name(),
            max_count = options.max_count,
            max_bytes = options.max_bytes,
            "Broadcast manager initialized"
        );

        Ok(Arc::new(BroadcastManager {
            database,
            identity,
            data,
            blockchain,
            exchange,
            storage,
            syncasync,
            batchpin,
            metrics,
            operations,
            dispatcher,
            options,
        }))
    }
}

/// Entry point of the broadcast pipeline.
pub struct BroadcastManager {
    pub(crate) database: Arc<dyn Database>,
    pub(crate) identity: Arc<dyn IdentityManager>,
    pub(crate) data: Arc<dyn DataManager>,
    blockchain: Arc<dyn Blockchain>,
    exchange: Arc<dyn DataExchange>,
    storage: Arc<dyn SharedStorage>,
    pub(crate) syncasync: Arc<dyn SyncAsyncBridge>,
    batchpin: Arc<dyn BatchPinSubmitter>,
    pub(crate) metrics: Arc<dyn Metrics>,
    operations: Arc<dyn OperationRegistry>,
    dispatcher: Arc<BatchDispatcher>,
    options: DispatcherOptions,
}

impl BroadcastManager {
    pub fn builder() -> BroadcastManagerBuilder {
        BroadcastManagerBuilder::new()
    }

    pub fn name(&self) -> &str {
        MANAGER_NAME
    }

    pub fn status(&self) -> ManagerStatus {
        ManagerStatus {
            name: MANAGER_NAME.to_string(),
            database: self.database.name().to_string(),
            shared_storage: self.storage.name().to_string(),
            data_exchange: self.exchange.name().to_string(),
            blockchain: self.blockchain.name().to_string(),
            batch_pin: self.batchpin.name().to_string(),
            metrics_enabled: self.metrics.enabled(),
        }
    }

    /// Thresholds the dispatcher was registered with.
    pub fn options(&self) -> DispatcherOptions {
        self.options
    }

    pub fn operations(&self) -> &Arc<dyn OperationRegistry> {
        &self.operations
    }

    pub async fn dispatch_batch(
        &self,
        ctx: &Context,
        batch: &Arc<Batch>,
        pins: &[Bytes32],
    ) -> Result<(), BroadcastError> {
        self.dispatcher.dispatch_batch(ctx, batch, pins).await
    }

    pub async fn publish_blobs(
        &self,
        ctx: &Context,
        pairs: &[DataAndBlob],
    ) -> Result<(), BroadcastError> {
        self.dispatcher.publish_blobs(ctx, pairs).await
    }

    /// Upload raw content to the private transport as a blob data record,
    /// ready to be referenced by a broadcast.
    pub async fn upload_blob(
        &self,
        ctx: &Context,
        namespace: &str,
        name: &str,
        content: Vec<u8>,
    ) -> Result<Data, BroadcastError> {
        self.data.upload_blob(ctx, namespace, name, content).await
    }

    pub async fn get_operation(&self, ctx: &Context, id: &Uuid) -> Result<Operation, BroadcastError> {
        self.operations.get_operation(ctx, id).await
    }

    pub async fn retry_operation(
        &self,
        ctx: &Context,
        id: &Uuid,
    ) -> Result<Operation, BroadcastError> {
        self.operations.retry_operation(ctx, id).await
    }
}
