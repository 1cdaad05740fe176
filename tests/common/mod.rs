//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use uuid::Uuid;

use batch_anchor::batch::{BatchScheduler, DispatchHandler, DispatcherOptions};
use batch_anchor::batchpin::BatchPinSubmitter;
use batch_anchor::config::NodeConfig;
use batch_anchor::context::Context;
use batch_anchor::data::LocalDataManager;
use batch_anchor::error::BroadcastError;
use batch_anchor::identity::LocalIdentity;
use batch_anchor::model::{
    Batch, Blob, BlobRef, Bytes32, Data, DataAndBlob, Message, MessageType, Operation,
    OperationUpdate, SignerRef, TransactionRef, TransactionType,
};
use batch_anchor::observability::NoopMetrics;
use batch_anchor::operations::OperationManager;
use batch_anchor::plugins::{
    BatchPin, BlobReader, Blockchain, DataExchange, DataUpdate, Database, LocalDatabase,
    MessageUpdate, PluginError, PluginResult, SharedStorage, UploadedBlob,
};
use batch_anchor::syncasync::LocalBridge;
use batch_anchor::{BroadcastManager, BroadcastManagerBuilder};

pub const SIGNING_KEY: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Registration {
    pub name: String,
    pub tx_type: TransactionType,
    pub msg_types: Vec<MessageType>,
    pub options: DispatcherOptions,
    pub handler: DispatchHandler,
}

/// Scheduler that records registrations and staged messages without batching.
#[derive(Default)]
pub struct RecordingScheduler {
    pub registrations: Mutex<Vec<Registration>>,
    pub messages: Mutex<Vec<Message>>,
}

impl RecordingScheduler {
    pub fn registration_count(&self) -> usize {
        self.registrations.lock().unwrap().len()
    }

    pub fn registration(&self) -> Registration {
        self.registrations.lock().unwrap()[0].clone()
    }

    pub fn staged(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchScheduler for RecordingScheduler {
    fn register_dispatcher(
        &self,
        name: &str,
        tx_type: TransactionType,
        msg_types: &[MessageType],
        handler: DispatchHandler,
        options: DispatcherOptions,
    ) {
        self.registrations.lock().unwrap().push(Registration {
            name: name.to_string(),
            tx_type,
            msg_types: msg_types.to_vec(),
            options,
            handler,
        });
    }

    async fn new_message(&self, _ctx: &Context, msg: &Message) -> Result<(), BroadcastError> {
        self.messages.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// In-memory database with switchable faults.
#[derive(Default)]
pub struct FaultyDatabase {
    pub inner: LocalDatabase,
    pub fail_insert_operation: AtomicBool,
    /// Data IDs whose `update_data` fails.
    pub fail_update_data: Mutex<HashSet<Uuid>>,
    pub data_updates: Mutex<Vec<(Uuid, DataUpdate)>>,
}

impl FaultyDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_updates(&self) -> Vec<(Uuid, DataUpdate)> {
        self.data_updates.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.inner.operations()
    }
}

#[async_trait]
impl Database for FaultyDatabase {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn insert_operation_or_get(&self, ctx: &Context, op: Operation) -> PluginResult<Operation> {
        if self.fail_insert_operation.load(Ordering::SeqCst) {
            return Err(PluginError::Io("operation table unavailable".into()));
        }
        self.inner.insert_operation_or_get(ctx, op).await
    }

    async fn get_operation(&self, ctx: &Context, id: &Uuid) -> PluginResult<Option<Operation>> {
        self.inner.get_operation(ctx, id).await
    }

    async fn update_operation(
        &self,
        ctx: &Context,
        id: &Uuid,
        update: OperationUpdate,
    ) -> PluginResult<()> {
        self.inner.update_operation(ctx, id, update).await
    }

    async fn upsert_batch(&self, ctx: &Context, batch: &Batch) -> PluginResult<()> {
        self.inner.upsert_batch(ctx, batch).await
    }

    async fn get_batch(&self, ctx: &Context, id: &Uuid) -> PluginResult<Option<Batch>> {
        self.inner.get_batch(ctx, id).await
    }

    async fn update_batch_payload_ref(
        &self,
        ctx: &Context,
        id: &Uuid,
        payload_ref: &str,
    ) -> PluginResult<()> {
        self.inner.update_batch_payload_ref(ctx, id, payload_ref).await
    }

    async fn insert_message(&self, ctx: &Context, msg: &Message) -> PluginResult<()> {
        self.inner.insert_message(ctx, msg).await
    }

    async fn get_message(&self, ctx: &Context, id: &Uuid) -> PluginResult<Option<Message>> {
        self.inner.get_message(ctx, id).await
    }

    async fn update_message(
        &self,
        ctx: &Context,
        id: &Uuid,
        update: MessageUpdate,
    ) -> PluginResult<()> {
        self.inner.update_message(ctx, id, update).await
    }

    async fn insert_data(&self, ctx: &Context, data: &Data) -> PluginResult<()> {
        self.inner.insert_data(ctx, data).await
    }

    async fn get_data(&self, ctx: &Context, id: &Uuid) -> PluginResult<Option<Data>> {
        self.inner.get_data(ctx, id).await
    }

    async fn update_data(&self, ctx: &Context, id: &Uuid, update: DataUpdate) -> PluginResult<()> {
        if self.fail_update_data.lock().unwrap().contains(id) {
            return Err(PluginError::Io(format!("update of data {} rejected", id)));
        }
        self.data_updates.lock().unwrap().push((*id, update.clone()));
        self.inner.update_data(ctx, id, update).await
    }

    async fn insert_blob(&self, ctx: &Context, blob: &Blob) -> PluginResult<()> {
        self.inner.insert_blob(ctx, blob).await
    }

    async fn get_blob(&self, ctx: &Context, hash: &Bytes32) -> PluginResult<Option<Blob>> {
        self.inner.get_blob(ctx, hash).await
    }
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// Reader that counts itself open until dropped.
pub struct TrackedReader {
    inner: Cursor<Vec<u8>>,
    open: Arc<AtomicUsize>,
}

impl TrackedReader {
    pub fn new(content: Vec<u8>, open: Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self {
            inner: Cursor::new(content),
            open,
        }
    }
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Private transport holding blobs in memory.
#[derive(Default)]
pub struct ScriptedExchange {
    pub blobs: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_download: Mutex<HashSet<String>>,
    pub downloads: Mutex<Vec<String>>,
    pub open_readers: Arc<AtomicUsize>,
}

impl ScriptedExchange {
    pub fn put(&self, payload_ref: &str, content: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(payload_ref.to_string(), content.to_vec());
    }

    pub fn fail_on(&self, payload_ref: &str) {
        self.fail_download.lock().unwrap().insert(payload_ref.to_string());
    }

    pub fn open_readers(&self) -> usize {
        self.open_readers.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataExchange for ScriptedExchange {
    fn name(&self) -> &str {
        "scripted-dx"
    }

    async fn download_blob(&self, ctx: &Context, payload_ref: &str) -> PluginResult<BlobReader> {
        ctx.check()?;
        self.downloads.lock().unwrap().push(payload_ref.to_string());
        if self.fail_download.lock().unwrap().contains(payload_ref) {
            return Err(PluginError::request("scripted-dx", "peer unreachable"));
        }
        let content = self
            .blobs
            .lock()
            .unwrap()
            .get(payload_ref)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(payload_ref.to_string()))?;
        Ok(Box::new(TrackedReader::new(content, self.open_readers.clone())))
    }

    async fn upload_blob(
        &self,
        ctx: &Context,
        namespace: &str,
        id: &Uuid,
        content: Vec<u8>,
    ) -> PluginResult<UploadedBlob> {
        ctx.check()?;
        let payload_ref = format!("{}/{}", namespace, id);
        let uploaded = UploadedBlob {
            payload_ref: payload_ref.clone(),
            hash: Bytes32::hash(&content),
            size: content.len() as u64,
        };
        self.blobs.lock().unwrap().insert(payload_ref, content);
        Ok(uploaded)
    }
}

/// Shared storage that keeps published content and can fail on demand.
#[derive(Default)]
pub struct ScriptedStorage {
    pub published: Mutex<Vec<Vec<u8>>>,
    /// Number of upcoming publishes that fail.
    pub fail_next: AtomicUsize,
    /// Publishes whose content equals one of these fail.
    pub fail_content: Mutex<Vec<Vec<u8>>>,
    pub delay: Mutex<Option<Duration>>,
}

impl ScriptedStorage {
    pub fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub fn published(&self) -> Vec<Vec<u8>> {
        self.published.lock().unwrap().clone()
    }

    pub fn public_ref(content: &[u8]) -> String {
        format!("Qm{}", &Bytes32::hash(content).to_string()[..16])
    }
}

#[async_trait]
impl SharedStorage for ScriptedStorage {
    fn name(&self) -> &str {
        "scripted-ipfs"
    }

    async fn publish_data(&self, ctx: &Context, mut data: BlobReader) -> PluginResult<String> {
        use tokio::io::AsyncReadExt;

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            ctx.run(async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;
        }
        let mut content = Vec::new();
        data.read_to_end(&mut content).await?;

        let scheduled_failure = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scheduled_failure || self.fail_content.lock().unwrap().contains(&content) {
            return Err(PluginError::request("scripted-ipfs", "upload rejected"));
        }
        let public_ref = Self::public_ref(&content);
        self.published.lock().unwrap().push(content);
        Ok(public_ref)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PinCall {
    pub batch_id: Uuid,
    pub tx: Uuid,
    pub pins: Vec<Bytes32>,
    pub payload_ref: String,
}

/// Pin submitter that records each call.
#[derive(Default)]
pub struct RecordingPinSubmitter {
    pub calls: Mutex<Vec<PinCall>>,
    pub fail: AtomicBool,
}

impl RecordingPinSubmitter {
    pub fn calls(&self) -> Vec<PinCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchPinSubmitter for RecordingPinSubmitter {
    fn name(&self) -> &str {
        "recording-pins"
    }

    async fn submit_pinned_batch(
        &self,
        _ctx: &Context,
        batch: &Batch,
        pins: &[Bytes32],
        payload_ref: &str,
    ) -> Result<(), BroadcastError> {
        self.calls.lock().unwrap().push(PinCall {
            batch_id: batch.id,
            tx: batch.tx().id,
            pins: pins.to_vec(),
            payload_ref: payload_ref.to_string(),
        });
        if self.fail.load(Ordering::SeqCst) {
            return Err(BroadcastError::Submission(PluginError::request(
                "recording-pins",
                "nonce too low",
            )));
        }
        Ok(())
    }
}

/// Ledger that records submitted pins.
#[derive(Default)]
pub struct RecordingChain {
    pub pins: Mutex<Vec<(String, BatchPin)>>,
}

impl RecordingChain {
    pub fn pins(&self) -> Vec<(String, BatchPin)> {
        self.pins.lock().unwrap().clone()
    }
}

#[async_trait]
impl Blockchain for RecordingChain {
    fn name(&self) -> &str {
        "recording-chain"
    }

    async fn submit_batch_pin(
        &self,
        ctx: &Context,
        signing_key: &str,
        pin: &BatchPin,
    ) -> PluginResult<()> {
        ctx.check()?;
        self.pins
            .lock()
            .unwrap()
            .push((signing_key.to_string(), pin.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub fn node_config() -> NodeConfig {
    NodeConfig {
        name: "node1".into(),
        org: "org1".into(),
        signing_key: SIGNING_KEY.into(),
    }
}

pub fn test_options() -> DispatcherOptions {
    DispatcherOptions {
        max_count: 10,
        max_bytes: 100_000,
        timeout: Duration::from_millis(20),
        dispose_timeout: Duration::from_millis(200),
    }
}

/// Every collaborator of a broadcast manager, as test doubles.
pub struct Harness {
    pub db: Arc<FaultyDatabase>,
    pub scheduler: Arc<RecordingScheduler>,
    pub exchange: Arc<ScriptedExchange>,
    pub storage: Arc<ScriptedStorage>,
    pub chain: Arc<RecordingChain>,
    pub pins: Arc<RecordingPinSubmitter>,
    pub operations: Arc<OperationManager>,
    pub bridge: Arc<LocalBridge>,
    pub identity: Arc<LocalIdentity>,
    pub data: Arc<LocalDataManager>,
}

impl Harness {
    pub fn new() -> Self {
        let db = Arc::new(FaultyDatabase::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let exchange = Arc::new(ScriptedExchange::default());
        let operations = Arc::new(OperationManager::new(db.clone()));
        let data = Arc::new(LocalDataManager::new(
            db.clone(),
            exchange.clone(),
            scheduler.clone(),
        ));
        Self {
            bridge: Arc::new(LocalBridge::new(db.clone(), Duration::from_millis(500))),
            identity: Arc::new(LocalIdentity::new(&node_config())),
            storage: Arc::new(ScriptedStorage::default()),
            chain: Arc::new(RecordingChain::default()),
            pins: Arc::new(RecordingPinSubmitter::default()),
            db,
            scheduler,
            exchange,
            operations,
            data,
        }
    }

    /// A builder with every collaborator set.
    pub fn builder(&self) -> BroadcastManagerBuilder {
        BroadcastManager::builder()
            .database(self.db.clone())
            .identity(self.identity.clone())
            .data(self.data.clone())
            .blockchain(self.chain.clone())
            .data_exchange(self.exchange.clone())
            .shared_storage(self.storage.clone())
            .scheduler(self.scheduler.clone())
            .syncasync(self.bridge.clone())
            .batchpin(self.pins.clone())
            .metrics(Arc::new(NoopMetrics))
            .operations(self.operations.clone())
            .options(test_options())
    }

    pub fn manager(&self) -> Arc<BroadcastManager> {
        self.builder().build().expect("manager builds")
    }

    /// Stage a blob in the transport and persist its data and blob records.
    pub async fn stage_blob(&self, namespace: &str, content: &[u8]) -> DataAndBlob {
        let ctx = Context::background();
        let hash = Bytes32::hash(content);
        let payload_ref = format!("{}/{}", namespace, Uuid::new_v4());
        self.exchange.put(&payload_ref, content);
        let blob = Blob {
            hash,
            payload_ref,
            size: content.len() as u64,
            created: chrono::Utc::now(),
        };
        self.db.insert_blob(&ctx, &blob).await.unwrap();
        let data = Data::from_blob(
            namespace,
            BlobRef {
                hash,
                size: blob.size,
                name: String::new(),
                public: None,
            },
        );
        self.db.insert_data(&ctx, &data).await.unwrap();
        DataAndBlob { data, blob }
    }

    /// Persist a sealed batch over `data`, with one message per entry.
    pub async fn stage_batch(&self, namespace: &str, tx: TransactionRef, data: Vec<Data>) -> Arc<Batch> {
        let ctx = Context::background();
        let batch = Batch::seal(
            namespace,
            SignerRef {
                author: "org1".into(),
                key: SIGNING_KEY.into(),
            },
            tx,
            vec![],
            data,
        )
        .unwrap();
        self.db.upsert_batch(&ctx, &batch).await.unwrap();
        Arc::new(batch)
    }
}

pub fn pin(label: &str) -> Bytes32 {
    Bytes32::hash(label)
}
