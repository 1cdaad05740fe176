//! Local persistence with optional JSON snapshot file.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::context::Context;
use crate::model::{Batch, Blob, Bytes32, Data, Message, Operation, OperationKey, OperationUpdate};
use crate::plugins::{Database, DataUpdate, MessageUpdate, PluginError, PluginResult};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    operations: Vec<Operation>,
    batches: Vec<Batch>,
    messages: Vec<Message>,
    data: Vec<Data>,
    blobs: Vec<Blob>,
}

/// A thread-safe store for operations, batches, messages, data and blobs.
///
/// Operations are indexed by natural key; the index entry is claimed under
/// the map's shard lock, so concurrent inserts for one key resolve to a
/// single record.
#[derive(Default)]
pub struct LocalDatabase {
    operations: DashMap<Uuid, Operation>,
    op_index: DashMap<OperationKey, Uuid>,
    batches: DashMap<Uuid, Batch>,
    messages: DashMap<Uuid, Message>,
    data: DashMap<Uuid, Data>,
    blobs: DashMap<Bytes32, Blob>,
    persistence_path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl LocalDatabase {
    /// An empty, memory-only database.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a database backed by a snapshot file, loading it if it exists.
    pub fn open(path: impl AsRef<Path>) -> PluginResult<Self> {
        let path = path.as_ref();
        let db = Self {
            persistence_path: Some(path.to_path_buf()),
            ..Self::default()
        };
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let snapshot: Snapshot = serde_json::from_reader(reader)
                .map_err(|e| PluginError::Io(format!("corrupt snapshot {:?}: {}", path, e)))?;
            for op in snapshot.operations {
                db.op_index.insert(op.key(), op.id);
                db.operations.insert(op.id, op);
            }
            for batch in snapshot.batches {
                db.batches.insert(batch.id, batch);
            }
            for msg in snapshot.messages {
                db.messages.insert(msg.header.id, msg);
            }
            for data in snapshot.data {
                db.data.insert(data.id, data);
            }
            for blob in snapshot.blobs {
                db.blobs.insert(blob.hash, blob);
            }
            tracing::info!(
                path = ?path,
                operations = db.operations.len(),
                batches = db.batches.len(),
                messages = db.messages.len(),
                "Loaded database snapshot"
            );
        }
        Ok(db)
    }

    /// Number of persisted operations.
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.operations.iter().map(|r| r.value().clone()).collect()
    }

    /// Write the snapshot file, if one is configured.
    fn persist(&self) -> PluginResult<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| PluginError::Io("snapshot lock poisoned".to_string()))?;

        let snapshot = Snapshot {
            operations: self.operations.iter().map(|r| r.value().clone()).collect(),
            batches: self.batches.iter().map(|r| r.value().clone()).collect(),
            messages: self.messages.iter().map(|r| r.value().clone()).collect(),
            data: self.data.iter().map(|r| r.value().clone()).collect(),
            blobs: self.blobs.iter().map(|r| r.value().clone()).collect(),
        };

        let tmp = path.with_extension("tmp");
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(writer, &snapshot)
                .map_err(|e| PluginError::Io(format!("snapshot write failed: {}", e)))?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[async_trait]
impl Database for LocalDatabase {
    fn name(&self) -> &str {
        "local"
    }

    async fn insert_operation_or_get(&self, ctx: &Context, op: Operation) -> PluginResult<Operation> {
        ctx.check()?;
        let existing = match self.op_index.entry(op.key()) {
            Entry::Occupied(e) => Some(*e.get()),
            Entry::Vacant(e) => {
                self.operations.insert(op.id, op.clone());
                e.insert(op.id);
                None
            }
        };
        match existing {
            Some(id) => self
                .operations
                .get(&id)
                .map(|r| r.value().clone())
                .ok_or_else(|| PluginError::NotFound(format!("operation {}", id))),
            None => {
                self.persist()?;
                Ok(op)
            }
        }
    }

    async fn get_operation(&self, ctx: &Context, id: &Uuid) -> PluginResult<Option<Operation>> {
        ctx.check()?;
        Ok(self.operations.get(id).map(|r| r.value().clone()))
    }

    async fn update_operation(
        &self,
        ctx: &Context,
        id: &Uuid,
        update: OperationUpdate,
    ) -> PluginResult<()> {
        ctx.check()?;
        {
            let mut op = self
                .operations
                .get_mut(id)
                .ok_or_else(|| PluginError::NotFound(format!("operation {}", id)))?;
            if let Some(status) = update.status {
                op.status = status;
            }
            if update.output.is_some() {
                op.output = update.output;
            }
            op.error = update.error;
            op.updated = Utc::now();
        }
        self.persist()
    }

    async fn upsert_batch(&self, ctx: &Context, batch: &Batch) -> PluginResult<()> {
        ctx.check()?;
        self.batches.insert(batch.id, batch.clone());
        self.persist()
    }

    async fn get_batch(&self, ctx: &Context, id: &Uuid) -> PluginResult<Option<Batch>> {
        ctx.check()?;
        Ok(self.batches.get(id).map(|r| r.value().clone()))
    }

    async fn update_batch_payload_ref(
        &self,
        ctx: &Context,
        id: &Uuid,
        payload_ref: &str,
    ) -> PluginResult<()> {
        ctx.check()?;
        {
            let mut batch = self
                .batches
                .get_mut(id)
                .ok_or_else(|| PluginError::NotFound(format!("batch {}", id)))?;
            batch.payload_ref = Some(payload_ref.to_string());
        }
        self.persist()
    }

    async fn insert_message(&self, ctx: &Context, msg: &Message) -> PluginResult<()> {
        ctx.check()?;
        self.messages.insert(msg.header.id, msg.clone());
        self.persist()
    }

    async fn get_message(&self, ctx: &Context, id: &Uuid) -> PluginResult<Option<Message>> {
        ctx.check()?;
        Ok(self.messages.get(id).map(|r| r.value().clone()))
    }

    async fn update_message(
        &self,
        ctx: &Context,
        id: &Uuid,
        update: MessageUpdate,
    ) -> PluginResult<()> {
        ctx.check()?;
        {
            let mut msg = self
                .messages
                .get_mut(id)
                .ok_or_else(|| PluginError::NotFound(format!("message {}", id)))?;
            if let Some(state) = update.state {
                msg.state = state;
            }
            if update.batch.is_some() {
                msg.batch = update.batch;
            }
        }
        self.persist()
    }

    async fn insert_data(&self, ctx: &Context, data: &Data) -> PluginResult<()> {
        ctx.check()?;
        self.data.insert(data.id, data.clone());
        self.persist()
    }

    async fn get_data(&self, ctx: &Context, id: &Uuid) -> PluginResult<Option<Data>> {
        ctx.check()?;
        Ok(self.data.get(id).map(|r| r.value().clone()))
    }

    async fn update_data(&self, ctx: &Context, id: &Uuid, update: DataUpdate) -> PluginResult<()> {
        ctx.check()?;
        {
            let mut data = self
                .data
                .get_mut(id)
                .ok_or_else(|| PluginError::NotFound(format!("data {}", id)))?;
            if let Some(public) = update.blob_public {
                let blob = data
                    .blob
                    .as_mut()
                    .ok_or_else(|| PluginError::request("local", format!("data {} has no blob", id)))?;
                blob.public = Some(public);
            }
        }
        self.persist()
    }

    async fn insert_blob(&self, ctx: &Context, blob: &Blob) -> PluginResult<()> {
        ctx.check()?;
        self.blobs.insert(blob.hash, blob.clone());
        self.persist()
    }

    async fn get_blob(&self, ctx: &Context, hash: &Bytes32) -> PluginResult<Option<Blob>> {
        ctx.check()?;
        Ok(self.blobs.get(hash).map(|r| r.value().clone()))
    }
}
