use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use abi::errors::{Error, Result};
use abi::model::{
    resolve_server_timestamps, ChangeEvent, ChangeKind, CollectionPath, DocPath, Document,
    FieldValue, Fields,
};

use crate::document::DocumentStore;

const DEFAULT_FEED_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    Set,
    Delete,
    /// list, list_group and find_by_field
    List,
}

/// makes matching operations fail with `StoreUnavailable`
#[derive(Debug, Clone)]
struct FailPoint {
    op: StoreOp,
    prefix: String,
    remaining: Option<usize>,
}

/// Process-local store, used for tests and single-node runs.
///
/// Writes to one path are serialized by the map's shard lock, so the
/// created/updated decision and the write are atomic per document.
#[derive(Debug)]
pub struct MemoryStore {
    docs: DashMap<DocPath, Document>,
    tx: broadcast::Sender<ChangeEvent>,
    clock: AtomicI64,
    fail_points: Mutex<Vec<FailPoint>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_feed_capacity(DEFAULT_FEED_CAPACITY)
    }

    pub fn with_feed_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            docs: DashMap::new(),
            tx,
            clock: AtomicI64::new(0),
            fail_points: Mutex::new(Vec::new()),
        }
    }

    /// every `op` on a path starting with `prefix` fails until cleared
    pub fn fail(&self, op: StoreOp, prefix: impl Into<String>) {
        self.add_fail_point(op, prefix.into(), None);
    }

    /// the next `times` matching operations fail
    pub fn fail_times(&self, op: StoreOp, prefix: impl Into<String>, times: usize) {
        if times > 0 {
            self.add_fail_point(op, prefix.into(), Some(times));
        }
    }

    pub fn clear_fail_points(&self) {
        self.lock_fail_points().clear();
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn add_fail_point(&self, op: StoreOp, prefix: String, remaining: Option<usize>) {
        self.lock_fail_points().push(FailPoint {
            op,
            prefix,
            remaining,
        });
    }

    fn lock_fail_points(&self) -> std::sync::MutexGuard<'_, Vec<FailPoint>> {
        self.fail_points
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, op: StoreOp, path: &str) -> Result<()> {
        let mut points = self.lock_fail_points();
        let Some(pos) = points
            .iter()
            .position(|p| p.op == op && path.starts_with(&p.prefix))
        else {
            return Ok(());
        };
        let exhausted = match points[pos].remaining.as_mut() {
            Some(remaining) => {
                *remaining -= 1;
                *remaining == 0
            }
            None => false,
        };
        if exhausted {
            points.remove(pos);
        }
        Err(Error::store_unavailable(format!(
            "injected {:?} failure at {}",
            op, path
        )))
    }

    /// wall clock in millis, strictly increasing across writes
    fn now(&self) -> i64 {
        let wall = chrono::Utc::now().timestamp_millis();
        match self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(wall.max(last + 1))
            }) {
            Ok(prev) | Err(prev) => wall.max(prev + 1),
        }
    }

    fn publish(&self, kind: ChangeKind, path: &DocPath, document: Option<Document>) {
        // no subscriber is fine
        let _ = self.tx.send(ChangeEvent {
            kind,
            path: path.clone(),
            document,
        });
    }

    fn collect<F>(&self, filter: F) -> Vec<Document>
    where
        F: Fn(&Document) -> bool,
    {
        let mut docs: Vec<Document> = self
            .docs
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        docs.sort_by(|a, b| a.path.cmp(&b.path));
        docs
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        self.check(StoreOp::Get, path.as_str())?;
        Ok(self.docs.get(path).map(|doc| doc.value().clone()))
    }

    async fn set(&self, path: &DocPath, fields: Fields) -> Result<Document> {
        self.check(StoreOp::Set, path.as_str())?;
        let now = self.now();
        let fields = resolve_server_timestamps(fields, now);
        let (doc, kind) = match self.docs.entry(path.clone()) {
            Entry::Occupied(mut entry) => {
                let doc = Document {
                    path: path.clone(),
                    fields,
                    create_time: entry.get().create_time,
                    update_time: now,
                };
                entry.insert(doc.clone());
                (doc, ChangeKind::Updated)
            }
            Entry::Vacant(entry) => {
                let doc = Document {
                    path: path.clone(),
                    fields,
                    create_time: now,
                    update_time: now,
                };
                entry.insert(doc.clone());
                (doc, ChangeKind::Created)
            }
        };
        debug!("{} {}", kind, path);
        self.publish(kind, path, Some(doc.clone()));
        Ok(doc)
    }

    async fn delete(&self, path: &DocPath) -> Result<()> {
        self.check(StoreOp::Delete, path.as_str())?;
        if self.docs.remove(path).is_some() {
            debug!("deleted {}", path);
            self.publish(ChangeKind::Deleted, path, None);
        }
        Ok(())
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>> {
        self.check(StoreOp::List, collection.as_str())?;
        Ok(self.collect(|doc| collection.contains(&doc.path)))
    }

    async fn list_group(&self, collection_id: &str) -> Result<Vec<Document>> {
        self.check(StoreOp::List, collection_id)?;
        Ok(self.collect(|doc| doc.path.parent().collection_id() == collection_id))
    }

    async fn find_by_field(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>> {
        self.check(StoreOp::List, collection.as_str())?;
        Ok(self.collect(|doc| {
            collection.contains(&doc.path) && doc.fields.get(field) == Some(value)
        }))
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}
