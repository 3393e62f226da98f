//! In-memory collaborators.
//!
//! Both stores record every call they receive and can be told to fail or
//! stall, which is how the pipeline's cleanup and ordering guarantees are
//! exercised without a real database or media host.

use super::{
    blob_store::{BlobError, BlobMeta, BlobResult, BlobStore, StoredBlob, Transform},
    content_store::{ContentStore, Document, Fields, StoreError, StoreResult},
};
use crate::models::upload::Upload;
use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobCall {
    Upload { folder: String, id: String },
    Delete { id: String },
}

#[derive(Default)]
struct BlobState {
    blobs: BTreeMap<String, String>,
    calls: Vec<BlobCall>,
    next: u64,
    fail_uploads: bool,
    fail_deletes: bool,
    upload_delay: Option<Duration>,
    delete_delay: Option<Duration>,
}

/// BlobStore keeping identifiers and URLs in a map.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<BlobState>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads(&self, fail: bool) {
        lock(&self.inner).fail_uploads = fail;
    }

    pub fn fail_deletes(&self, fail: bool) {
        lock(&self.inner).fail_deletes = fail;
    }

    pub fn set_upload_delay(&self, delay: Option<Duration>) {
        lock(&self.inner).upload_delay = delay;
    }

    pub fn set_delete_delay(&self, delay: Option<Duration>) {
        lock(&self.inner).delete_delay = delay;
    }

    /// Place a blob directly, without recording a call.
    pub fn seed(&self, folder: &str, ext: &str) -> StoredBlob {
        let mut state = lock(&self.inner);
        let blob = Self::mint(&mut state, folder, ext, 0);
        state.blobs.insert(blob.id.clone(), blob.url.clone());
        blob
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.inner).blobs.contains_key(id)
    }

    pub fn contains_url(&self, url: &str) -> bool {
        lock(&self.inner).blobs.values().any(|u| u == url)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn calls(&self) -> Vec<BlobCall> {
        lock(&self.inner).calls.clone()
    }

    /// Identifiers of every successful upload, in order.
    pub fn uploads(&self) -> Vec<String> {
        lock(&self.inner)
            .calls
            .iter()
            .filter_map(|call| match call {
                BlobCall::Upload { id, .. } => Some(id.clone()),
                BlobCall::Delete { .. } => None,
            })
            .collect()
    }

    /// Identifiers passed to every delete attempt, in order.
    pub fn deletes(&self) -> Vec<String> {
        lock(&self.inner)
            .calls
            .iter()
            .filter_map(|call| match call {
                BlobCall::Delete { id } => Some(id.clone()),
                BlobCall::Upload { .. } => None,
            })
            .collect()
    }

    fn mint(state: &mut BlobState, folder: &str, ext: &str, bytes: u64) -> StoredBlob {
        state.next += 1;
        let stem = format!("blob{:04}", state.next);
        StoredBlob {
            url: format!("memory://blobs/{folder}/{stem}.{ext}"),
            id: format!("{folder}/{stem}"),
            meta: BlobMeta {
                bytes,
                format: Some(ext.to_string()),
                ..BlobMeta::default()
            },
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        upload: &Upload,
        folder: &str,
        _transform: &Transform,
    ) -> BlobResult<StoredBlob> {
        let delay = lock(&self.inner).upload_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.inner);
        if state.fail_uploads {
            return Err(BlobError::Rejected("injected upload failure".into()));
        }
        let ext = upload.extension().unwrap_or_else(|| "bin".into());
        let blob = Self::mint(&mut state, folder, &ext, upload.size() as u64);
        state.blobs.insert(blob.id.clone(), blob.url.clone());
        state.calls.push(BlobCall::Upload {
            folder: folder.to_string(),
            id: blob.id.clone(),
        });
        Ok(blob)
    }

    async fn delete(&self, id: &str) -> BlobResult<()> {
        let delay = lock(&self.inner).delete_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.inner);
        state.calls.push(BlobCall::Delete { id: id.to_string() });
        if state.fail_deletes {
            return Err(BlobError::Io(std::io::Error::other(
                "injected delete failure",
            )));
        }
        state
            .blobs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(id.to_string()))
    }

    async fn ping(&self) -> BlobResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Insert { collection: String },
    Get { collection: String, id: String },
    List { collection: String },
    Query { collection: String, field: String },
    Update { collection: String, id: String },
    Delete { collection: String, id: String },
}

#[derive(Default)]
struct ContentState {
    collections: BTreeMap<String, Vec<Document>>,
    calls: Vec<StoreCall>,
    next: u64,
    fail_writes: bool,
    failing_queries: usize,
    query_delay: Option<Duration>,
    write_delay: Option<Duration>,
}

/// ContentStore keeping documents in insertion order per collection.
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    inner: Arc<Mutex<ContentState>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make insert, update and delete fail until reset.
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.inner).fail_writes = fail;
    }

    /// Make the next `count` field queries fail.
    pub fn fail_queries(&self, count: usize) {
        lock(&self.inner).failing_queries = count;
    }

    pub fn set_query_delay(&self, delay: Option<Duration>) {
        lock(&self.inner).query_delay = delay;
    }

    pub fn set_write_delay(&self, delay: Option<Duration>) {
        lock(&self.inner).write_delay = delay;
    }

    /// Insert a document directly, without recording a call.
    pub fn seed(&self, collection: &str, fields: Fields) -> String {
        let mut state = lock(&self.inner);
        Self::push(&mut state, collection, fields)
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        lock(&self.inner)
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.inner).calls.clone()
    }

    fn push(state: &mut ContentState, collection: &str, fields: Fields) -> String {
        state.next += 1;
        let id = format!("doc{:04}", state.next);
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(Document::new(id.clone(), fields));
        id
    }

    async fn pause(&self, pick: fn(&ContentState) -> Option<Duration>) {
        let delay = pick(&lock(&self.inner));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn injected() -> StoreError {
        StoreError::Unavailable("injected write failure".into())
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn insert(&self, collection: &str, fields: Fields) -> StoreResult<String> {
        self.pause(|s| s.write_delay).await;
        let mut state = lock(&self.inner);
        state.calls.push(StoreCall::Insert {
            collection: collection.to_string(),
        });
        if state.fail_writes {
            return Err(Self::injected());
        }
        Ok(Self::push(&mut state, collection, fields))
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Document> {
        let mut state = lock(&self.inner);
        state.calls.push(StoreCall::Get {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        state
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let mut state = lock(&self.inner);
        state.calls.push(StoreCall::List {
            collection: collection.to_string(),
        });
        Ok(state
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<Document>> {
        self.pause(|s| s.query_delay).await;
        let mut state = lock(&self.inner);
        state.calls.push(StoreCall::Query {
            collection: collection.to_string(),
            field: field.to_string(),
        });
        if state.failing_queries > 0 {
            state.failing_queries -= 1;
            return Err(StoreError::Unavailable("injected query failure".into()));
        }
        Ok(state
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| d.fields.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(&self, collection: &str, id: &str, patch: Fields) -> StoreResult<()> {
        self.pause(|s| s.write_delay).await;
        let mut state = lock(&self.inner);
        state.calls.push(StoreCall::Update {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        if state.fail_writes {
            return Err(Self::injected());
        }
        let doc = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        doc.fields.extend(patch);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.pause(|s| s.write_delay).await;
        let mut state = lock(&self.inner);
        state.calls.push(StoreCall::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        if state.fail_writes {
            return Err(Self::injected());
        }
        let docs = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        let before = docs.len();
        docs.retain(|d| d.id != id);
        if docs.len() == before {
            return Err(StoreError::not_found(collection, id));
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
