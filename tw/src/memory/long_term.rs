//! Long-term memory: per-thread similarity recall over past user turns

use async_trait::async_trait;
use memorystore::{Filter, MemoryStore, NewRecord, QueryOptions};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use super::StoreError;
use crate::domain::{ChatRole, MemoryHit};

/// Key of a memory record
pub fn memory_id(thread_id: &str, message_id: &str) -> String {
    format!("{}:{}", thread_id, message_id)
}

/// Long-term memory collaborator
#[async_trait]
pub trait LongTermMemory: Send + Sync {
    /// Put-by-key: any record under `thread_id:message_id` is replaced
    async fn upsert(&self, thread_id: &str, message_id: &str, role: ChatRole, text: &str) -> Result<(), StoreError>;

    /// Top-k memories of one thread, most relevant first
    async fn query(&self, thread_id: &str, text: &str, top_k: usize) -> Result<Vec<MemoryHit>, StoreError>;

    /// Delete every memory of a thread
    async fn delete_thread(&self, thread_id: &str) -> Result<usize, StoreError>;

    /// Delete every memory
    async fn delete_all(&self) -> Result<usize, StoreError>;
}

/// Long-term memory backed by a local `memorystore` collection
///
/// Store calls block on file I/O, so they run on the blocking pool behind a
/// semaphore.
pub struct LocalLongTermMemory {
    store: Arc<MemoryStore>,
    collection: String,
    limiter: Arc<Semaphore>,
}

impl LocalLongTermMemory {
    pub fn new(store: Arc<MemoryStore>, collection: impl Into<String>, permits: usize) -> Self {
        Self {
            store,
            collection: collection.into(),
            limiter: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    /// Open a file-backed store under `dir`
    pub fn open(dir: &Path, collection: impl Into<String>, permits: usize) -> Result<Self, StoreError> {
        let store = MemoryStore::open(dir)?;
        Ok(Self::new(Arc::new(store), collection, permits))
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&MemoryStore, &str) -> eyre::Result<T> + Send + 'static,
    {
        let _permit = self.limiter.acquire().await.map_err(|_| StoreError::Closed)?;
        let store = self.store.clone();
        let collection = self.collection.clone();
        let result = tokio::task::spawn_blocking(move || op(store.as_ref(), collection.as_str())).await?;
        Ok(result?)
    }
}

#[async_trait]
impl LongTermMemory for LocalLongTermMemory {
    async fn upsert(&self, thread_id: &str, message_id: &str, role: ChatRole, text: &str) -> Result<(), StoreError> {
        let id = memory_id(thread_id, message_id);
        debug!(%id, "LocalLongTermMemory::upsert: called");
        let record = NewRecord::new(id, text)
            .with_meta("thread_id", thread_id)
            .with_meta("message_id", message_id)
            .with_meta("role", role.as_str());
        self.run_blocking(move |store, collection| store.upsert(collection, record))
            .await
    }

    async fn query(&self, thread_id: &str, text: &str, top_k: usize) -> Result<Vec<MemoryHit>, StoreError> {
        debug!(%thread_id, top_k, "LocalLongTermMemory::query: called");
        let options = QueryOptions::text(text, top_k).filter(Filter::eq("thread_id", thread_id));
        let hits = self
            .run_blocking(move |store, collection| store.query(collection, &options))
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| MemoryHit {
                message_id: hit.metadata.get("message_id").and_then(|v| v.as_str()).map(str::to_string),
                role: hit.metadata.get("role").and_then(|v| v.as_str()).map(str::to_string),
                id: hit.id,
                text: hit.text,
                score: hit.score,
            })
            .collect())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<usize, StoreError> {
        debug!(%thread_id, "LocalLongTermMemory::delete_thread: called");
        let filter = Filter::eq("thread_id", thread_id);
        self.run_blocking(move |store, collection| store.delete_where(collection, &filter))
            .await
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        debug!("LocalLongTermMemory::delete_all: called");
        self.run_blocking(|store, collection| store.clear(collection)).await
    }
}
