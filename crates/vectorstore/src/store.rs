//! The per-user vector index.
//!
//! A single reader/writer lock guards every cached collection: searches share
//! it, mutations take it exclusively. Collections are loaded (or created) on
//! first access and kept for the life of the process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use mnemo_core::UserId;
use mnemo_core::error::VectorError;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::collection::{Collection, Document, SearchResult};
use crate::embedding::EmbeddingFunction;

/// Namespace of a user's collection.
pub fn collection_name(user_id: UserId) -> String {
    format!("user_{user_id}_notes")
}

/// Result counts to try, in order, for a top-`k` query over `size` documents:
/// the clamped count first, then each smaller count down to 1.
pub fn step_down_attempts(k: usize, size: usize) -> impl Iterator<Item = usize> {
    (1..=k.min(size)).rev()
}

pub struct VectorStore {
    dir: PathBuf,
    embedder: Arc<dyn EmbeddingFunction>,
    collections: RwLock<HashMap<String, Collection>>,
}

impl VectorStore {
    /// Open the index rooted at `dir` (e.g. `<data_dir>/vectorstore`).
    pub async fn open(
        dir: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingFunction>,
    ) -> std::result::Result<Self, VectorError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| VectorError::Persistence(format!("create vectorstore dir: {e}")))?;
        debug!(dir = %dir.display(), "Vector store opened");
        Ok(Self {
            dir,
            embedder,
            collections: RwLock::new(HashMap::new()),
        })
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.jsonl"))
    }

    /// Read access to the cached collections, loading `name` first if needed.
    async fn read_loaded(
        &self,
        name: &str,
    ) -> std::result::Result<RwLockReadGuard<'_, HashMap<String, Collection>>, VectorError> {
        let guard = self.collections.read().await;
        if guard.contains_key(name) {
            return Ok(guard);
        }
        drop(guard);

        let mut guard = self.collections.write().await;
        if !guard.contains_key(name) {
            let col = Collection::open(name, self.collection_path(name)).await?;
            guard.insert(name.to_string(), col);
        }
        Ok(guard.downgrade())
    }

    /// Index (or re-index) one document in a user's collection.
    pub async fn upsert(
        &self,
        user_id: UserId,
        doc_id: &str,
        content: &str,
        metadata: HashMap<String, String>,
    ) -> std::result::Result<(), VectorError> {
        self.upsert_many(user_id, vec![(doc_id.to_string(), content.to_string(), metadata)])
            .await
    }

    /// Index a batch of `(id, content, metadata)` documents with one
    /// embedding call.
    pub async fn upsert_many(
        &self,
        user_id: UserId,
        docs: Vec<(String, String, HashMap<String, String>)>,
    ) -> std::result::Result<(), VectorError> {
        if docs.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = docs.iter().map(|(_, content, _)| content.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        let documents = docs
            .into_iter()
            .zip(embeddings)
            .map(|((id, content, metadata), embedding)| Document {
                id,
                content,
                metadata,
                embedding,
            })
            .collect::<Vec<_>>();
        let count = documents.len();

        let name = collection_name(user_id);
        let mut guard = self.collections.write().await;
        if !guard.contains_key(&name) {
            let col = Collection::open(&name, self.collection_path(&name)).await?;
            guard.insert(name.clone(), col);
        }
        if let Some(col) = guard.get_mut(&name) {
            col.upsert(documents).await?;
        }
        debug!(user_id, count, "Documents indexed");
        Ok(())
    }

    /// Remove a document from a user's collection. Returns whether it existed.
    pub async fn delete(&self, user_id: UserId, doc_id: &str) -> std::result::Result<bool, VectorError> {
        let name = collection_name(user_id);
        let mut guard = self.collections.write().await;
        if !guard.contains_key(&name) {
            let col = Collection::open(&name, self.collection_path(&name)).await?;
            guard.insert(name.clone(), col);
        }
        match guard.get_mut(&name) {
            Some(col) => col.remove(doc_id).await,
            None => Ok(false),
        }
    }

    /// Empty a user's collection.
    pub async fn clear(&self, user_id: UserId) -> std::result::Result<(), VectorError> {
        let name = collection_name(user_id);
        let mut guard = self.collections.write().await;
        let mut col = match guard.remove(&name) {
            Some(col) => col,
            None => Collection::open(&name, self.collection_path(&name)).await?,
        };
        let result = col.clear().await;
        guard.insert(name, col);
        result
    }

    /// Number of documents in a user's collection.
    pub async fn count(&self, user_id: UserId) -> std::result::Result<usize, VectorError> {
        let name = collection_name(user_id);
        let guard = self.read_loaded(&name).await?;
        Ok(guard.get(&name).map(Collection::count).unwrap_or(0))
    }

    /// The top-`k` documents most similar to `query`.
    ///
    /// An empty collection yields no results, including one emptied while
    /// the query was being embedded. `k` is clamped to the collection size,
    /// and if the engine still rejects the count (for instance because
    /// documents were removed concurrently) the query is retried with each
    /// smaller count down to 1; only when every attempt fails is the last
    /// error returned.
    pub async fn search(
        &self,
        user_id: UserId,
        query: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<SearchResult>, VectorError> {
        let name = collection_name(user_id);

        let size = {
            let guard = self.read_loaded(&name).await?;
            guard.get(&name).map(Collection::count).unwrap_or(0)
        };
        if size == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let texts = [query.to_string()];
        let mut embeddings = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(VectorError::Cancelled),
            result = self.embedder.embed(&texts) => result?,
        };
        let embedding = embeddings
            .pop()
            .ok_or_else(|| VectorError::EmbeddingFailed("no embedding returned for query".into()))?;

        // The lock was released while embedding; the collection may have
        // shrunk or been cleared since `size` was read.
        let guard = self.read_loaded(&name).await?;
        let Some(col) = guard.get(&name).filter(|c| c.count() > 0) else {
            return Ok(Vec::new());
        };

        let mut last_err = None;
        for attempt in step_down_attempts(k, size) {
            match col.query(&embedding, attempt) {
                Ok(results) => return Ok(results),
                Err(e) => {
                    debug!(user_id, attempt, error = %e, "Vector query rejected, stepping down");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => {
                warn!(user_id, k, error = %e, "Vector query failed at every result count");
                Err(e)
            }
            None => Ok(Vec::new()),
        }
    }
}
