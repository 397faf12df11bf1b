//! A single named collection of embedded documents, persisted as JSONL.
//!
//! Each line of the backing file is one JSON-encoded [`Document`]. The whole
//! collection lives in memory; every mutation rewrites the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use mnemo_core::error::VectorError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::similarity::cosine_similarity;

/// An embedded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Caller-supplied id; re-upserting the same id replaces in place
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub embedding: Vec<f32>,
}

/// A query hit. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub metadata: HashMap<String, String>,
    /// Cosine similarity to the query
    pub score: f32,
}

#[derive(Debug)]
pub struct Collection {
    name: String,
    path: PathBuf,
    documents: Vec<Document>,
}

impl Collection {
    /// Open the collection stored at `path`, or start empty if the file
    /// does not exist yet. Corrupted lines are skipped.
    pub async fn open(name: impl Into<String>, path: PathBuf) -> std::result::Result<Self, VectorError> {
        let name = name.into();
        let documents = match tokio::fs::read_to_string(&path).await {
            Ok(content) => parse_lines(&name, &content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(VectorError::Persistence(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        debug!(collection = %name, count = documents.len(), "Vector collection loaded");
        Ok(Self {
            name,
            path,
            documents,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn count(&self) -> usize {
        self.documents.len()
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == id)
    }

    /// Embedding width of the stored documents, if any.
    fn dimensions(&self) -> Option<usize> {
        self.documents.first().map(|d| d.embedding.len())
    }

    fn check_dimensions(&self, actual: usize) -> std::result::Result<(), VectorError> {
        match self.dimensions() {
            Some(expected) if expected != actual => {
                Err(VectorError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    /// Insert or replace documents by id, then persist.
    pub async fn upsert(&mut self, docs: Vec<Document>) -> std::result::Result<(), VectorError> {
        for doc in docs {
            self.check_dimensions(doc.embedding.len())?;
            match self.documents.iter_mut().find(|d| d.id == doc.id) {
                Some(existing) => *existing = doc,
                None => self.documents.push(doc),
            }
        }
        self.flush().await
    }

    /// Remove a document. Returns whether it existed.
    pub async fn remove(&mut self, id: &str) -> std::result::Result<bool, VectorError> {
        let before = self.documents.len();
        self.documents.retain(|d| d.id != id);
        let removed = self.documents.len() < before;
        if removed {
            self.flush().await?;
        }
        Ok(removed)
    }

    /// Drop every document, then persist the empty collection.
    pub async fn clear(&mut self) -> std::result::Result<(), VectorError> {
        self.documents.clear();
        self.flush().await
    }

    /// The `n` documents most similar to `embedding`, best first.
    ///
    /// `n` must be between 1 and the document count.
    pub fn query(&self, embedding: &[f32], n: usize) -> std::result::Result<Vec<SearchResult>, VectorError> {
        if n == 0 || n > self.documents.len() {
            return Err(VectorError::InvalidResultCount {
                requested: n,
                available: self.documents.len(),
            });
        }
        self.check_dimensions(embedding.len())?;

        let mut scored: Vec<(f32, &Document)> = self
            .documents
            .iter()
            .map(|d| (cosine_similarity(&d.embedding, embedding), d))
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        scored.truncate(n);

        Ok(scored
            .into_iter()
            .map(|(score, d)| SearchResult {
                id: d.id.clone(),
                content: d.content.clone(),
                metadata: d.metadata.clone(),
                score,
            })
            .collect())
    }

    /// Write every document to disk as JSONL, replacing the file atomically.
    async fn flush(&self) -> std::result::Result<(), VectorError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                VectorError::Persistence(format!("Failed to create vectorstore directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for doc in &self.documents {
            let line = serde_json::to_string(doc)
                .map_err(|e| VectorError::Persistence(format!("Failed to serialize document: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        let tmp = tmp_path(&self.path);
        tokio::fs::write(&tmp, &content)
            .await
            .map_err(|e| VectorError::Persistence(format!("Failed to write collection file: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| VectorError::Persistence(format!("Failed to replace collection file: {e}")))?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn parse_lines(name: &str, content: &str) -> Vec<Document> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<Document>(line) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(collection = %name, error = %e, "Skipping corrupted vector document");
                None
            }
        })
        .collect()
}
