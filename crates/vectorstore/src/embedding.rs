//! Embedding capability shared by every collection.
//!
//! The index never talks to an LLM backend directly; it is handed one
//! [`EmbeddingFunction`] at construction and uses it for documents and
//! queries alike.

use std::sync::Arc;

use async_trait::async_trait;
use mnemo_core::error::VectorError;
use mnemo_core::provider::{EmbeddingRequest, Provider};
use sha2::{Digest, Sha256};

use crate::similarity::normalize;

/// Turns texts into embedding vectors, one per input, same order.
#[async_trait]
pub trait EmbeddingFunction: Send + Sync {
    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, VectorError>;
}

/// Embeds through a [`Provider`]'s embeddings endpoint.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl EmbeddingFunction for ProviderEmbedder {
    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: texts.to_vec(),
            })
            .await
            .map_err(|e| VectorError::EmbeddingFailed(e.to_string()))?;

        if response.embeddings.len() != texts.len() {
            return Err(VectorError::EmbeddingFailed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }
}

/// Deterministic bag-of-words embedder using feature hashing.
///
/// Needs no network, so it backs offline runs and tests. Texts sharing
/// words land close together; it knows nothing about meaning. Words are
/// bucketed by SHA-256 so vectors persisted by one build stay comparable
/// with queries embedded by another.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric() && c != '#')
            .filter(|w| !w.is_empty())
        {
            let h = word_hash(&word.to_lowercase());
            let idx = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        normalize(&mut v);
        v
    }
}

/// First eight bytes of the word's SHA-256 digest, big-endian.
fn word_hash(word: &str) -> u64 {
    let digest = Sha256::digest(word.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingFunction for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
