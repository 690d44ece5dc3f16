mod json;
mod types;

pub use json::JsonStore;
pub use types::{
    CandidateResult, Chunk, ChunkMetadata, EmbeddedChunk, IndexStats, MetadataFilter,
    RankedResult, StoreMatch, StoreQuery, UpsertAck,
};

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;

/// Vector store with upsert-by-id semantics.
///
/// Implementations classify their failures: throttling and timeouts as
/// `RagError::Transient`, schema or dimensionality mismatches and auth as
/// `RagError::Permanent`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace items by chunk id.
    async fn upsert(&self, items: &[EmbeddedChunk]) -> Result<UpsertAck>;
    /// Score items on both the vector and the lexical signal.
    async fn query(&self, query: &StoreQuery) -> Result<Vec<StoreMatch>>;
    /// Content hashes of the given ids that are already stored.
    async fn content_hashes(&self, ids: &[String]) -> Result<HashMap<String, String>>;
    /// Delete the chunks of `record_id` at index `keep_chunks` and above.
    /// Returns how many were removed.
    async fn prune_record(&self, record_id: &str, keep_chunks: usize) -> Result<usize>;
    async fn persist(&self) -> Result<()>;
    async fn load(&self) -> Result<()>;
    async fn stats(&self) -> Result<IndexStats>;
    async fn clear(&self) -> Result<()>;
}

/// Cosine similarity, accumulated sequentially in f32 so identical inputs
/// always produce identical bits.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
