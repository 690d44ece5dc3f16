use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use super::{
    cosine_similarity, EmbeddedChunk, IndexStats, StoreMatch, StoreQuery, UpsertAck, VectorStore,
};
use crate::error::{RagError, Result};
use crate::search::hybrid::{fused_score, LexicalQuery};

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexData {
    dimensions: Option<usize>,
    items: BTreeMap<String, EmbeddedChunk>,
}

/// File-backed vector store. Everything lives in memory behind a lock that
/// is never held across an await point; `persist` writes atomically.
pub struct JsonStore {
    path: PathBuf,
    data: RwLock<IndexData>,
}

impl JsonStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: RwLock::new(IndexData::default()),
        }
    }

    fn atomic_write(&self, data: &IndexData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("tmp");
        let json = serde_json::to_vec(data)?;
        fs::write(&temp_path, json)?;
        fs::rename(temp_path, &self.path)?;

        Ok(())
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> RagError {
    RagError::Permanent(format!("store lock poisoned: {}", e))
}

#[async_trait]
impl VectorStore for JsonStore {
    async fn upsert(&self, items: &[EmbeddedChunk]) -> Result<UpsertAck> {
        let mut data = self.data.write().map_err(poisoned)?;

        let expected = data
            .dimensions
            .or_else(|| items.first().map(|item| item.vector.len()));
        if let Some(dims) = expected {
            if let Some(bad) = items.iter().find(|item| item.vector.len() != dims) {
                return Err(RagError::Permanent(format!(
                    "chunk {} has {} dimensions, index expects {}",
                    bad.id(),
                    bad.vector.len(),
                    dims
                )));
            }
        }
        data.dimensions = expected;

        let mut written = Vec::with_capacity(items.len());
        for item in items {
            written.push(item.chunk.id.clone());
            data.items.insert(item.chunk.id.clone(), item.clone());
        }

        Ok(UpsertAck { written })
    }

    async fn query(&self, query: &StoreQuery) -> Result<Vec<StoreMatch>> {
        let data = self.data.read().map_err(poisoned)?;

        if let Some(dims) = data.dimensions {
            if query.vector.len() != dims {
                return Err(RagError::Permanent(format!(
                    "query vector has {} dimensions, index expects {}",
                    query.vector.len(),
                    dims
                )));
            }
        }

        let lexical = LexicalQuery::new(&query.text);
        let mut scored: Vec<(f32, StoreMatch)> = data
            .items
            .values()
            .filter(|item| {
                query
                    .filter
                    .as_ref()
                    .map_or(true, |filter| filter.matches(&item.metadata))
            })
            .map(|item| {
                let vector_score = cosine_similarity(&query.vector, &item.vector);
                let lexical_score = lexical.score(&item.chunk.text);
                (
                    fused_score(vector_score, lexical_score, query.fusion_weight),
                    StoreMatch {
                        vector_score,
                        lexical_score,
                        item: item.clone(),
                    },
                )
            })
            .collect();

        // Same order the retriever ranks candidates in
        scored.sort_by(|(fused_a, a), (fused_b, b)| {
            fused_b
                .total_cmp(fused_a)
                .then_with(|| b.lexical_score.total_cmp(&a.lexical_score))
                .then_with(|| b.item.metadata.timestamp.cmp(&a.item.metadata.timestamp))
                .then_with(|| a.item.chunk.id.cmp(&b.item.chunk.id))
        });
        scored.truncate(query.k);

        Ok(scored.into_iter().map(|(_, m)| m).collect())
    }

    async fn content_hashes(&self, ids: &[String]) -> Result<HashMap<String, String>> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                data.items
                    .get(id)
                    .map(|item| (id.clone(), item.chunk.hash.clone()))
            })
            .collect())
    }

    async fn prune_record(&self, record_id: &str, keep_chunks: usize) -> Result<usize> {
        let mut data = self.data.write().map_err(poisoned)?;
        let before = data.items.len();
        data.items.retain(|_, item| {
            item.chunk.record_id != record_id || item.chunk.index < keep_chunks
        });
        Ok(before - data.items.len())
    }

    async fn persist(&self) -> Result<()> {
        let data = self.data.read().map_err(poisoned)?;
        self.atomic_write(&data)
    }

    async fn load(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let content = fs::read(&self.path)?;
        let loaded: IndexData = serde_json::from_slice(&content)?;

        let mut data = self.data.write().map_err(poisoned)?;
        *data = loaded;

        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let data = self.data.read().map_err(poisoned)?;

        let index_size = if self.path.exists() {
            fs::metadata(&self.path)?.len()
        } else {
            0
        };

        let records: BTreeSet<&str> = data
            .items
            .values()
            .map(|item| item.chunk.record_id.as_str())
            .collect();

        Ok(IndexStats {
            total_records: records.len(),
            total_chunks: data.items.len(),
            dimensions: data.dimensions,
            index_size_bytes: index_size,
            last_updated: data.items.values().map(|item| item.updated_at).max(),
        })
    }

    async fn clear(&self) -> Result<()> {
        let mut data = self.data.write().map_err(poisoned)?;
        *data = IndexData::default();

        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }

        tracing::info!(path = %self.path.display(), "index cleared");
        Ok(())
    }
}
