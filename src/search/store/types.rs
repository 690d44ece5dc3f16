use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A contiguous text span of one review. Offsets are character positions
/// into the record's page content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub record_id: String,
    pub index: usize,
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub hash: String,
}

/// Fields carried alongside every stored chunk for filtering and ranking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub store: String,
    pub price: Option<f64>,
    pub rating: f32,
    pub avg_rating: f32,
    pub rating_count: u64,
    pub verified_purchase: bool,
    pub helpful_vote: u64,
    pub user_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
    pub updated_at: DateTime<Utc>,
}

impl EmbeddedChunk {
    pub fn id(&self) -> &str {
        &self.chunk.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub min_rating: Option<f32>,
    pub category: Option<String>,
    pub product_id: Option<String>,
    pub verified_only: bool,
}

impl MetadataFilter {
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if let Some(min) = self.min_rating {
            if metadata.rating < min {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if !metadata.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(product_id) = &self.product_id {
            if &metadata.product_id != product_id {
                return false;
            }
        }
        !self.verified_only || metadata.verified_purchase
    }
}

#[derive(Debug, Clone)]
pub struct StoreQuery {
    pub vector: Vec<f32>,
    pub text: String,
    pub filter: Option<MetadataFilter>,
    /// Weight of the vector signal in the fused score
    pub fusion_weight: f32,
    /// The store returns at most `k` matches, best fused score first
    pub k: usize,
}

/// A stored item scored on both signals.
#[derive(Debug, Clone)]
pub struct StoreMatch {
    pub item: EmbeddedChunk,
    pub vector_score: f32,
    pub lexical_score: f32,
}

/// Acknowledgement of an upsert. Writes are not atomic across a batch, so
/// only the ids listed in `written` are known to be stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertAck {
    pub written: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_records: usize,
    pub total_chunks: usize,
    pub dimensions: Option<usize>,
    pub index_size_bytes: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// A retrieved item. Produced fresh per query.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateResult {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    #[serde(skip)]
    pub vector: Vec<f32>,
    pub lexical_score: f32,
    pub vector_score: f32,
    pub fused_score: f32,
}

/// Terminal output of the query pipeline, consumed by generation.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub rank: usize,
    pub rerank_score: f32,
    #[serde(flatten)]
    pub candidate: CandidateResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ChunkMetadata {
        ChunkMetadata {
            product_id: "B001".to_string(),
            category: "Camera & Photo".to_string(),
            rating: 4.0,
            verified_purchase: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(MetadataFilter::default().matches(&metadata()));
    }

    #[test]
    fn test_filter_conditions() {
        let meta = metadata();

        let min_rating = MetadataFilter {
            min_rating: Some(4.5),
            ..Default::default()
        };
        assert!(!min_rating.matches(&meta));

        let category = MetadataFilter {
            category: Some("camera & photo".to_string()),
            ..Default::default()
        };
        assert!(category.matches(&meta));

        let verified = MetadataFilter {
            verified_only: true,
            ..Default::default()
        };
        assert!(!verified.matches(&meta));

        let product = MetadataFilter {
            product_id: Some("B002".to_string()),
            ..Default::default()
        };
        assert!(!product.matches(&meta));
    }
}
