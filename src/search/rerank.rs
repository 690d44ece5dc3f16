use super::hybrid::LexicalQuery;
use super::store::{CandidateResult, RankedResult};
use crate::config::RetrievalConfig;
use crate::error::{RagError, Result};

/// Reorders an already-diversified candidate set. Implementations must
/// return exactly the candidates they were given, ranked from 1.
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    fn rerank(&self, candidates: Vec<CandidateResult>, query: &str) -> Vec<RankedResult>;
}

/// Create a reranker from `retrieval.reranker`.
pub fn create_reranker(config: &RetrievalConfig) -> Result<Box<dyn Reranker>> {
    match config.reranker.as_str() {
        "heuristic" => Ok(Box::new(HeuristicReranker::default())),
        "none" => Ok(Box::new(PassthroughReranker)),
        other => Err(RagError::Config(format!(
            "Unknown reranker: {}. Supported: heuristic, none",
            other
        ))),
    }
}

/// Keeps the incoming order.
pub struct PassthroughReranker;

impl Reranker for PassthroughReranker {
    fn name(&self) -> &str {
        "none"
    }

    fn rerank(&self, candidates: Vec<CandidateResult>, _query: &str) -> Vec<RankedResult> {
        let count = candidates.len();
        candidates
            .into_iter()
            .enumerate()
            .map(|(i, candidate)| RankedResult {
                rank: i + 1,
                rerank_score: (count - i) as f32 / count as f32,
                candidate,
            })
            .collect()
    }
}

/// Rating-weighted relevance: how much of the query a chunk covers, nudged
/// by the review's rating, helpfulness and purchase verification.
#[derive(Debug, Clone)]
pub struct HeuristicReranker {
    pub coverage_weight: f32,
    pub rating_weight: f32,
    pub helpful_weight: f32,
    pub verified_weight: f32,
}

impl Default for HeuristicReranker {
    fn default() -> Self {
        Self {
            coverage_weight: 0.6,
            rating_weight: 0.25,
            helpful_weight: 0.1,
            verified_weight: 0.05,
        }
    }
}

/// Votes at which helpfulness reaches half its weight.
const HELPFUL_HALF_POINT: f32 = 10.0;

impl HeuristicReranker {
    pub fn score(&self, lexical: &LexicalQuery, candidate: &CandidateResult) -> f32 {
        let meta = &candidate.metadata;
        let coverage = lexical.coverage(&candidate.text);
        let rating = (meta.rating / 5.0).clamp(0.0, 1.0);
        let votes = meta.helpful_vote as f32;
        let helpful = votes / (votes + HELPFUL_HALF_POINT);
        let verified = if meta.verified_purchase { 1.0 } else { 0.0 };

        self.coverage_weight * coverage
            + self.rating_weight * rating
            + self.helpful_weight * helpful
            + self.verified_weight * verified
    }
}

impl Reranker for HeuristicReranker {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn rerank(&self, candidates: Vec<CandidateResult>, query: &str) -> Vec<RankedResult> {
        let lexical = LexicalQuery::new(query);
        let mut scored: Vec<(f32, CandidateResult)> = candidates
            .into_iter()
            .map(|c| (self.score(&lexical, &c), c))
            .collect();

        // Stable: equal scores keep the diversity order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (rerank_score, candidate))| RankedResult {
                rank: i + 1,
                rerank_score,
                candidate,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::store::ChunkMetadata;

    fn candidate(id: &str, text: &str, rating: f32, helpful: u64, verified: bool) -> CandidateResult {
        CandidateResult {
            chunk_id: id.to_string(),
            text: text.to_string(),
            metadata: ChunkMetadata {
                rating,
                helpful_vote: helpful,
                verified_purchase: verified,
                ..Default::default()
            },
            vector: vec![],
            lexical_score: 0.0,
            vector_score: 0.0,
            fused_score: 0.0,
        }
    }

    fn sorted_ids(results: &[RankedResult]) -> Vec<String> {
        let mut ids: Vec<String> = results.iter().map(|r| r.candidate.chunk_id.clone()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_heuristic_preserves_membership() {
        let candidates = vec![
            candidate("a", "battery life is great", 5.0, 3, true),
            candidate("b", "screen is dim", 2.0, 0, false),
            candidate("c", "battery died fast", 1.0, 40, true),
        ];
        let mut input_ids: Vec<String> = candidates.iter().map(|c| c.chunk_id.clone()).collect();
        input_ids.sort();

        let ranked = HeuristicReranker::default().rerank(candidates, "battery life");
        assert_eq!(sorted_ids(&ranked), input_ids);
        let ranks: Vec<usize> = ranked.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_heuristic_reorders_by_coverage_and_rating() {
        let candidates = vec![
            candidate("off_topic", "the screen is dim", 5.0, 0, false),
            candidate("on_topic", "battery life lasts two days", 4.0, 0, false),
        ];
        let ranked = HeuristicReranker::default().rerank(candidates, "battery life");

        assert_eq!(ranked[0].candidate.chunk_id, "on_topic");
        assert!(ranked[0].rerank_score > ranked[1].rerank_score);
    }

    #[test]
    fn test_heuristic_ties_keep_input_order() {
        let candidates = vec![
            candidate("first", "same text", 3.0, 0, false),
            candidate("second", "same text", 3.0, 0, false),
        ];
        let ranked = HeuristicReranker::default().rerank(candidates, "unrelated");
        assert_eq!(ranked[0].candidate.chunk_id, "first");
        assert_eq!(ranked[1].candidate.chunk_id, "second");
    }

    #[test]
    fn test_passthrough_keeps_order() {
        let candidates = vec![
            candidate("x", "one", 1.0, 0, false),
            candidate("y", "two", 5.0, 9, true),
        ];
        let ranked = PassthroughReranker.rerank(candidates, "two");
        assert_eq!(ranked[0].candidate.chunk_id, "x");
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(HeuristicReranker::default().rerank(Vec::new(), "q").is_empty());
        assert!(PassthroughReranker.rerank(Vec::new(), "q").is_empty());
    }

    #[test]
    fn test_create_reranker() {
        let mut config = RetrievalConfig::default();
        assert_eq!(create_reranker(&config).unwrap().name(), "heuristic");
        config.reranker = "none".to_string();
        assert_eq!(create_reranker(&config).unwrap().name(), "none");
        config.reranker = "cross-encoder".to_string();
        assert!(matches!(create_reranker(&config), Err(RagError::Config(_))));
    }
}
