use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use super::store::{CandidateResult, MetadataFilter, StoreMatch, StoreQuery, VectorStore};
use crate::error::Result;

const PHRASE_BONUS: f32 = 0.5;

/// Keyword side of hybrid search. Scores are normalized into [0, 1]:
/// the fraction of query terms present, plus a bonus when the whole
/// query appears as a phrase.
#[derive(Debug, Clone)]
pub struct LexicalQuery {
    phrase: String,
    terms: Vec<String>,
}

impl LexicalQuery {
    pub fn new(query: &str) -> Self {
        let tokens = tokenize(query);
        let mut seen = HashSet::new();
        let terms = tokens
            .iter()
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect();
        Self {
            phrase: tokens.join(" "),
            terms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Fraction of distinct query terms found in `content`.
    pub fn coverage(&self, content: &str) -> f32 {
        if self.terms.is_empty() {
            return 0.0;
        }
        let words: HashSet<String> = tokenize(content).into_iter().collect();
        let matched = self.terms.iter().filter(|t| words.contains(*t)).count();
        matched as f32 / self.terms.len() as f32
    }

    pub fn score(&self, content: &str) -> f32 {
        let coverage = self.coverage(content);
        if coverage == 0.0 {
            return 0.0;
        }

        // Exact phrase match bonus
        let normalized = tokenize(content).join(" ");
        let bonus = if contains_phrase(&normalized, &self.phrase) {
            PHRASE_BONUS
        } else {
            0.0
        };

        (coverage + bonus) / (1.0 + PHRASE_BONUS)
    }
}

/// Lowercased alphanumeric words of at least two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
        .map(|w| w.to_lowercase())
        .collect()
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    // Whole-word containment on the space-joined token stream
    format!(" {} ", haystack).contains(&format!(" {} ", phrase))
}

/// Weighted fusion: `weight` applies to the vector score, `1 - weight` to
/// the lexical score. Negative cosine carries no signal and counts as 0.
pub fn fused_score(vector_score: f32, lexical_score: f32, weight: f32) -> f32 {
    weight * vector_score.max(0.0) + (1.0 - weight) * lexical_score
}

/// Ranking order: fused desc, lexical desc, newer first, then chunk id.
pub fn compare_candidates(a: &CandidateResult, b: &CandidateResult) -> Ordering {
    b.fused_score
        .total_cmp(&a.fused_score)
        .then_with(|| b.lexical_score.total_cmp(&a.lexical_score))
        .then_with(|| b.metadata.timestamp.cmp(&a.metadata.timestamp))
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

/// Fuse store matches into the top `limit` candidates.
pub fn fuse(matches: Vec<StoreMatch>, weight: f32, limit: usize) -> Vec<CandidateResult> {
    let mut results: Vec<CandidateResult> = matches
        .into_iter()
        .map(|m| CandidateResult {
            fused_score: fused_score(m.vector_score, m.lexical_score, weight),
            chunk_id: m.item.chunk.id,
            text: m.item.chunk.text,
            metadata: m.item.metadata,
            vector: m.item.vector,
            lexical_score: m.lexical_score,
            vector_score: m.vector_score,
        })
        .collect();

    results.sort_by(compare_candidates);
    results.truncate(limit);
    results
}

pub struct HybridRetriever {
    store: Arc<dyn VectorStore>,
    fusion_weight: f32,
}

impl HybridRetriever {
    pub fn new(store: Arc<dyn VectorStore>, fusion_weight: f32) -> Self {
        Self {
            store,
            fusion_weight: fusion_weight.clamp(0.0, 1.0),
        }
    }

    /// Top `k_candidates` by fused score.
    pub async fn search(
        &self,
        query_vector: &[f32],
        query_text: &str,
        k_candidates: usize,
        filter: Option<MetadataFilter>,
    ) -> Result<Vec<CandidateResult>> {
        if k_candidates == 0 {
            return Ok(Vec::new());
        }

        let request = StoreQuery {
            vector: query_vector.to_vec(),
            text: query_text.to_string(),
            filter,
            fusion_weight: self.fusion_weight,
            k: k_candidates,
        };
        let matches = self.store.query(&request).await?;
        debug!(
            matches = matches.len(),
            k_candidates,
            weight = self.fusion_weight,
            "fusing hybrid matches"
        );

        Ok(fuse(matches, self.fusion_weight, k_candidates))
    }
}
