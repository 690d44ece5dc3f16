//! Maximal Marginal Relevance
//!
//! Greedy selection balancing relevance against redundancy:
//! MMR = λ × relevance(doc) - (1-λ) × max(similarity(doc, selected_docs))
//!
//! λ = 1.0: pure relevance
//! λ = 0.5: balanced
//! λ = 0.0: pure novelty
//!
//! Relevance is the candidate's fused hybrid score; redundancy is cosine
//! similarity between candidate embeddings. Candidates must arrive in
//! fused-rank order: on equal MMR score the earlier candidate wins.

use super::store::{cosine_similarity, CandidateResult};

/// Select up to `top_k` candidates by fused-score relevance.
pub fn select(candidates: Vec<CandidateResult>, top_k: usize, lambda: f32) -> Vec<CandidateResult> {
    if candidates.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let lambda = lambda.clamp(0.0, 1.0);
    let k = top_k.min(candidates.len());

    let mut remaining: Vec<(f32, CandidateResult)> = candidates
        .into_iter()
        .map(|c| (c.fused_score, c))
        .collect();
    // Max similarity of each remaining candidate to anything selected so far
    let mut redundancy = vec![f32::NEG_INFINITY; remaining.len()];
    let mut selected: Vec<CandidateResult> = Vec::with_capacity(k);

    while selected.len() < k {
        let mut best_idx = 0;
        let mut best_mmr = f32::NEG_INFINITY;

        for (idx, (rel, _)) in remaining.iter().enumerate() {
            let penalty = if selected.is_empty() { 0.0 } else { redundancy[idx] };
            let mmr = lambda * rel - (1.0 - lambda) * penalty;
            // Strict: ties keep the earlier (better fused rank) candidate
            if mmr > best_mmr {
                best_mmr = mmr;
                best_idx = idx;
            }
        }

        let (_, best) = remaining.remove(best_idx);
        redundancy.remove(best_idx);
        for (idx, (_, candidate)) in remaining.iter().enumerate() {
            let sim = cosine_similarity(&candidate.vector, &best.vector);
            redundancy[idx] = redundancy[idx].max(sim);
        }
        selected.push(best);
    }

    selected
}
