//! Maximal marginal relevance diversity selection
//!
//! The fallback final-band strategy when no reranker is available: expand
//! to twice the requested limit, then greedily pick candidates balancing
//! relevance against similarity to what is already selected.

use std::collections::HashSet;

use retrieval_core::Candidate;

/// Relevance/diversity balance. Higher favors relevance.
const MMR_LAMBDA: f32 = 0.7;

/// Select `limit` candidates by marginal relevance from a scored list
/// (descending). The first pick is always the top-scored candidate.
pub fn mmr_select(candidates: Vec<Candidate>, limit: usize) -> Vec<Candidate> {
    if candidates.len() <= limit {
        return candidates;
    }

    let token_sets: Vec<HashSet<String>> = candidates.iter().map(content_tokens).collect();

    let mut selected: Vec<usize> = Vec::with_capacity(limit);
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < limit && !remaining.is_empty() {
        let mut best_position = 0;
        let mut best_value = f32::NEG_INFINITY;
        for (position, &index) in remaining.iter().enumerate() {
            let relevance = candidates[index].score;
            let max_similarity = selected
                .iter()
                .map(|&chosen| jaccard(&token_sets[index], &token_sets[chosen]))
                .fold(0.0f32, f32::max);
            let value = MMR_LAMBDA * relevance - (1.0 - MMR_LAMBDA) * max_similarity;
            if value > best_value {
                best_value = value;
                best_position = position;
            }
        }
        selected.push(remaining.remove(best_position));
    }

    let chosen: HashSet<usize> = selected.iter().copied().collect();
    candidates
        .into_iter()
        .enumerate()
        .filter_map(|(index, candidate)| chosen.contains(&index).then_some(candidate))
        .collect()
}

fn content_tokens(candidate: &Candidate) -> HashSet<String> {
    candidate
        .content
        .as_deref()
        .unwrap_or("")
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f32 / union as f32
}
