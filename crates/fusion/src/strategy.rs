//! Fusion core: stateless combination of two scored ranked lists
//!
//! Strategies are a closed enum selected at configuration time. Every
//! output carries its component breakdown so the orchestrator can emit a
//! fusion trace.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use retrieval_config::FusionStrategyName;
use retrieval_core::FusionInput;

use crate::normalize::{normalize, Normalization};

/// Vector score above which a weighted-average request is upgraded to
/// max-confidence, so a high-confidence vector hit is not diluted by a
/// noisy lexical distribution.
pub const MAX_CONFIDENCE_UPGRADE_AT: f32 = 0.75;

/// Closed fusion strategy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    WeightedAverage,
    ScoreWeightedRrf,
    MaxConfidence,
    BordaRank,
}

impl From<FusionStrategyName> for FusionStrategy {
    fn from(name: FusionStrategyName) -> Self {
        match name {
            FusionStrategyName::WeightedAverage => Self::WeightedAverage,
            FusionStrategyName::ScoreWeightedRrf => Self::ScoreWeightedRrf,
            FusionStrategyName::MaxConfidence => Self::MaxConfidence,
            FusionStrategyName::BordaRank => Self::BordaRank,
        }
    }
}

impl FusionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeightedAverage => "weighted_average",
            Self::ScoreWeightedRrf => "score_weighted_rrf",
            Self::MaxConfidence => "max_confidence",
            Self::BordaRank => "borda_rank",
        }
    }
}

/// Side weights. They need not sum to 1; the core does not renormalize.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub vector: f32,
    pub keyword: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vector: 0.7,
            keyword: 0.3,
        }
    }
}

/// A fused candidate with its component breakdown for tracing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedCandidate {
    pub id: String,
    pub fused_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    /// Raw score on the vector side, if present there
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_rank: Option<usize>,
    /// Normalized vector score fed into the formula
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_normalized: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_normalized: Option<f32>,
}

impl FusedCandidate {
    /// Highest raw component score, used for tie-breaking.
    fn component_max(&self) -> f32 {
        [self.vector_score, self.keyword_score]
            .into_iter()
            .flatten()
            .fold(f32::NEG_INFINITY, f32::max)
    }
}

/// Result of one fusion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionOutcome {
    /// Strategy that actually ran
    pub strategy_applied: FusionStrategy,
    /// Whether the high-confidence-vector upgrade replaced the requested
    /// strategy
    pub override_applied: bool,
    pub candidates: Vec<FusedCandidate>,
}

struct SideEntry {
    score: f32,
    normalized: f32,
    rank: usize,
}

/// Fuse two ranked lists. `vector` and `keyword` each satisfy the
/// `rank == 1 + index` invariant and carry unique ids.
pub fn fuse(
    vector: &[FusionInput],
    keyword: &[FusionInput],
    strategy: FusionStrategy,
    weights: FusionWeights,
    rrf_k: f32,
    normalization: Normalization,
) -> FusionOutcome {
    let top_vector_score = vector.first().map(|input| input.score).unwrap_or(0.0);
    let (effective, override_applied) = if strategy == FusionStrategy::WeightedAverage
        && top_vector_score >= MAX_CONFIDENCE_UPGRADE_AT
    {
        (FusionStrategy::MaxConfidence, true)
    } else {
        (strategy, false)
    };

    if override_applied {
        tracing::debug!(
            top_vector_score,
            "upgrading weighted_average to max_confidence"
        );
    }

    let vector_norm = normalize(
        &vector.iter().map(|input| input.score).collect::<Vec<_>>(),
        normalization,
    );
    let keyword_norm = normalize(
        &keyword.iter().map(|input| input.score).collect::<Vec<_>>(),
        normalization,
    );

    // Index both sides by id, remembering first-seen order for stability.
    let mut order: Vec<String> = Vec::new();
    let mut vector_side: HashMap<String, SideEntry> = HashMap::new();
    let mut keyword_side: HashMap<String, SideEntry> = HashMap::new();
    let mut doc_ids: HashMap<String, String> = HashMap::new();

    for (input, normalized) in vector.iter().zip(vector_norm) {
        order.push(input.id.clone());
        vector_side.insert(
            input.id.clone(),
            SideEntry {
                score: input.score,
                normalized,
                rank: input.rank,
            },
        );
        if let Some(doc_id) = &input.doc_id {
            doc_ids.insert(input.id.clone(), doc_id.clone());
        }
    }
    for (input, normalized) in keyword.iter().zip(keyword_norm) {
        if !vector_side.contains_key(&input.id) {
            order.push(input.id.clone());
        }
        keyword_side.insert(
            input.id.clone(),
            SideEntry {
                score: input.score,
                normalized,
                rank: input.rank,
            },
        );
        if let Some(doc_id) = &input.doc_id {
            doc_ids.entry(input.id.clone()).or_insert(doc_id.clone());
        }
    }

    let mut candidates: Vec<(usize, FusedCandidate)> = order
        .iter()
        .enumerate()
        .map(|(position, id)| {
            let v = vector_side.get(id);
            let k = keyword_side.get(id);
            let fused_score = score_candidate(effective, weights, rrf_k, v, k);
            let candidate = FusedCandidate {
                id: id.clone(),
                fused_score,
                doc_id: doc_ids.get(id).cloned(),
                vector_score: v.map(|entry| entry.score),
                vector_rank: v.map(|entry| entry.rank),
                vector_normalized: v.map(|entry| entry.normalized),
                keyword_score: k.map(|entry| entry.score),
                keyword_rank: k.map(|entry| entry.rank),
                keyword_normalized: k.map(|entry| entry.normalized),
            };
            (position, candidate)
        })
        .collect();

    // Descending by fused score; ties broken by higher component score,
    // then by stable input order.
    candidates.sort_by(|(pos_a, a), (pos_b, b)| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.component_max()
                    .partial_cmp(&a.component_max())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| pos_a.cmp(pos_b))
    });

    FusionOutcome {
        strategy_applied: effective,
        override_applied,
        candidates: candidates.into_iter().map(|(_, c)| c).collect(),
    }
}

fn score_candidate(
    strategy: FusionStrategy,
    weights: FusionWeights,
    rrf_k: f32,
    vector: Option<&SideEntry>,
    keyword: Option<&SideEntry>,
) -> f32 {
    match strategy {
        FusionStrategy::WeightedAverage => {
            // Absent side contributes 0; with exactly one side present the
            // sum collapses to that side's term.
            let v = vector.map(|entry| entry.normalized).unwrap_or(0.0);
            let k = keyword.map(|entry| entry.normalized).unwrap_or(0.0);
            weights.vector * v + weights.keyword * k
        }
        FusionStrategy::ScoreWeightedRrf => {
            let v = vector
                .map(|entry| weights.vector * entry.score / (entry.rank as f32 + rrf_k))
                .unwrap_or(0.0);
            let k = keyword
                .map(|entry| weights.keyword * entry.score / (entry.rank as f32 + rrf_k))
                .unwrap_or(0.0);
            v + k
        }
        FusionStrategy::MaxConfidence => {
            let v = vector.map(|entry| entry.score).unwrap_or(0.0);
            let k = keyword.map(|entry| entry.score).unwrap_or(0.0);
            // The minor side breaks ties between equal maxima without
            // overtaking a genuinely higher score on either side.
            v.max(k) + v.min(k) * 1e-3
        }
        FusionStrategy::BordaRank => {
            let v = vector
                .map(|entry| weights.vector / (entry.rank as f32 + rrf_k))
                .unwrap_or(0.0);
            let k = keyword
                .map(|entry| weights.keyword / (entry.rank as f32 + rrf_k))
                .unwrap_or(0.0);
            v + k
        }
    }
}
