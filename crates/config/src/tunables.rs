//! Process-wide tunables
//!
//! Injected at construction time; the environment is read once at process
//! init by the host, never in the hot path.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-stage and overall time budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutTunables {
    pub vector_ms: u64,
    pub lexical_ms: u64,
    pub reranker_ms: u64,
    pub embedding_ms: u64,
    pub overall_ms: u64,
}

impl Default for TimeoutTunables {
    fn default() -> Self {
        Self {
            vector_ms: 5_000,
            lexical_ms: 3_000,
            reranker_ms: 10_000,
            embedding_ms: 5_000,
            overall_ms: 45_000,
        }
    }
}

impl TimeoutTunables {
    pub fn vector(&self) -> Duration {
        Duration::from_millis(self.vector_ms)
    }
    pub fn lexical(&self) -> Duration {
        Duration::from_millis(self.lexical_ms)
    }
    pub fn reranker(&self) -> Duration {
        Duration::from_millis(self.reranker_ms)
    }
    pub fn embedding(&self) -> Duration {
        Duration::from_millis(self.embedding_ms)
    }
    pub fn overall(&self) -> Duration {
        Duration::from_millis(self.overall_ms)
    }
}

/// Keyword-points rescorer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordPointsTunables {
    pub field_weight_body: f32,
    pub field_weight_title: f32,
    pub field_weight_header: f32,
    pub field_weight_section: f32,
    pub field_weight_doc_id: f32,
    /// Exponent applied to IDF when weighting query terms
    pub idf_gamma: f32,
    /// Decay applied per term rank in the extraction
    pub rank_decay: f32,
    /// Saturation constant for repeated body hits
    pub body_sat_c: f32,
    /// Word-index bound for the early-position nudge
    pub early_pos_tokens: usize,
    pub early_pos_nudge: f32,
    /// Sliding-window size (tokens) for proximity
    pub prox_win: usize,
    pub proximity_beta: f32,
    pub coverage_alpha: f32,
    pub exclusivity_gamma: f32,
    /// Blend factor for the normalized keyword score
    pub lambda_kw: f32,
    /// Clamp for the median-normalized keyword score
    pub clamp_kw_norm: f32,
    /// Number of top terms considered for coverage
    pub top_k_coverage: usize,
    /// Strict soft-AND suppression
    pub soft_and_strict: bool,
    /// Batch percentile a candidate must reach to escape soft-AND
    pub soft_and_override_pctl: f32,
    /// Bonus multiplier for multi-token phrase terms
    pub phrase_bonus: f32,
}

impl Default for KeywordPointsTunables {
    fn default() -> Self {
        Self {
            field_weight_body: 3.0,
            field_weight_title: 2.2,
            field_weight_header: 1.8,
            field_weight_section: 1.3,
            field_weight_doc_id: 1.1,
            idf_gamma: 0.35,
            rank_decay: 0.85,
            body_sat_c: 0.6,
            early_pos_tokens: 250,
            early_pos_nudge: 1.08,
            prox_win: 30,
            proximity_beta: 0.25,
            coverage_alpha: 0.25,
            exclusivity_gamma: 0.25,
            lambda_kw: 0.25,
            clamp_kw_norm: 2.0,
            top_k_coverage: 2,
            soft_and_strict: false,
            soft_and_override_pctl: 95.0,
            phrase_bonus: 1.25,
        }
    }
}

/// Domainless ranking multipliers, applied when a tenant enables
/// domain-agnostic boosting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainlessTunables {
    pub coverage_alpha: f32,
    pub proximity_beta: f32,
    pub field_boost_delta: f32,
    pub exclusivity_gamma: f32,
}

impl Default for DomainlessTunables {
    fn default() -> Self {
        Self {
            coverage_alpha: 0.50,
            proximity_beta: 0.30,
            field_boost_delta: 0.20,
            exclusivity_gamma: 0.10,
        }
    }
}

/// Merge strategy for reconstructed sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionMergeStrategy {
    /// Remove covered originals, prepend reconstructions
    Replace,
    /// Append reconstructions after the originals
    Append,
    /// Merge and resort by score, deduplicating covered originals
    Interleave,
}

impl Default for SectionMergeStrategy {
    fn default() -> Self {
        SectionMergeStrategy::Append
    }
}

/// Score policy for a reconstructed section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionScorePolicy {
    Average,
    Max,
    Min,
    /// `1/rank` weighted average over the originally retrieved chunks
    WeightedAverage,
}

impl Default for SectionScorePolicy {
    fn default() -> Self {
        SectionScorePolicy::Average
    }
}

/// Section completion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionCompletionTunables {
    pub enabled: bool,
    pub max_sections_to_complete: usize,
    /// Hard budget for the whole completion pass
    pub completion_timeout_ms: u64,
    pub merge_strategy: SectionMergeStrategy,
    pub score_policy: SectionScorePolicy,
    /// Detections below this confidence are not completed
    pub min_trigger_confidence: f32,
    pub max_chunks_per_section: usize,
    /// Budget per sibling-fetch scroll
    pub query_timeout_ms: u64,
}

impl Default for SectionCompletionTunables {
    fn default() -> Self {
        Self {
            enabled: true,
            max_sections_to_complete: 3,
            completion_timeout_ms: 3_000,
            merge_strategy: SectionMergeStrategy::default(),
            score_policy: SectionScorePolicy::default(),
            min_trigger_confidence: 0.7,
            max_chunks_per_section: 10,
            query_timeout_ms: 2_000,
        }
    }
}

/// Everything the pipeline reads at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub timeouts: TimeoutTunables,
    pub keyword_points: KeywordPointsTunables,
    pub domainless: DomainlessTunables,
    pub sections: SectionCompletionTunables,
    /// Intermediate retrieval depth when adaptive features are on
    pub retrieval_k_base: usize,
    /// Candidates entering the reranker band
    pub reranker_top_n_in: usize,
    /// Candidates the reranker returns
    pub reranker_top_n_out: usize,
    /// Lexical scroll over-fetch
    pub lexical_over_fetch: usize,
    /// Larger over-fetch when domainless ranking is on
    pub lexical_over_fetch_domainless: usize,
    /// Relative confidence drop that raises a degradation alert
    pub degradation_tau: f32,
    /// Stage confidence at which max-confidence selection kicks in
    pub max_confidence_threshold: f32,
    /// Process default for high-value tokens; tenants may override
    pub high_value_tokens: Vec<String>,
    /// Multiplier applied when candidate language matches the principal's
    pub language_match_boost: f32,
    /// TTL for cached corpus statistics and search-side caches
    pub stats_cache_ttl_secs: u64,
    /// TTL for cached guardrail configs
    pub guardrail_cache_ttl_secs: u64,
    /// TTL for cached search configs
    pub search_cache_ttl_secs: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self::reference()
    }
}

impl Tunables {
    /// Reference defaults; see the external-interfaces section of the
    /// project documentation for the full table.
    pub fn reference() -> Self {
        Self {
            timeouts: TimeoutTunables::default(),
            keyword_points: KeywordPointsTunables::default(),
            domainless: DomainlessTunables::default(),
            sections: SectionCompletionTunables::default(),
            retrieval_k_base: 12,
            reranker_top_n_in: 20,
            reranker_top_n_out: 8,
            lexical_over_fetch: 60,
            lexical_over_fetch_domainless: 120,
            degradation_tau: 0.3,
            max_confidence_threshold: 0.8,
            high_value_tokens: ["artistry", "skill", "table", "abilities"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            language_match_boost: 1.1,
            stats_cache_ttl_secs: 300,
            guardrail_cache_ttl_secs: 600,
            search_cache_ttl_secs: 300,
        }
    }
}
