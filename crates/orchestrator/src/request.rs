//! Request and structured-result types for the hybrid pipeline

use serde::{Deserialize, Serialize};

use retrieval_core::{Candidate, Filter, Result, RetrievalError};
use retrieval_fusion::{FusedCandidate, FusionStrategy};
use retrieval_sections::ReconstructedSection;

/// One retrieval request. Optional fields overlay the tenant config for
/// this call only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrf_k: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_keyword_search: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    /// Tenant override; defaults to the principal's tenant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            limit,
            vector_weight: None,
            keyword_weight: None,
            rrf_k: None,
            enable_keyword_search: None,
            filter: None,
            tenant_id: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(RetrievalError::InternalInvariant(
                "request limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-request pipeline metrics. Stage fallbacks are recorded here and
/// never escalate to errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchMetrics {
    pub embedding_ms: u64,
    pub vector_ms: u64,
    pub lexical_ms: u64,
    pub rerank_ms: u64,
    pub section_completion_ms: u64,
    pub total_ms: u64,

    pub vector_count: usize,
    pub keyword_count: usize,
    pub fused_count: usize,
    pub final_count: usize,
    pub sections_completed: usize,

    pub vector_timed_out: bool,
    pub lexical_timed_out: bool,
    pub reranker_timed_out: bool,
    pub overall_timed_out: bool,
    pub section_completion_timed_out: bool,
    pub vector_fallback_used: bool,
    pub lexical_fallback_used: bool,

    /// Marked false when the reranker band fell back
    pub reranking_enabled: bool,
    pub mmr_applied: bool,
    pub keyword_points_applied: bool,
    pub domainless_applied: bool,

    pub strategy_applied: String,
    pub strategy_override_applied: bool,
    pub temporal_query: bool,
    pub dedup_cap: usize,
}

/// Fusion trace carried when tracing is requested or an override fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionTrace {
    pub strategy_requested: FusionStrategy,
    pub strategy_applied: FusionStrategy,
    pub override_applied: bool,
    pub candidates: Vec<FusedCandidate>,
}

/// Structured output of one retrieval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HybridSearchResult {
    /// The ranked, RBAC-filtered, contiguously ranked final list
    pub final_results: Vec<Candidate>,
    pub vector_results: Vec<Candidate>,
    pub keyword_results: Vec<Candidate>,
    /// Candidates as they left fusion (pre final-band)
    pub fusion_results: Vec<Candidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker_results: Option<Vec<Candidate>>,
    /// Sections reconstructed by the section-aware wrapper
    pub reconstructed_sections: Vec<ReconstructedSection>,
    pub metrics: SearchMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fusion_trace: Option<FusionTrace>,
}

impl HybridSearchResult {
    /// Empty result carrying metrics; used when the vector stage fails
    /// past its fallback.
    pub fn empty_with_metrics(metrics: SearchMetrics) -> Self {
        Self {
            metrics,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation() {
        assert!(SearchRequest::new("q", 1).validate().is_ok());
        assert!(SearchRequest::new("q", 0).validate().is_err());
    }

    #[test]
    fn test_empty_result_keeps_metrics() {
        let metrics = SearchMetrics {
            vector_timed_out: true,
            ..Default::default()
        };
        let result = HybridSearchResult::empty_with_metrics(metrics);
        assert!(result.final_results.is_empty());
        assert!(result.metrics.vector_timed_out);
    }
}
