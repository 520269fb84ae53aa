//! Guarded retrieval service
//!
//! Wraps a retrieval entry point: run retrieval, compute answerability,
//! return the ranked context or a structured IDK. Unanswerable is a
//! decision, never an error.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use retrieval_config::{ConfigRegistry, GuardrailConfig, Tunables};
use retrieval_core::{AuditSink, Candidate, Principal, Result, TracingAuditSink};
use retrieval_orchestrator::{HybridSearchResult, Retrieve, SearchMetrics, SearchRequest};

use crate::answerability::AnswerabilityScore;
use crate::idk::{build_idk, IdkResponse};
use crate::source_aware::StageInputs;

/// The guardrail's verdict for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailDecision {
    pub answerable: bool,
    pub confidence: f32,
    /// Admin bypass or disabled guardrail let the results straight through
    pub bypassed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<AnswerabilityScore>,
}

impl GuardrailDecision {
    fn passthrough() -> Self {
        Self {
            answerable: true,
            confidence: 1.0,
            bypassed: true,
            score: None,
        }
    }
}

/// Outcome of a guarded retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardedResult {
    pub answerable: bool,
    /// Present iff answerable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Candidate>>,
    /// Present iff unanswerable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idk: Option<IdkResponse>,
    pub decision: GuardrailDecision,
    pub metrics: SearchMetrics,
}

/// Guarded retrieval over any `Retrieve` implementation.
pub struct GuardrailService {
    retriever: Arc<dyn Retrieve>,
    registry: Arc<ConfigRegistry>,
    tunables: Tunables,
    audit: Arc<dyn AuditSink>,
}

impl GuardrailService {
    pub fn new(
        retriever: Arc<dyn Retrieve>,
        registry: Arc<ConfigRegistry>,
        tunables: Tunables,
    ) -> Self {
        Self {
            retriever,
            registry,
            tunables,
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Retrieve and judge answerability. `route` labels the caller in
    /// audit records.
    pub async fn retrieve_guarded(
        &self,
        collection: &str,
        request: SearchRequest,
        principal: &Principal,
        route: &str,
    ) -> Result<GuardedResult> {
        principal.validate()?;
        let tenant_id = request
            .tenant_id
            .clone()
            .unwrap_or_else(|| principal.tenant.clone());

        let config = match self.registry.guardrail_config(&tenant_id).await {
            Ok(config) => config,
            Err(err) => {
                let fallback = GuardrailConfig::for_tenant(tenant_id.clone());
                if fallback.fallback.allow_on_error {
                    tracing::warn!(error = %err, tenant = %tenant_id, "guardrail config unavailable, passing through");
                    let retrieval = self
                        .retriever
                        .retrieve(collection, request, principal)
                        .await?;
                    return Ok(passthrough_result(retrieval));
                }
                return Err(err);
            }
        };

        let retrieval = self
            .retriever
            .retrieve(collection, request, principal)
            .await?;

        // Admin bypass and disabled guardrail both pass the ranked context
        // straight through with full confidence.
        if !config.enabled || (config.bypass_enabled && principal.is_admin()) {
            self.audit.info(
                "guardrail bypassed",
                &[
                    ("tenant", tenant_id),
                    ("route", route.to_string()),
                    ("enabled", config.enabled.to_string()),
                ],
            );
            return Ok(passthrough_result(retrieval));
        }

        let score = AnswerabilityScore::compute(
            &final_scores(&retrieval),
            &stage_inputs(&retrieval),
            &config,
            self.tunables.degradation_tau,
            self.tunables.max_confidence_threshold,
        );

        let decision = GuardrailDecision {
            answerable: score.is_answerable,
            confidence: score.confidence,
            bypassed: false,
            score: Some(score.clone()),
        };

        self.audit.info(
            "guardrail decision",
            &[
                ("tenant", tenant_id),
                ("route", route.to_string()),
                ("answerable", decision.answerable.to_string()),
                ("confidence", format!("{:.3}", decision.confidence)),
            ],
        );

        if decision.answerable {
            Ok(GuardedResult {
                answerable: true,
                results: Some(retrieval.final_results),
                idk: None,
                decision,
                metrics: retrieval.metrics,
            })
        } else {
            let idk = build_idk(&retrieval.final_results, &score, &config);
            Ok(GuardedResult {
                answerable: false,
                results: None,
                idk: Some(idk),
                decision,
                metrics: retrieval.metrics,
            })
        }
    }
}

fn passthrough_result(retrieval: HybridSearchResult) -> GuardedResult {
    GuardedResult {
        answerable: true,
        results: Some(retrieval.final_results),
        idk: None,
        decision: GuardrailDecision::passthrough(),
        metrics: retrieval.metrics,
    }
}

fn final_scores(retrieval: &HybridSearchResult) -> Vec<f32> {
    retrieval
        .final_results
        .iter()
        .map(|candidate| candidate.score)
        .collect()
}

fn stage_inputs(retrieval: &HybridSearchResult) -> StageInputs {
    let side = |candidates: &[Candidate], pick: fn(&Candidate) -> f32| -> Option<Vec<f32>> {
        if candidates.is_empty() {
            None
        } else {
            Some(candidates.iter().map(pick).collect())
        }
    };

    StageInputs {
        vector: side(&retrieval.vector_results, |c| {
            c.vector_score.unwrap_or(c.score)
        }),
        keyword: side(&retrieval.keyword_results, |c| {
            c.keyword_score.unwrap_or(c.score)
        }),
        fusion: side(&retrieval.fusion_results, |c| {
            c.fusion_score.unwrap_or(c.score)
        }),
        reranker: retrieval.reranker_results.as_deref().and_then(|list| {
            side(list, |c| c.reranker_score.unwrap_or(c.score))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use retrieval_core::DocumentMetadata;

    #[test]
    fn test_stage_inputs_pick_component_scores() {
        let mut vector = Candidate::new("a", 0.7, DocumentMetadata::default());
        vector.vector_score = Some(0.9);
        let retrieval = HybridSearchResult {
            vector_results: vec![vector],
            ..Default::default()
        };
        let inputs = stage_inputs(&retrieval);
        assert_eq!(inputs.vector, Some(vec![0.9]));
        assert!(inputs.keyword.is_none());
        assert!(inputs.reranker.is_none());
    }

    #[test]
    fn test_passthrough_carries_results_and_metrics() {
        let retrieval = HybridSearchResult {
            final_results: vec![Candidate::new("a", 0.7, DocumentMetadata::default())],
            metrics: SearchMetrics {
                final_count: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let guarded = passthrough_result(retrieval);
        assert!(guarded.answerable);
        assert!(guarded.decision.bypassed);
        assert_eq!(guarded.results.unwrap().len(), 1);
        assert_eq!(guarded.metrics.final_count, 1);
    }
}
