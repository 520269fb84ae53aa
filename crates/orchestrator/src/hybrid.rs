//! Hybrid retrieval orchestrator
//!
//! Control flow:
//! `query → {embed ∥ lexical} → fuse → rescore → (rerank | mmr) →
//! rbac/lang filter → ranked results`. Stage fallbacks stay local and are
//! recorded in metrics; only principal validation and embedding failures
//! surface as errors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use retrieval_config::{ConfigRegistry, FusionStrategyName, SearchConfig, Tunables};
use retrieval_core::{
    rbac_filter, with_timeout, with_timeout_and_fallback, AuditSink, Candidate, Embedder, Filter,
    FusionInput, LexicalStore, Principal, RerankRequest, RerankerInput, Reranker, Result,
    ScoredPoint, SearchType, Stage, TracingAuditSink, VectorQuery, VectorSearch,
};
use retrieval_fusion::{
    detect_intent, fuse, CorpusStats, FusionStrategy, FusionWeights, IntentProfile,
    KeywordPointsRescorer, Normalization, UniformCorpusStats, TEMPORAL_PATTERN,
};
use retrieval_lexical::{LexicalSearchAdapter, LexicalSearchRequest};

use crate::dedup::dedup_by_doc;
use crate::mmr::mmr_select;
use crate::request::{FusionTrace, HybridSearchResult, SearchMetrics, SearchRequest};
use crate::Retrieve;

/// Orchestrates one hybrid retrieval per call. Holds only read-only shared
/// state; all per-request data lives on the stack of `retrieve`.
pub struct HybridOrchestrator {
    vector_store: Arc<dyn VectorSearch>,
    lexical: LexicalSearchAdapter,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    registry: Arc<ConfigRegistry>,
    rescorer: KeywordPointsRescorer,
    tunables: Tunables,
    audit: Arc<dyn AuditSink>,
}

/// Tenant config overlaid with request overrides and intent adjustments.
#[derive(Debug, Clone)]
struct EffectiveConfig {
    strategy: FusionStrategyName,
    weights: FusionWeights,
    rrf_k: f32,
    keyword_enabled: bool,
    config: SearchConfig,
}

impl HybridOrchestrator {
    pub fn new(
        vector_store: Arc<dyn VectorSearch>,
        lexical_store: Arc<dyn LexicalStore>,
        embedder: Arc<dyn Embedder>,
        registry: Arc<ConfigRegistry>,
        tunables: Tunables,
    ) -> Self {
        Self {
            vector_store,
            lexical: LexicalSearchAdapter::new(lexical_store, &tunables),
            embedder,
            reranker: None,
            registry,
            rescorer: KeywordPointsRescorer::new(
                tunables.keyword_points.clone(),
                Arc::new(UniformCorpusStats),
            ),
            tunables,
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Attach a cross-encoder reranker for the final band.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Use tenant corpus statistics for keyword-points weighting.
    pub fn with_corpus_stats(mut self, stats: Arc<dyn CorpusStats>) -> Self {
        self.rescorer = KeywordPointsRescorer::new(self.tunables.keyword_points.clone(), stats);
        self
    }

    /// Redirect audit records away from the default tracing sink.
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    /// Run one retrieval. The whole pipeline is bounded by the overall
    /// budget; tripping it abandons outstanding sub-fetches and returns an
    /// empty structured result.
    pub async fn retrieve(
        &self,
        collection: &str,
        request: SearchRequest,
        principal: &Principal,
    ) -> Result<HybridSearchResult> {
        principal.validate()?;
        request.validate()?;

        let started = Instant::now();
        let overall = self.tunables.timeouts.overall();
        match tokio::time::timeout(overall, self.run_pipeline(collection, &request, principal))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                self.audit.error(
                    "retrieval aborted by overall timeout",
                    &[
                        ("tenant", principal.tenant.clone()),
                        ("collection", collection.to_string()),
                    ],
                );
                let metrics = SearchMetrics {
                    overall_timed_out: true,
                    total_ms: started.elapsed().as_millis() as u64,
                    ..Default::default()
                };
                Ok(HybridSearchResult::empty_with_metrics(metrics))
            }
        }
    }

    async fn run_pipeline(
        &self,
        collection: &str,
        request: &SearchRequest,
        principal: &Principal,
    ) -> Result<HybridSearchResult> {
        let started = Instant::now();
        let mut metrics = SearchMetrics::default();

        // 1. Tenant config with request overlay.
        let tenant_id = request
            .tenant_id
            .clone()
            .unwrap_or_else(|| principal.tenant.clone());
        let config = self.registry.search_config(&tenant_id).await?;
        let mut effective = overlay(config, request);

        // 2. Pre-retrieval intent pass: dedup window, weight bias, depth.
        let intent = detect_intent(&request.query, None);
        apply_intent(&mut effective, &intent);
        let temporal_query = intent.dedup_cap > 3;
        metrics.temporal_query = temporal_query;
        metrics.dedup_cap = intent.dedup_cap;

        // 3. RBAC predicate, conjoined with the request filter.
        let rbac = rbac_filter(principal);
        let vector_filter = match &request.filter {
            Some(user_filter) => rbac.clone().and(user_filter.clone()),
            None => rbac.clone(),
        };

        // 4. Embed the query (or its expansion). Failure is fatal.
        let query_text = intent
            .expanded_query
            .clone()
            .unwrap_or_else(|| request.query.clone());
        let embed_started = Instant::now();
        let query_vector = with_timeout(
            Stage::Embedding,
            self.tunables.timeouts.embedding(),
            self.embedder.embed(&query_text),
        )
        .await?;
        metrics.embedding_ms = embed_started.elapsed().as_millis() as u64;

        // 5. Vector and lexical retrieval fan out in parallel; each side
        // owns its budget and falls back to an empty list.
        let adaptive = effective.config.keyword_points_enabled
            || effective.config.domainless_ranking_enabled;
        let k_base = intent.retrieval_k.unwrap_or(self.tunables.retrieval_k_base);
        let vector_k = if adaptive {
            request.limit.max(k_base)
        } else {
            request.limit
        };

        let vector_future = with_timeout_and_fallback(
            Stage::VectorSearch,
            self.tunables.timeouts.vector(),
            self.vector_store.search(
                collection,
                VectorQuery {
                    vector: query_vector,
                    limit: vector_k,
                    filter: Some(vector_filter.clone()),
                },
            ),
            Vec::new(),
        );

        let lexical_future = self.lexical_stage(collection, request, &effective, &rbac);

        let (vector_outcome, lexical_outcome) = tokio::join!(vector_future, lexical_future);

        metrics.vector_ms = vector_outcome.elapsed_ms;
        metrics.vector_timed_out = vector_outcome.timed_out;
        metrics.vector_fallback_used = vector_outcome.fallback_used;
        metrics.lexical_ms = lexical_outcome.elapsed_ms;
        metrics.lexical_timed_out = lexical_outcome.timed_out;
        metrics.lexical_fallback_used = lexical_outcome.fallback_used;

        // 6. Vector degradation past its fallback yields an empty result,
        // never an error. Lexical degradation just empties that side.
        if vector_outcome.fallback_used {
            metrics.total_ms = started.elapsed().as_millis() as u64;
            self.audit.error(
                "vector stage degraded, returning empty result",
                &[
                    ("tenant", tenant_id.clone()),
                    ("timed_out", vector_outcome.timed_out.to_string()),
                ],
            );
            return Ok(HybridSearchResult::empty_with_metrics(metrics));
        }

        let mut vector_candidates = scored_points_to_candidates(vector_outcome.value);
        let mut keyword_candidates = lexical_outcome.value;

        // 7. Per-document dedup, widened for temporal queries.
        vector_candidates = dedup_by_doc(vector_candidates, intent.dedup_cap);
        keyword_candidates = dedup_by_doc(keyword_candidates, intent.dedup_cap);
        if temporal_query {
            mark_temporal(&mut vector_candidates);
            mark_temporal(&mut keyword_candidates);
        }
        metrics.vector_count = vector_candidates.len();
        metrics.keyword_count = keyword_candidates.len();

        // Post-vector intent pass: the high-confidence shortcut needs the
        // top vector score.
        let strategy_requested = FusionStrategy::from(effective.strategy);
        let top_vector = vector_candidates.first().map(|c| c.score);
        let post_intent = detect_intent(&request.query, top_vector);
        apply_intent(&mut effective, &post_intent);

        // 8. Fusion.
        let outcome = fuse(
            &to_fusion_inputs(&vector_candidates),
            &to_fusion_inputs(&keyword_candidates),
            FusionStrategy::from(effective.strategy),
            effective.weights,
            effective.rrf_k,
            Normalization::from(effective.config.normalization),
        );
        let override_applied =
            outcome.override_applied || outcome.strategy_applied != strategy_requested;
        metrics.strategy_applied = outcome.strategy_applied.as_str().to_string();
        metrics.strategy_override_applied = override_applied;

        let mut fused = hydrate_fused(&outcome.candidates, &vector_candidates, &keyword_candidates);
        metrics.fused_count = fused.len();

        let fusion_trace = FusionTrace {
            strategy_requested,
            strategy_applied: outcome.strategy_applied,
            override_applied,
            candidates: outcome.candidates,
        };

        // 9. Keyword-points rescoring over lexical term hits.
        if effective.config.keyword_points_enabled && !keyword_candidates.is_empty() {
            let terms = self.rescorer.extract_term_weights(&request.query);
            let rescored = self.rescorer.rescore(&fused, &terms);
            let by_id: HashMap<&str, f32> = rescored
                .iter()
                .map(|entry| (entry.id.as_str(), entry.final_score))
                .collect();
            for candidate in &mut fused {
                if let Some(&score) = by_id.get(candidate.id.as_str()) {
                    candidate.score = score;
                }
            }
            sort_by_score(&mut fused);
            metrics.keyword_points_applied = true;
        }

        // 10. Domainless multipliers.
        if effective.config.domainless_ranking_enabled {
            let terms = self.rescorer.extract_term_weights(&request.query);
            for candidate in &mut fused {
                candidate.score *=
                    self.rescorer
                        .domainless_multiplier(candidate, &terms, &self.tunables.domainless);
            }
            sort_by_score(&mut fused);
            metrics.domainless_applied = true;
        }

        let fusion_results = fused.clone();

        // 11. Final band: reranker, else MMR, else passthrough.
        let (mut final_list, reranker_results) = self
            .final_band(request, &effective, fused, &mut metrics)
            .await;

        // 12. Slice, RBAC defense in depth, language relevance, ranks.
        final_list.truncate(request.limit);
        final_list.retain(|candidate| candidate.payload.grants_access(principal));
        apply_language_relevance(&mut final_list, principal, self.tunables.language_match_boost);
        for (index, candidate) in final_list.iter_mut().enumerate() {
            candidate.rank = Some(index + 1);
        }
        metrics.final_count = final_list.len();
        metrics.total_ms = started.elapsed().as_millis() as u64;

        self.audit.info(
            "retrieval complete",
            &[
                ("tenant", tenant_id),
                ("collection", collection.to_string()),
                ("vector_count", metrics.vector_count.to_string()),
                ("keyword_count", metrics.keyword_count.to_string()),
                ("final_count", metrics.final_count.to_string()),
                ("strategy", metrics.strategy_applied.clone()),
            ],
        );

        Ok(HybridSearchResult {
            final_results: final_list,
            vector_results: vector_candidates,
            keyword_results: keyword_candidates,
            fusion_results,
            reranker_results,
            reconstructed_sections: Vec::new(),
            metrics,
            fusion_trace: Some(fusion_trace),
        })
    }

    /// Lexical stage under its own budget. Disabled keyword search resolves
    /// to a clean empty outcome.
    async fn lexical_stage(
        &self,
        collection: &str,
        request: &SearchRequest,
        effective: &EffectiveConfig,
        rbac: &Filter,
    ) -> retrieval_core::StageOutcome<Vec<Candidate>> {
        if !effective.keyword_enabled {
            return retrieval_core::StageOutcome::clean(Vec::new(), 0);
        }
        with_timeout_and_fallback(
            Stage::LexicalSearch,
            self.tunables.timeouts.lexical(),
            self.lexical.search(
                collection,
                LexicalSearchRequest {
                    query: request.query.clone(),
                    limit: request.limit.max(self.tunables.retrieval_k_base),
                    rbac: rbac.clone(),
                    user_filter: request.filter.clone(),
                    domainless: effective.config.domainless_ranking_enabled,
                    high_value_tokens: effective.config.high_value_tokens.clone(),
                },
            ),
            Vec::new(),
        )
        .await
    }

    /// Rerank the top band, or fall back to MMR diversity, or pass through.
    async fn final_band(
        &self,
        request: &SearchRequest,
        effective: &EffectiveConfig,
        fused: Vec<Candidate>,
        metrics: &mut SearchMetrics,
    ) -> (Vec<Candidate>, Option<Vec<Candidate>>) {
        if effective.config.reranker_enabled {
            if let Some(reranker) = &self.reranker {
                let band_size = self.tunables.reranker_top_n_in.min(fused.len());
                let band = &fused[..band_size];
                let rerank_request = RerankRequest {
                    query: request.query.clone(),
                    documents: band
                        .iter()
                        .map(|candidate| RerankerInput {
                            id: candidate.id.clone(),
                            content: candidate.content.clone().unwrap_or_default(),
                            payload: candidate.payload.to_payload(),
                            original_score: candidate.score,
                        })
                        .collect(),
                    top_k: self.tunables.reranker_top_n_out,
                };

                let rerank_started = Instant::now();
                let outcome = with_timeout_and_fallback(
                    Stage::Reranker,
                    self.tunables.timeouts.reranker(),
                    reranker.rerank(rerank_request),
                    Vec::new(),
                )
                .await;
                metrics.rerank_ms = rerank_started.elapsed().as_millis() as u64;
                metrics.reranker_timed_out = outcome.timed_out;

                if outcome.fallback_used {
                    // Silent fallback to the pre-rerank list.
                    metrics.reranking_enabled = false;
                    return (fused, None);
                }
                metrics.reranking_enabled = true;

                let by_id: HashMap<&str, &Candidate> =
                    fused.iter().map(|c| (c.id.as_str(), c)).collect();
                let mut reranked: Vec<Candidate> = outcome
                    .value
                    .iter()
                    .filter_map(|doc| {
                        by_id.get(doc.id.as_str()).map(|original| {
                            let mut candidate = (*original).clone();
                            candidate.reranker_score = Some(doc.reranker_score);
                            candidate.score = doc.reranker_score;
                            candidate
                        })
                    })
                    .collect();
                let reranker_results = Some(reranked.clone());

                // Reranker order is authoritative within the band; band
                // leftovers and beyond-band candidates follow in pre-rerank
                // order.
                let reranked_ids: std::collections::HashSet<&str> =
                    outcome.value.iter().map(|doc| doc.id.as_str()).collect();
                reranked.extend(
                    fused
                        .iter()
                        .filter(|candidate| !reranked_ids.contains(candidate.id.as_str()))
                        .cloned(),
                );
                return (reranked, reranker_results);
            }
        }

        if effective.config.mmr_enabled {
            let expanded = fused
                .into_iter()
                .take(request.limit * 2)
                .collect::<Vec<_>>();
            metrics.mmr_applied = true;
            return (mmr_select(expanded, request.limit), None);
        }

        (fused, None)
    }
}

#[async_trait]
impl Retrieve for HybridOrchestrator {
    async fn retrieve(
        &self,
        collection: &str,
        request: SearchRequest,
        principal: &Principal,
    ) -> Result<HybridSearchResult> {
        HybridOrchestrator::retrieve(self, collection, request, principal).await
    }
}

fn overlay(config: SearchConfig, request: &SearchRequest) -> EffectiveConfig {
    EffectiveConfig {
        strategy: config.fusion_strategy,
        weights: FusionWeights {
            vector: request.vector_weight.unwrap_or(config.vector_weight),
            keyword: request.keyword_weight.unwrap_or(config.keyword_weight),
        },
        rrf_k: request.rrf_k.unwrap_or(config.rrf_k),
        keyword_enabled: request
            .enable_keyword_search
            .unwrap_or(config.keyword_enabled),
        config,
    }
}

fn apply_intent(effective: &mut EffectiveConfig, intent: &IntentProfile) {
    if let Some(strategy) = intent.strategy {
        effective.strategy = strategy;
    }
    if let Some((vector, keyword)) = intent.weights {
        effective.weights = FusionWeights { vector, keyword };
    }
}

fn scored_points_to_candidates(points: Vec<ScoredPoint>) -> Vec<Candidate> {
    points
        .into_iter()
        .map(|point| {
            let meta = retrieval_core::DocumentMetadata::from_payload(&point.payload);
            let mut candidate = Candidate::new(point.id, point.score, meta)
                .with_search_type(SearchType::VectorOnly);
            candidate.vector_score = Some(point.score);
            candidate.content = point.content;
            candidate
        })
        .collect()
}

fn to_fusion_inputs(candidates: &[Candidate]) -> Vec<FusionInput> {
    FusionInput::from_scored(candidates.iter().map(|candidate| {
        (
            candidate.id.clone(),
            candidate.score,
            (!candidate.payload.doc_id.is_empty()).then(|| candidate.payload.doc_id.clone()),
        )
    }))
}

fn mark_temporal(candidates: &mut [Candidate]) {
    for candidate in candidates {
        if let Some(content) = &candidate.content {
            if TEMPORAL_PATTERN.is_match(content) {
                candidate.temporal_boost = true;
            }
        }
    }
}

/// Rebuild full candidates from fusion output, merging content, payload,
/// and term hits from whichever side saw the chunk.
fn hydrate_fused(
    fused: &[retrieval_fusion::FusedCandidate],
    vector: &[Candidate],
    keyword: &[Candidate],
) -> Vec<Candidate> {
    let vector_by_id: HashMap<&str, &Candidate> =
        vector.iter().map(|c| (c.id.as_str(), c)).collect();
    let keyword_by_id: HashMap<&str, &Candidate> =
        keyword.iter().map(|c| (c.id.as_str(), c)).collect();

    fused
        .iter()
        .filter_map(|entry| {
            let from_vector = vector_by_id.get(entry.id.as_str());
            let from_keyword = keyword_by_id.get(entry.id.as_str());
            let source = from_vector.or(from_keyword)?;

            let mut candidate = (*source).clone();
            candidate.score = entry.fused_score;
            candidate.fusion_score = Some(entry.fused_score);
            candidate.vector_score = entry.vector_score;
            candidate.keyword_score = entry.keyword_score;
            candidate.search_type = match (from_vector, from_keyword) {
                (Some(_), Some(_)) => SearchType::Hybrid,
                (Some(_), None) => SearchType::VectorOnly,
                _ => SearchType::KeywordOnly,
            };
            if let Some(keyword_side) = from_keyword {
                if candidate.content.is_none() {
                    candidate.content = keyword_side.content.clone();
                }
                candidate.term_hits = keyword_side.term_hits.clone();
                candidate.token_positions = keyword_side.token_positions.clone();
                candidate.temporal_boost = candidate.temporal_boost || keyword_side.temporal_boost;
            }
            Some(candidate)
        })
        .collect()
}

fn sort_by_score(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Nudge candidates toward the principal's declared language. Applied
/// after the final slice; candidates without a language are untouched.
fn apply_language_relevance(candidates: &mut Vec<Candidate>, principal: &Principal, boost: f32) {
    let Some(language) = &principal.language else {
        return;
    };
    if boost <= 0.0 {
        return;
    }
    for candidate in candidates.iter_mut() {
        if let Some(lang) = &candidate.payload.lang {
            if lang.eq_ignore_ascii_case(language) {
                candidate.score *= boost;
            } else {
                candidate.score /= boost;
            }
        }
    }
    sort_by_score(candidates);
}
