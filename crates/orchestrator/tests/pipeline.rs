//! End-to-end pipeline behavior over in-memory capability mocks

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use retrieval_config::{ConfigRegistry, SearchConfig, SectionMergeStrategy, Tunables};
use retrieval_core::{
    Condition, DocumentMetadata, Embedder, LexicalStore, Principal, RerankRequest,
    RerankedDocument, Reranker, Result, RetrievalError, ScoredPoint, ScrollPoint, ScrollRequest,
    SearchType, VectorQuery, VectorSearch,
};
use retrieval_orchestrator::{
    HybridOrchestrator, SearchRequest, SectionAwareOrchestrator,
};

// ---------------------------------------------------------------------------
// Mock capabilities
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.1, 0.2, 0.3, 0.4])
    }
}

struct MockVectorStore {
    points: Vec<ScoredPoint>,
    honor_filter: bool,
    calls: AtomicUsize,
}

impl MockVectorStore {
    fn new(points: Vec<ScoredPoint>) -> Self {
        Self {
            points,
            honor_filter: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VectorSearch for MockVectorStore {
    async fn search(&self, _collection: &str, query: VectorQuery) -> Result<Vec<ScoredPoint>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut hits: Vec<ScoredPoint> = self
            .points
            .iter()
            .filter(|point| {
                if !self.honor_filter {
                    return true;
                }
                match &query.filter {
                    Some(filter) => {
                        filter.matches(&DocumentMetadata::from_payload(&point.payload))
                    }
                    None => true,
                }
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        hits.truncate(query.limit);
        Ok(hits)
    }
}

struct MockScrollStore {
    points: Vec<ScrollPoint>,
}

#[async_trait]
impl LexicalStore for MockScrollStore {
    async fn scroll(&self, _collection: &str, request: ScrollRequest) -> Result<Vec<ScrollPoint>> {
        Ok(self
            .points
            .iter()
            .filter(|point| {
                let meta = DocumentMetadata::from_payload(&point.payload);
                let musts = request.filter.must.iter().all(|c| c.matches(&meta));
                let shoulds = request.filter.should.is_empty()
                    || request.filter.should.iter().any(|c| match c {
                        Condition::TextMatch { field, text } if field == "content" => point
                            .content
                            .as_deref()
                            .unwrap_or("")
                            .to_lowercase()
                            .contains(&text.to_lowercase()),
                        other => other.matches(&meta),
                    });
                musts && shoulds
            })
            .take(request.limit)
            .cloned()
            .collect())
    }
}

/// Reranker that scores by a fixed table, missing ids get 0.
struct TableReranker {
    scores: HashMap<String, f32>,
    delay_ms: u64,
}

#[async_trait]
impl Reranker for TableReranker {
    async fn rerank(&self, request: RerankRequest) -> Result<Vec<RerankedDocument>> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        let mut reranked: Vec<RerankedDocument> = request
            .documents
            .iter()
            .map(|doc| RerankedDocument {
                id: doc.id.clone(),
                reranker_score: self.scores.get(&doc.id).copied().unwrap_or(0.0),
                content: Some(doc.content.clone()),
                payload: doc.payload.clone(),
            })
            .collect();
        reranked.sort_by(|a, b| b.reranker_score.partial_cmp(&a.reranker_score).unwrap());
        reranked.truncate(request.top_k);
        Ok(reranked)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn payload(doc_id: &str, acl: &[&str], section_path: Option<&str>) -> HashMap<String, serde_json::Value> {
    let mut payload: HashMap<String, serde_json::Value> = HashMap::new();
    payload.insert("tenant".to_string(), json!("acme"));
    payload.insert("docId".to_string(), json!(doc_id));
    payload.insert(
        "acl".to_string(),
        json!(acl.iter().copied().collect::<Vec<_>>()),
    );
    if let Some(section) = section_path {
        payload.insert("sectionPath".to_string(), json!(section));
    }
    payload
}

fn vector_point(id: &str, doc_id: &str, score: f32, content: &str) -> ScoredPoint {
    ScoredPoint {
        id: id.to_string(),
        score,
        payload: payload(doc_id, &["public"], None),
        content: Some(content.to_string()),
    }
}

fn scroll_point(id: &str, doc_id: &str, content: &str) -> ScrollPoint {
    ScrollPoint {
        id: id.to_string(),
        payload: payload(doc_id, &["public"], None),
        content: Some(content.to_string()),
    }
}

async fn orchestrator_with(
    vector: MockVectorStore,
    scroll: MockScrollStore,
    tunables: Tunables,
    config: Option<SearchConfig>,
) -> HybridOrchestrator {
    let registry = Arc::new(ConfigRegistry::in_memory(&tunables));
    if let Some(config) = config {
        registry.update_search_config(config).await.unwrap();
    }
    HybridOrchestrator::new(
        Arc::new(vector),
        Arc::new(scroll),
        Arc::new(MockEmbedder::default()),
        registry,
        tunables,
    )
}

fn plain_config() -> SearchConfig {
    SearchConfig {
        reranker_enabled: false,
        mmr_enabled: false,
        ..SearchConfig::for_tenant("acme")
    }
}

fn principal() -> Principal {
    Principal::new("u1", "acme")
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unauthorized_principal_makes_no_upstream_calls() {
    let embedder = Arc::new(MockEmbedder::default());
    let vector = Arc::new(MockVectorStore::new(vec![]));
    let registry = Arc::new(ConfigRegistry::in_memory(&Tunables::reference()));
    let orchestrator = HybridOrchestrator::new(
        Arc::clone(&vector) as Arc<dyn VectorSearch>,
        Arc::new(MockScrollStore { points: vec![] }),
        Arc::clone(&embedder) as Arc<dyn Embedder>,
        registry,
        Tunables::reference(),
    );

    let nobody = Principal::new("u1", "");
    let result = orchestrator
        .retrieve("docs", SearchRequest::new("query", 5), &nobody)
        .await;

    assert!(matches!(result, Err(RetrievalError::Unauthorized(_))));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(vector.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn high_confidence_vector_upgrades_strategy_and_leads() {
    let orchestrator = orchestrator_with(
        MockVectorStore::new(vec![
            vector_point("v1", "d1", 0.92, "the answer in full"),
            vector_point("v2", "d2", 0.88, "close contender"),
            vector_point("v3", "d3", 0.10, "distant noise"),
        ]),
        MockScrollStore {
            points: vec![scroll_point("k1", "d4", "weak keyword answer")],
        },
        Tunables::reference(),
        Some(plain_config()),
    )
    .await;

    let mut request = SearchRequest::new("answer", 5);
    request.vector_weight = Some(0.7);
    request.keyword_weight = Some(0.3);
    let result = orchestrator
        .retrieve("docs", request, &principal())
        .await
        .unwrap();

    let trace = result.fusion_trace.as_ref().unwrap();
    assert!(trace.override_applied);
    assert_eq!(trace.strategy_applied.as_str(), "max_confidence");
    assert_eq!(result.metrics.strategy_applied, "max_confidence");
    assert_eq!(result.final_results[0].id, "v1");
}

#[tokio::test]
async fn temporal_query_keeps_five_chunks_per_doc() {
    // Six chunks of one document, all matching the temporal keyword set.
    let chunks: Vec<ScrollPoint> = (0..6)
        .map(|i| {
            scroll_point(
                &format!("k{i}"),
                "d1",
                &format!("segment {i}: the day length is measured in hours"),
            )
        })
        .collect();

    let orchestrator = orchestrator_with(
        MockVectorStore::new(vec![]),
        MockScrollStore { points: chunks },
        Tunables::reference(),
        Some(plain_config()),
    )
    .await;

    let result = orchestrator
        .retrieve("docs", SearchRequest::new("how long is a day", 10), &principal())
        .await
        .unwrap();

    assert!(result.metrics.temporal_query);
    assert_eq!(result.metrics.dedup_cap, 5);
    let d1_count = result
        .final_results
        .iter()
        .filter(|c| c.payload.doc_id == "d1")
        .count();
    assert_eq!(d1_count, 5);
    assert!(result.final_results.iter().all(|c| c.temporal_boost));
}

#[tokio::test]
async fn non_temporal_query_caps_three_chunks_per_doc() {
    let chunks: Vec<ScrollPoint> = (0..6)
        .map(|i| scroll_point(&format!("k{i}"), "d1", &format!("warranty clause {i}")))
        .collect();

    let orchestrator = orchestrator_with(
        MockVectorStore::new(vec![]),
        MockScrollStore { points: chunks },
        Tunables::reference(),
        Some(plain_config()),
    )
    .await;

    let result = orchestrator
        .retrieve("docs", SearchRequest::new("warranty clause", 10), &principal())
        .await
        .unwrap();

    let d1_count = result
        .final_results
        .iter()
        .filter(|c| c.payload.doc_id == "d1")
        .count();
    assert_eq!(d1_count, 3);
}

#[tokio::test]
async fn rbac_is_enforced_even_when_the_store_ignores_filters() {
    let mut leaky = MockVectorStore::new(vec![
        ScoredPoint {
            id: "restricted".to_string(),
            score: 0.95,
            payload: payload("d1", &["hr-only"], None),
            content: Some("confidential".to_string()),
        },
        vector_point("open", "d2", 0.8, "public knowledge"),
    ]);
    leaky.honor_filter = false;

    let orchestrator = orchestrator_with(
        leaky,
        MockScrollStore { points: vec![] },
        Tunables::reference(),
        Some(plain_config()),
    )
    .await;

    let result = orchestrator
        .retrieve("docs", SearchRequest::new("knowledge", 5), &principal())
        .await
        .unwrap();

    assert_eq!(result.final_results.len(), 1);
    assert_eq!(result.final_results[0].id, "open");
    let me = principal();
    for candidate in &result.final_results {
        assert!(candidate.payload.grants_access(&me));
    }
}

#[tokio::test]
async fn final_ranks_are_contiguous_from_one() {
    let orchestrator = orchestrator_with(
        MockVectorStore::new(vec![
            vector_point("v1", "d1", 0.9, "alpha"),
            vector_point("v2", "d2", 0.8, "beta"),
            vector_point("v3", "d3", 0.7, "gamma"),
        ]),
        MockScrollStore {
            points: vec![scroll_point("k1", "d4", "alpha sibling")],
        },
        Tunables::reference(),
        Some(plain_config()),
    )
    .await;

    let result = orchestrator
        .retrieve("docs", SearchRequest::new("alpha beta", 3), &principal())
        .await
        .unwrap();

    let ranks: Vec<usize> = result
        .final_results
        .iter()
        .map(|c| c.rank.unwrap())
        .collect();
    let expected: Vec<usize> = (1..=result.final_results.len()).collect();
    assert_eq!(ranks, expected);
}

#[tokio::test]
async fn no_ghost_chunks_in_final_results() {
    let orchestrator = orchestrator_with(
        MockVectorStore::new(vec![
            vector_point("v1", "d1", 0.9, "refund policy"),
            vector_point("v2", "d2", 0.5, "shipping rules"),
        ]),
        MockScrollStore {
            points: vec![scroll_point("k1", "d3", "refund escalation path")],
        },
        Tunables::reference(),
        Some(plain_config()),
    )
    .await;

    let result = orchestrator
        .retrieve("docs", SearchRequest::new("refund", 5), &principal())
        .await
        .unwrap();

    for candidate in &result.final_results {
        let in_vector = result.vector_results.iter().any(|c| c.id == candidate.id);
        let in_keyword = result.keyword_results.iter().any(|c| c.id == candidate.id);
        assert!(in_vector || in_keyword, "ghost chunk {}", candidate.id);
    }
}

#[tokio::test]
async fn reranker_order_is_authoritative_within_band() {
    let mut scores = HashMap::new();
    scores.insert("v2".to_string(), 0.99);
    scores.insert("v1".to_string(), 0.40);

    let tunables = Tunables::reference();
    let registry = Arc::new(ConfigRegistry::in_memory(&tunables));
    registry
        .update_search_config(SearchConfig {
            mmr_enabled: false,
            ..SearchConfig::for_tenant("acme")
        })
        .await
        .unwrap();
    let orchestrator = HybridOrchestrator::new(
        Arc::new(MockVectorStore::new(vec![
            vector_point("v1", "d1", 0.9, "first by vector"),
            vector_point("v2", "d2", 0.8, "second by vector"),
        ])),
        Arc::new(MockScrollStore { points: vec![] }),
        Arc::new(MockEmbedder::default()),
        registry,
        tunables,
    )
    .with_reranker(Arc::new(TableReranker {
        scores,
        delay_ms: 0,
    }));

    let result = orchestrator
        .retrieve("docs", SearchRequest::new("query", 2), &principal())
        .await
        .unwrap();

    assert!(result.metrics.reranking_enabled);
    assert!(result.reranker_results.is_some());
    assert_eq!(result.final_results[0].id, "v2");
    assert_eq!(result.final_results[0].reranker_score, Some(0.99));
}

#[tokio::test]
async fn slow_reranker_falls_back_to_pre_rerank_order() {
    let mut tunables = Tunables::reference();
    tunables.timeouts.reranker_ms = 20;

    let registry = Arc::new(ConfigRegistry::in_memory(&tunables));
    registry
        .update_search_config(SearchConfig {
            mmr_enabled: false,
            ..SearchConfig::for_tenant("acme")
        })
        .await
        .unwrap();
    let orchestrator = HybridOrchestrator::new(
        Arc::new(MockVectorStore::new(vec![
            vector_point("v1", "d1", 0.9, "first"),
            vector_point("v2", "d2", 0.8, "second"),
        ])),
        Arc::new(MockScrollStore { points: vec![] }),
        Arc::new(MockEmbedder::default()),
        registry,
        tunables,
    )
    .with_reranker(Arc::new(TableReranker {
        scores: HashMap::new(),
        delay_ms: 5_000,
    }));

    let result = orchestrator
        .retrieve("docs", SearchRequest::new("query", 2), &principal())
        .await
        .unwrap();

    // Silent fallback: pre-rerank order, reranking marked off.
    assert!(!result.metrics.reranking_enabled);
    assert!(result.metrics.reranker_timed_out);
    assert!(result.reranker_results.is_none());
    assert_eq!(result.final_results[0].id, "v1");
}

#[tokio::test]
async fn keyword_search_can_be_disabled_per_request() {
    let orchestrator = orchestrator_with(
        MockVectorStore::new(vec![vector_point("v1", "d1", 0.9, "vector only")]),
        MockScrollStore {
            points: vec![scroll_point("k1", "d2", "keyword answer")],
        },
        Tunables::reference(),
        Some(plain_config()),
    )
    .await;

    let mut request = SearchRequest::new("keyword answer", 5);
    request.enable_keyword_search = Some(false);
    let result = orchestrator
        .retrieve("docs", request, &principal())
        .await
        .unwrap();

    assert!(result.keyword_results.is_empty());
    assert_eq!(result.metrics.keyword_count, 0);
    assert_eq!(result.final_results.len(), 1);
    assert_eq!(result.final_results[0].search_type, SearchType::VectorOnly);
}

// ---------------------------------------------------------------------------
// Section completion
// ---------------------------------------------------------------------------

fn section_vector_points() -> Vec<ScoredPoint> {
    vec![
        ScoredPoint {
            id: "c0".to_string(),
            score: 0.9,
            payload: payload("d7", &["public"], Some("block_9/part_0")),
            content: Some("part zero".to_string()),
        },
        ScoredPoint {
            id: "c2".to_string(),
            score: 0.8,
            payload: payload("d7", &["public"], Some("block_9/part_2")),
            content: Some("part two".to_string()),
        },
    ]
}

fn section_sibling_store() -> MockScrollStore {
    MockScrollStore {
        points: vec![ScrollPoint {
            id: "c1".to_string(),
            payload: payload("d7", &["public"], Some("block_9/part_1")),
            content: Some("part one".to_string()),
        }],
    }
}

async fn section_orchestrator(merge: SectionMergeStrategy) -> SectionAwareOrchestrator {
    let mut tunables = Tunables::reference();
    tunables.sections.merge_strategy = merge;

    let store = Arc::new(section_sibling_store());
    let registry = Arc::new(ConfigRegistry::in_memory(&tunables));
    registry
        .update_search_config(SearchConfig {
            keyword_enabled: false,
            reranker_enabled: false,
            mmr_enabled: false,
            ..SearchConfig::for_tenant("acme")
        })
        .await
        .unwrap();
    let inner = HybridOrchestrator::new(
        Arc::new(MockVectorStore::new(section_vector_points())),
        Arc::clone(&store) as Arc<dyn LexicalStore>,
        Arc::new(MockEmbedder::default()),
        registry,
        tunables,
    );
    SectionAwareOrchestrator::new(Arc::new(inner), store)
}

#[tokio::test]
async fn fragmented_section_is_completed_in_order() {
    let orchestrator = section_orchestrator(SectionMergeStrategy::Append).await;
    let result = orchestrator
        .retrieve("docs", SearchRequest::new("query", 5), &principal())
        .await
        .unwrap();

    assert_eq!(result.reconstructed_sections.len(), 1);
    let section = &result.reconstructed_sections[0];
    assert_eq!(section.content, "part zero\n\npart one\n\npart two");
    assert_eq!(section.doc_id, "d7");
    assert_eq!(section.section_path, "block_9");

    // Append keeps the original chunks and adds the section at the end.
    let ids: Vec<&str> = result
        .final_results
        .iter()
        .map(|c| c.id.as_str())
        .collect();
    assert!(ids.contains(&"c0"));
    assert!(ids.contains(&"c2"));
    let last = result.final_results.last().unwrap();
    assert_eq!(last.search_type, SearchType::SectionReconstructed);

    let ranks: Vec<usize> = result
        .final_results
        .iter()
        .map(|c| c.rank.unwrap())
        .collect();
    let expected: Vec<usize> = (1..=result.final_results.len()).collect();
    assert_eq!(ranks, expected);
}

#[tokio::test]
async fn replace_strategy_removes_covered_chunks() {
    let orchestrator = section_orchestrator(SectionMergeStrategy::Replace).await;
    let result = orchestrator
        .retrieve("docs", SearchRequest::new("query", 5), &principal())
        .await
        .unwrap();

    let ids: Vec<&str> = result
        .final_results
        .iter()
        .map(|c| c.id.as_str())
        .collect();
    assert!(!ids.contains(&"c0"));
    assert!(!ids.contains(&"c2"));
    assert_eq!(
        result.final_results[0].search_type,
        SearchType::SectionReconstructed
    );
}
