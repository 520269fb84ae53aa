//! Authorized sibling fetch for detected sections
//!
//! Fetches for different groups proceed in parallel; each scroll runs
//! under its own budget and falls back to an empty sibling list. The
//! section-aware orchestrator wraps the whole pass in a hard timeout.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;

use retrieval_config::SectionCompletionTunables;
use retrieval_core::{
    rbac_filter, with_timeout_and_fallback, Condition, LexicalStore, Principal, ScrollPoint,
    ScrollRequest, Stage,
};

use crate::detector::DetectedSection;

/// A detected section together with its fetched sibling chunks.
#[derive(Debug, Clone)]
pub struct FetchedSection {
    pub detected: DetectedSection,
    pub siblings: Vec<ScrollPoint>,
    /// The sibling scroll timed out or failed and came back empty
    pub fetch_degraded: bool,
}

/// Fetches missing sibling chunks for detected sections.
pub struct SectionFetcher {
    store: Arc<dyn LexicalStore>,
    tunables: SectionCompletionTunables,
}

impl SectionFetcher {
    pub fn new(store: Arc<dyn LexicalStore>, tunables: SectionCompletionTunables) -> Self {
        Self { store, tunables }
    }

    /// Select the sections worth completing: confident enough, bounded by
    /// the per-request section cap.
    pub fn select<'a>(&self, detected: &'a [DetectedSection]) -> Vec<&'a DetectedSection> {
        detected
            .iter()
            .filter(|section| section.confidence >= self.tunables.min_trigger_confidence)
            .take(self.tunables.max_sections_to_complete)
            .collect()
    }

    /// Fetch siblings for the selected sections in parallel. Chunks that
    /// were already retrieved are excluded client-side.
    pub async fn fetch_missing(
        &self,
        collection: &str,
        principal: &Principal,
        selected: Vec<&DetectedSection>,
    ) -> Vec<FetchedSection> {
        let fetches = selected.into_iter().map(|section| {
            let section = section.clone();
            async move {
                let known_ids: HashSet<&str> = section
                    .original_chunks
                    .iter()
                    .map(|chunk| chunk.id.as_str())
                    .collect();

                let filter = rbac_filter(principal)
                    .must(Condition::match_value("docId", section.doc_id.clone()))
                    .must(Condition::text_match(
                        "sectionPath",
                        section.base_section_path.clone(),
                    ));

                let outcome = with_timeout_and_fallback(
                    Stage::SectionFetch,
                    std::time::Duration::from_millis(self.tunables.query_timeout_ms),
                    self.store.scroll(
                        collection,
                        ScrollRequest {
                            filter,
                            limit: self.tunables.max_chunks_per_section,
                            with_payload: true,
                        },
                    ),
                    Vec::new(),
                )
                .await;

                let fetch_degraded = outcome.degraded();

                let siblings: Vec<ScrollPoint> = outcome
                    .value
                    .into_iter()
                    .filter(|point| !known_ids.contains(point.id.as_str()))
                    .collect();

                tracing::debug!(
                    section = %section.base_section_path,
                    doc = %section.doc_id,
                    siblings = siblings.len(),
                    degraded = fetch_degraded,
                    "section sibling fetch complete"
                );

                FetchedSection {
                    fetch_degraded,
                    detected: section,
                    siblings,
                }
            }
        });

        join_all(fetches).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    use retrieval_core::{Candidate, DocumentMetadata, Result};

    use crate::detector::DetectionPattern;

    struct MemoryStore {
        points: Vec<ScrollPoint>,
        delay_ms: u64,
    }

    #[async_trait]
    impl LexicalStore for MemoryStore {
        async fn scroll(
            &self,
            _collection: &str,
            request: ScrollRequest,
        ) -> Result<Vec<ScrollPoint>> {
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            Ok(self
                .points
                .iter()
                .filter(|point| {
                    let meta = DocumentMetadata::from_payload(&point.payload);
                    request.filter.matches(&meta)
                })
                .take(request.limit)
                .cloned()
                .collect())
        }
    }

    fn sibling(id: &str, doc_id: &str, section_path: &str) -> ScrollPoint {
        let mut payload: HashMap<String, serde_json::Value> = HashMap::new();
        payload.insert("tenant".to_string(), serde_json::json!("acme"));
        payload.insert("docId".to_string(), serde_json::json!(doc_id));
        payload.insert("acl".to_string(), serde_json::json!(["public"]));
        payload.insert("sectionPath".to_string(), serde_json::json!(section_path));
        ScrollPoint {
            id: id.to_string(),
            payload,
            content: Some(format!("content of {id}")),
        }
    }

    fn detected(doc_id: &str, base: &str, chunk_ids: &[&str]) -> DetectedSection {
        DetectedSection {
            base_section_path: base.to_string(),
            doc_id: doc_id.to_string(),
            original_chunks: chunk_ids
                .iter()
                .map(|id| {
                    Candidate::new(
                        *id,
                        0.5,
                        DocumentMetadata {
                            tenant: "acme".to_string(),
                            doc_id: doc_id.to_string(),
                            acl: vec!["public".to_string()],
                            ..Default::default()
                        },
                    )
                })
                .collect(),
            confidence: 0.9,
            pattern: DetectionPattern::SequentialParts,
            detection_reasons: vec![],
        }
    }

    fn tunables() -> SectionCompletionTunables {
        SectionCompletionTunables::default()
    }

    #[tokio::test]
    async fn test_fetch_excludes_already_retrieved_ids() {
        let store = MemoryStore {
            points: vec![
                sibling("s0", "d7", "block_9/part_0"),
                sibling("s1", "d7", "block_9/part_1"),
                sibling("s2", "d7", "block_9/part_2"),
            ],
            delay_ms: 0,
        };
        let fetcher = SectionFetcher::new(Arc::new(store), tunables());
        let section = detected("d7", "block_9", &["s0", "s2"]);
        let principal = Principal::new("u1", "acme");

        let fetched = fetcher
            .fetch_missing("docs", &principal, vec![&section])
            .await;
        assert_eq!(fetched.len(), 1);
        let ids: Vec<&str> = fetched[0].siblings.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["s1"]);
        assert!(!fetched[0].fetch_degraded);
    }

    #[tokio::test]
    async fn test_fetch_respects_rbac() {
        let mut foreign = sibling("s1", "d7", "block_9/part_1");
        foreign
            .payload
            .insert("acl".to_string(), serde_json::json!(["hr-only"]));
        let store = MemoryStore {
            points: vec![foreign],
            delay_ms: 0,
        };
        let fetcher = SectionFetcher::new(Arc::new(store), tunables());
        let section = detected("d7", "block_9", &["s0"]);
        let principal = Principal::new("u1", "acme");

        let fetched = fetcher
            .fetch_missing("docs", &principal, vec![&section])
            .await;
        assert!(fetched[0].siblings.is_empty());
    }

    #[tokio::test]
    async fn test_slow_store_degrades_to_empty() {
        let store = MemoryStore {
            points: vec![sibling("s1", "d7", "block_9/part_1")],
            delay_ms: 5_000,
        };
        let mut tunables = tunables();
        tunables.query_timeout_ms = 20;
        let fetcher = SectionFetcher::new(Arc::new(store), tunables);
        let section = detected("d7", "block_9", &["s0"]);
        let principal = Principal::new("u1", "acme");

        let fetched = fetcher
            .fetch_missing("docs", &principal, vec![&section])
            .await;
        assert!(fetched[0].siblings.is_empty());
        assert!(fetched[0].fetch_degraded);
    }

    #[tokio::test]
    async fn test_select_applies_confidence_floor_and_cap() {
        let fetcher = SectionFetcher::new(
            Arc::new(MemoryStore {
                points: vec![],
                delay_ms: 0,
            }),
            tunables(),
        );
        let mut sections: Vec<DetectedSection> = (0..5)
            .map(|i| detected(&format!("d{i}"), "block_1", &["x"]))
            .collect();
        sections[4].confidence = 0.2;

        let selected = fetcher.select(&sections);
        // Four confident sections, capped at three.
        assert_eq!(selected.len(), 3);
    }
}
