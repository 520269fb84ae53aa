//! Section-aware orchestration
//!
//! Wraps the hybrid orchestrator and completes fragmented sections found
//! in the final list: detect, fetch siblings under authorization, merge.
//! The whole completion pass runs under a hard budget; tripping it leaves
//! the base result untouched.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use retrieval_core::{LexicalStore, Principal, Result};
use retrieval_sections::{
    detect_sections, merge_sections, reconstruct_section, ReconstructedSection, SectionFetcher,
};

use crate::hybrid::HybridOrchestrator;
use crate::request::{HybridSearchResult, SearchRequest};
use crate::Retrieve;

/// Hybrid retrieval plus section completion.
pub struct SectionAwareOrchestrator {
    inner: Arc<HybridOrchestrator>,
    fetcher: SectionFetcher,
}

impl SectionAwareOrchestrator {
    pub fn new(inner: Arc<HybridOrchestrator>, store: Arc<dyn LexicalStore>) -> Self {
        let tunables = inner.tunables().sections.clone();
        Self {
            inner,
            fetcher: SectionFetcher::new(store, tunables),
        }
    }

    pub async fn retrieve(
        &self,
        collection: &str,
        request: SearchRequest,
        principal: &Principal,
    ) -> Result<HybridSearchResult> {
        let mut result = self.inner.retrieve(collection, request, principal).await?;

        let sections = self.inner.tunables().sections.clone();
        if !sections.enabled || result.final_results.is_empty() {
            return Ok(result);
        }

        let detected = detect_sections(&result.final_results);
        let selected = self.fetcher.select(&detected);
        if selected.is_empty() {
            return Ok(result);
        }

        let completion_started = Instant::now();
        let budget = std::time::Duration::from_millis(sections.completion_timeout_ms);
        let completed = tokio::time::timeout(
            budget,
            self.complete_sections(collection, principal, selected, sections.score_policy),
        )
        .await;
        result.metrics.section_completion_ms = completion_started.elapsed().as_millis() as u64;

        let reconstructed = match completed {
            Ok(reconstructed) => reconstructed,
            Err(_) => {
                tracing::warn!(
                    budget_ms = sections.completion_timeout_ms,
                    "section completion timed out"
                );
                result.metrics.section_completion_timed_out = true;
                return Ok(result);
            }
        };
        if reconstructed.is_empty() {
            return Ok(result);
        }

        result.metrics.sections_completed = reconstructed.len();
        result.final_results = merge_sections(
            std::mem::take(&mut result.final_results),
            &reconstructed,
            sections.merge_strategy,
        );
        // Reconstructed payloads union their chunk ACLs; the merged list
        // still has to pass the last-filter rule.
        result
            .final_results
            .retain(|candidate| candidate.payload.grants_access(principal));
        for (index, candidate) in result.final_results.iter_mut().enumerate() {
            candidate.rank = Some(index + 1);
        }
        result.metrics.final_count = result.final_results.len();
        result.reconstructed_sections = reconstructed;

        Ok(result)
    }

    async fn complete_sections(
        &self,
        collection: &str,
        principal: &Principal,
        selected: Vec<&retrieval_sections::DetectedSection>,
        policy: retrieval_config::SectionScorePolicy,
    ) -> Vec<ReconstructedSection> {
        let fetched = self
            .fetcher
            .fetch_missing(collection, principal, selected)
            .await;
        fetched
            .iter()
            .map(|section| reconstruct_section(&section.detected, &section.siblings, policy))
            .collect()
    }
}

#[async_trait]
impl Retrieve for SectionAwareOrchestrator {
    async fn retrieve(
        &self,
        collection: &str,
        request: SearchRequest,
        principal: &Principal,
    ) -> Result<HybridSearchResult> {
        SectionAwareOrchestrator::retrieve(self, collection, request, principal).await
    }
}
