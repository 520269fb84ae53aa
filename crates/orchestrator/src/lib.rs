//! Hybrid retrieval orchestration
//!
//! Sequences embedding, parallel vector and lexical retrieval, fusion,
//! keyword-points rescoring, reranking or MMR diversity, RBAC filtering,
//! and language relevance into one deterministic pipeline. The
//! section-aware wrapper adds fragment completion under a hard timeout.

pub mod dedup;
pub mod hybrid;
pub mod mmr;
pub mod request;
pub mod section_aware;

use async_trait::async_trait;

use retrieval_core::{Principal, Result};

pub use dedup::dedup_by_doc;
pub use hybrid::HybridOrchestrator;
pub use mmr::mmr_select;
pub use request::{FusionTrace, HybridSearchResult, SearchMetrics, SearchRequest};
pub use section_aware::SectionAwareOrchestrator;

/// Retrieval entry point exposed to the guardrail layer and to hosts.
#[async_trait]
pub trait Retrieve: Send + Sync {
    async fn retrieve(
        &self,
        collection: &str,
        request: SearchRequest,
        principal: &Principal,
    ) -> Result<HybridSearchResult>;
}
