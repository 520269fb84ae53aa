//! Core types and capability traits for the retrieval engine
//!
//! This crate provides foundational types used across all other crates:
//! - Capability traits for pluggable backends (vector store, lexical store,
//!   embedder, reranker, audit sink)
//! - Principal and document metadata types used for access control
//! - Candidate and fusion-input value objects passed between pipeline stages
//! - Filter predicates understood by the store adapters
//! - Error types
//! - Timeout/fallback combinator for I/O-bearing stages

pub mod candidate;
pub mod capabilities;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod principal;
pub mod timeout;

pub use candidate::{Candidate, FusionInput, SearchType, TermHit, TermMatchKind};
pub use capabilities::{
    AuditSink, Embedder, LexicalStore, RerankRequest, RerankedDocument, Reranker, RerankerInput,
    ScoredPoint, ScrollPoint, ScrollRequest, TracingAuditSink, VectorQuery, VectorSearch,
};
pub use error::{Result, RetrievalError, Stage};
pub use filter::{rbac_filter, Condition, Filter};
pub use metadata::DocumentMetadata;
pub use principal::Principal;
pub use timeout::{with_timeout, with_timeout_and_fallback, StageOutcome};
