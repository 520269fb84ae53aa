//! Capability traits the engine consumes
//!
//! The engine never talks to a concrete store, embedder, or reranker; it
//! consumes these narrow interfaces. Hosts provide implementations (HTTP,
//! local, mock) as concrete types.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::filter::Filter;

/// A scored point returned by vector search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
    /// Chunk content when the store carries it inline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Vector search request.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub limit: usize,
    pub filter: Option<Filter>,
}

/// Dense vector search capability.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(&self, collection: &str, query: VectorQuery) -> Result<Vec<ScoredPoint>>;
}

/// An unscored point returned by a scroll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollPoint {
    pub id: String,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Scroll request against a filter-capable store.
#[derive(Debug, Clone)]
pub struct ScrollRequest {
    pub filter: Filter,
    pub limit: usize,
    pub with_payload: bool,
}

/// Scroll capability: filtered enumeration without scoring. The lexical
/// adapter turns this into a scored keyword search; the section fetcher
/// uses it to pull sibling chunks.
#[async_trait]
pub trait LexicalStore: Send + Sync {
    async fn scroll(&self, collection: &str, request: ScrollRequest) -> Result<Vec<ScrollPoint>>;
}

/// Query embedding capability.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// A document handed to the reranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerInput {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
    pub original_score: f32,
}

/// Reranker request: the top band of fused candidates.
#[derive(Debug, Clone)]
pub struct RerankRequest {
    pub query: String,
    pub documents: Vec<RerankerInput>,
    pub top_k: usize,
}

/// A reranked document. Output order is authoritative within the band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankedDocument {
    pub id: String,
    pub reranker_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub payload: HashMap<String, Value>,
}

/// Cross-encoder reranking capability.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, request: RerankRequest) -> Result<Vec<RerankedDocument>>;
}

/// Structured audit record sink. The engine emits records, not formatted
/// strings; hosts decide where they land.
pub trait AuditSink: Send + Sync {
    fn info(&self, message: &str, fields: &[(&str, String)]);
    fn error(&self, message: &str, fields: &[(&str, String)]);
}

/// Default sink forwarding audit records to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn info(&self, message: &str, fields: &[(&str, String)]) {
        tracing::info!(target: "retrieval_audit", fields = ?fields, "{}", message);
    }

    fn error(&self, message: &str, fields: &[(&str, String)]) {
        tracing::error!(target: "retrieval_audit", fields = ?fields, "{}", message);
    }
}
