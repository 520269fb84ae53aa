//! Error taxonomy for the retrieval engine
//!
//! Stage-local fallbacks (timeouts, absorbed upstream failures) are not
//! errors; they are recorded in metrics by the stage that produced them.
//! Everything surfaced through this enum crosses a crate boundary.

use thiserror::Error;

/// Pipeline stage that produced an error or timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Embedding,
    VectorSearch,
    LexicalSearch,
    Fusion,
    Reranker,
    SectionFetch,
    Config,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Embedding => "embedding",
            Stage::VectorSearch => "vector_search",
            Stage::LexicalSearch => "lexical_search",
            Stage::Fusion => "fusion",
            Stage::Reranker => "reranker",
            Stage::SectionFetch => "section_fetch",
            Stage::Config => "config",
        };
        f.write_str(name)
    }
}

/// Retrieval engine errors
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Principal failed structural validation (empty tenant or id).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A stage exceeded its budget. Converted to an empty-stage result by
    /// the stage that owns the budget; only surfaced when no fallback exists.
    #[error("upstream timeout in {stage}")]
    UpstreamTimeout { stage: Stage },

    /// Hard failure of an adapter. Embedding failures are surfaced;
    /// vector/lexical/reranker failures are absorbed with fallbacks.
    #[error("upstream failure in {stage}: {message}")]
    UpstreamFailure { stage: Stage, message: String },

    /// Configuration rejected on update; the existing config is retained.
    #[error("invalid configuration for tenant {tenant}, field {field}: {message}")]
    InvalidConfiguration {
        tenant: String,
        field: String,
        message: String,
    },

    /// Rank contiguity, deduplication, or type-tag violation.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl RetrievalError {
    /// Build an upstream failure for a stage.
    pub fn upstream(stage: Stage, message: impl Into<String>) -> Self {
        Self::UpstreamFailure {
            stage,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
