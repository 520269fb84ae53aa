//! Tenant configuration for the retrieval engine
//!
//! Two disjoint documents per tenant: `SearchConfig` (retrieval behavior)
//! and `GuardrailConfig` (answerability thresholds and IDK templates).
//! Loading from disk or network is the host's concern; this crate owns the
//! document shapes, validation, process-wide tunables, and the in-process
//! registry with TTL caching and eager invalidation.

pub mod guardrail;
pub mod registry;
pub mod search;
pub mod tunables;

pub use guardrail::{
    AlgorithmWeights, FallbackConfig, GuardrailConfig, GuardrailThresholds, IdkReasonCode,
    IdkTemplates, ThresholdPreset,
};
pub use registry::{ConfigRegistry, ConfigSource, StaticConfigSource};
pub use search::{FusionStrategyName, NormalizationName, SearchConfig};
pub use tunables::{
    DomainlessTunables, KeywordPointsTunables, SectionCompletionTunables, SectionMergeStrategy,
    SectionScorePolicy, TimeoutTunables, Tunables,
};
