//! Answerability guardrail
//!
//! Multi-stage source-aware confidence with degradation detection, an
//! answerability ensemble checked against tenant thresholds, and a
//! structured IDK generator. The guarded service wraps retrieval and
//! returns either the ranked context or a refusal, never an error for an
//! unanswerable query.

pub mod answerability;
pub mod idk;
pub mod service;
pub mod source_aware;
pub mod stats;

pub use answerability::{AlgorithmScores, AnswerabilityScore};
pub use idk::{IdkResponse, IdkSuggestion};
pub use service::{GuardedResult, GuardrailDecision, GuardrailService};
pub use source_aware::{
    ConfidenceStrategy, DegradationAlert, SourceAwareResult, StageConfidence, StageInputs,
    StageKind,
};
pub use stats::ScoreStats;
