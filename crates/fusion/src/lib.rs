//! Rank fusion and rescoring
//!
//! Stateless combination of two ranked lists under a named strategy, score
//! normalization with safe fallbacks, rules-based query-intent detection,
//! and the keyword-points rescorer that refines fused scores using term
//! hits collected during lexical search.

pub mod corpus_stats;
pub mod intent;
pub mod keyword_points;
pub mod normalize;
pub mod strategy;

pub use corpus_stats::{CachedCorpusStats, CorpusStats, UniformCorpusStats};
pub use intent::{detect_intent, IntentProfile, QueryClass, TEMPORAL_PATTERN};
pub use keyword_points::{KeywordPointsRescorer, RescoredCandidate, TermWeight};
pub use normalize::{normalize, Normalization};
pub use strategy::{fuse, FusedCandidate, FusionOutcome, FusionStrategy, FusionWeights};
