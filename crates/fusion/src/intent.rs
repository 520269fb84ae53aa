//! Rules-based query-intent detection
//!
//! A pure function mapping a query string (and optionally the top vector
//! score) to an effective strategy, weight pair, retrieval depth, and
//! dedup window. No learned components.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use retrieval_config::FusionStrategyName;

/// Temporal-query detector. A match widens the per-doc dedup window from 3
/// to 5 chunks and biases weights toward the lexical side.
pub static TEMPORAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(how long|how many|how much|how tall|how wide|how deep|day|hour|minute|second|time|duration|length)\b",
    )
    .expect("temporal pattern is valid")
});

/// Vector score at which the high-confidence shortcut fires.
const HIGH_CONFIDENCE_VECTOR: f32 = 0.75;

/// Recognized query classes, in rule priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryClass {
    /// Duration/measurement queries spread across many chunks per doc
    Temporal,
    /// The vector side already answered with high confidence
    HighConfidenceVector,
    /// No rule fired; the tenant defaults apply
    Default,
}

/// Effective overrides produced by intent detection. `None` fields keep
/// the tenant-configured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentProfile {
    pub class: QueryClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<FusionStrategyName>,
    /// `(vector_weight, keyword_weight)` override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<(f32, f32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_k: Option<usize>,
    /// Expanded query text to embed instead of the raw query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded_query: Option<String>,
    /// Per-doc chunk cap for deduplication
    pub dedup_cap: usize,
}

impl IntentProfile {
    fn default_profile() -> Self {
        Self {
            class: QueryClass::Default,
            strategy: None,
            weights: None,
            retrieval_k: None,
            expanded_query: None,
            dedup_cap: 3,
        }
    }
}

/// Detect the query intent. `top_vector_score` is `None` before vector
/// search returns; callers re-run detection afterwards to pick up the
/// high-confidence shortcut.
pub fn detect_intent(query: &str, top_vector_score: Option<f32>) -> IntentProfile {
    if TEMPORAL_PATTERN.is_match(query) {
        return IntentProfile {
            class: QueryClass::Temporal,
            strategy: None,
            // Temporal questions are usually answered verbatim in the text,
            // so the lexical side gets more of the say.
            weights: Some((0.6, 0.4)),
            retrieval_k: Some(16),
            expanded_query: None,
            dedup_cap: 5,
        };
    }

    if let Some(score) = top_vector_score {
        if score >= HIGH_CONFIDENCE_VECTOR {
            return IntentProfile {
                class: QueryClass::HighConfidenceVector,
                strategy: Some(FusionStrategyName::MaxConfidence),
                weights: None,
                retrieval_k: None,
                expanded_query: None,
                dedup_cap: 3,
            };
        }
    }

    IntentProfile::default_profile()
}
