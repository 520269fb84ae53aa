//! Per-tenant guardrail configuration

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use retrieval_core::{Result, RetrievalError};

/// Reason codes keyed into the IDK template table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdkReasonCode {
    /// Retrieval returned nothing relevant
    NoRelevantDocs,
    /// Results exist but confidence is below the tenant floor
    LowConfidence,
    /// Score distribution is too scattered to trust
    AmbiguousQuery,
}

impl IdkReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoRelevantDocs => "NO_RELEVANT_DOCS",
            Self::LowConfidence => "LOW_CONFIDENCE",
            Self::AmbiguousQuery => "AMBIGUOUS_QUERY",
        }
    }
}

/// Answerability thresholds. A result set is answerable only when every
/// bound holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailThresholds {
    pub min_confidence: f32,
    pub min_top_score: f32,
    pub min_mean_score: f32,
    pub max_std_dev: f32,
    pub min_result_count: usize,
}

impl Default for GuardrailThresholds {
    fn default() -> Self {
        ThresholdPreset::Permissive.thresholds()
    }
}

/// Built-in threshold presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPreset {
    Strict,
    Permissive,
    Custom,
}

impl ThresholdPreset {
    /// Threshold values for the preset. `Custom` starts from the permissive
    /// base and expects explicit field overrides.
    pub fn thresholds(&self) -> GuardrailThresholds {
        match self {
            ThresholdPreset::Strict => GuardrailThresholds {
                min_confidence: 0.6,
                min_top_score: 0.5,
                min_mean_score: 0.35,
                max_std_dev: 0.25,
                min_result_count: 2,
            },
            ThresholdPreset::Permissive | ThresholdPreset::Custom => GuardrailThresholds {
                min_confidence: 0.3,
                min_top_score: 0.25,
                min_mean_score: 0.15,
                max_std_dev: 0.6,
                min_result_count: 1,
            },
        }
    }
}

/// IDK response templates, keyed by reason code, with suggestion bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdkTemplates {
    /// Template text per reason code; missing codes fall back to built-ins
    pub templates: HashMap<String, String>,
    /// Maximum excerpt suggestions attached to an IDK response
    pub max_suggestions: usize,
    /// Minimum candidate score for a suggestion excerpt
    pub suggestion_threshold: f32,
}

impl Default for IdkTemplates {
    fn default() -> Self {
        Self {
            templates: HashMap::new(),
            max_suggestions: 3,
            suggestion_threshold: 0.3,
        }
    }
}

impl IdkTemplates {
    /// Resolve the template for a reason code, falling back to built-ins.
    pub fn resolve(&self, reason: IdkReasonCode) -> String {
        if let Some(custom) = self.templates.get(reason.as_str()) {
            return custom.clone();
        }
        match reason {
            IdkReasonCode::NoRelevantDocs => {
                "I could not find any documents relevant to your question.".to_string()
            }
            IdkReasonCode::LowConfidence => {
                "I found some material, but not enough to answer confidently.".to_string()
            }
            IdkReasonCode::AmbiguousQuery => {
                "Your question matches several unrelated topics; please narrow it down.".to_string()
            }
        }
    }
}

/// Behavior when the guardrail itself degrades (confidence computation
/// failure, missing stages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Pass results through when the guardrail cannot compute confidence
    pub allow_on_error: bool,
    /// Confidence assigned to fallback decisions
    pub fallback_confidence: f32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            allow_on_error: false,
            fallback_confidence: 0.0,
        }
    }
}

/// Ensemble weights for the answerability algorithms. They are renormalized
/// over the algorithms that actually produced a score, so a missing
/// reranker contribution redistributes pro-rata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmWeights {
    pub statistical: f32,
    pub threshold: f32,
    pub ml_features: f32,
    pub reranker_confidence: f32,
}

impl Default for AlgorithmWeights {
    fn default() -> Self {
        Self {
            statistical: 0.4,
            threshold: 0.3,
            ml_features: 0.2,
            reranker_confidence: 0.1,
        }
    }
}

/// Tenant guardrail configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    pub tenant_id: String,
    /// Whether the guardrail evaluates at all; disabled means passthrough
    pub enabled: bool,
    /// Whether admin principals bypass the guardrail
    pub bypass_enabled: bool,
    /// Preset the thresholds were derived from
    pub preset: ThresholdPreset,
    pub threshold: GuardrailThresholds,
    pub idk_templates: IdkTemplates,
    pub fallback: FallbackConfig,
    pub algorithm_weights: AlgorithmWeights,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            enabled: true,
            bypass_enabled: true,
            preset: ThresholdPreset::Permissive,
            threshold: GuardrailThresholds::default(),
            idk_templates: IdkTemplates::default(),
            fallback: FallbackConfig::default(),
            algorithm_weights: AlgorithmWeights::default(),
        }
    }
}

impl GuardrailConfig {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            ..Default::default()
        }
    }

    /// Apply a preset, replacing the threshold block.
    pub fn with_preset(mut self, preset: ThresholdPreset) -> Self {
        self.threshold = preset.thresholds();
        self.preset = preset;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let field_err = |field: &str, message: &str| RetrievalError::InvalidConfiguration {
            tenant: self.tenant_id.clone(),
            field: field.to_string(),
            message: message.to_string(),
        };

        for (field, value) in [
            ("min_confidence", self.threshold.min_confidence),
            ("min_top_score", self.threshold.min_top_score),
            ("min_mean_score", self.threshold.min_mean_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(field_err(field, "must lie in [0, 1]"));
            }
        }
        if !self.threshold.max_std_dev.is_finite() || self.threshold.max_std_dev < 0.0 {
            return Err(field_err("max_std_dev", "must be finite and non-negative"));
        }
        if self.idk_templates.max_suggestions > 10 {
            return Err(field_err("max_suggestions", "must be at most 10"));
        }
        let weights = &self.algorithm_weights;
        for (field, value) in [
            ("statistical", weights.statistical),
            ("threshold", weights.threshold),
            ("ml_features", weights.ml_features),
            ("reranker_confidence", weights.reranker_confidence),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(field_err(field, "algorithm weight must be non-negative"));
            }
        }
        if weights.statistical + weights.threshold + weights.ml_features <= 0.0 {
            return Err(field_err(
                "algorithm_weights",
                "non-reranker weights must not all be zero",
            ));
        }
        Ok(())
    }
}
