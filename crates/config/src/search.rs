//! Per-tenant search configuration

use serde::{Deserialize, Serialize};

use retrieval_core::{Result, RetrievalError};

/// Named fusion strategy. Unknown names fail at configuration time, never
/// per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategyName {
    WeightedAverage,
    ScoreWeightedRrf,
    MaxConfidence,
    BordaRank,
}

impl Default for FusionStrategyName {
    fn default() -> Self {
        FusionStrategyName::WeightedAverage
    }
}

impl std::str::FromStr for FusionStrategyName {
    type Err = String;

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name {
            "weighted_average" => Ok(Self::WeightedAverage),
            "score_weighted_rrf" => Ok(Self::ScoreWeightedRrf),
            "max_confidence" => Ok(Self::MaxConfidence),
            "borda_rank" => Ok(Self::BordaRank),
            other => Err(format!("unknown fusion strategy: {other}")),
        }
    }
}

/// Named normalization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationName {
    MinMax,
    ZScore,
    None,
}

impl Default for NormalizationName {
    fn default() -> Self {
        NormalizationName::MinMax
    }
}

/// Tenant search configuration. Request fields overlay these values for
/// one call; the document itself is only changed through the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Tenant this document belongs to
    pub tenant_id: String,
    /// Whether lexical search participates at all
    pub keyword_enabled: bool,
    /// Weight for the vector side in fusion
    pub vector_weight: f32,
    /// Weight for the lexical side in fusion
    pub keyword_weight: f32,
    /// RRF k parameter
    pub rrf_k: f32,
    /// Fusion strategy
    pub fusion_strategy: FusionStrategyName,
    /// Score normalization applied per side before fusion
    pub normalization: NormalizationName,
    /// Whether the cross-encoder band runs
    pub reranker_enabled: bool,
    /// Results kept out of the reranker band
    pub reranker_top_k: usize,
    /// Whether the keyword-points rescorer refines fused scores
    pub keyword_points_enabled: bool,
    /// Whether MMR diversity replaces the reranker when it is unavailable
    pub mmr_enabled: bool,
    /// Whether domainless field-boost/proximity/coverage multipliers apply
    pub domainless_ranking_enabled: bool,
    /// Tenant override for the high-value token list; `None` keeps the
    /// process default
    pub high_value_tokens: Option<Vec<String>>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            keyword_enabled: true,
            vector_weight: 0.7,
            keyword_weight: 0.3,
            rrf_k: 60.0,
            fusion_strategy: FusionStrategyName::default(),
            normalization: NormalizationName::default(),
            reranker_enabled: true,
            reranker_top_k: 8,
            keyword_points_enabled: true,
            mmr_enabled: true,
            domainless_ranking_enabled: false,
            high_value_tokens: None,
        }
    }
}

impl SearchConfig {
    /// Default configuration for a tenant.
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            ..Default::default()
        }
    }

    /// Validate the document. Invalid documents are rejected on update and
    /// the previous config is retained.
    pub fn validate(&self) -> Result<()> {
        let field_err = |field: &str, message: &str| RetrievalError::InvalidConfiguration {
            tenant: self.tenant_id.clone(),
            field: field.to_string(),
            message: message.to_string(),
        };

        if !self.vector_weight.is_finite() || self.vector_weight < 0.0 {
            return Err(field_err("vector_weight", "must be finite and non-negative"));
        }
        if !self.keyword_weight.is_finite() || self.keyword_weight < 0.0 {
            return Err(field_err(
                "keyword_weight",
                "must be finite and non-negative",
            ));
        }
        if self.vector_weight == 0.0 && self.keyword_weight == 0.0 {
            return Err(field_err("vector_weight", "at least one weight must be positive"));
        }
        if !self.rrf_k.is_finite() || self.rrf_k <= 0.0 {
            return Err(field_err("rrf_k", "must be positive"));
        }
        if self.reranker_top_k == 0 {
            return Err(field_err("reranker_top_k", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_default_weights() {
        let config = SearchConfig::default();
        assert!((config.vector_weight - 0.7).abs() < f32::EPSILON);
        assert!((config.keyword_weight - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.fusion_strategy, FusionStrategyName::WeightedAverage);
        assert_eq!(config.normalization, NormalizationName::MinMax);
    }

    #[test]
    fn test_strategy_parses_known_names() {
        assert_eq!(
            FusionStrategyName::from_str("score_weighted_rrf").unwrap(),
            FusionStrategyName::ScoreWeightedRrf
        );
        assert!(FusionStrategyName::from_str("reciprocal_mean").is_err());
    }

    #[test]
    fn test_validate_rejects_negative_weight() {
        let config = SearchConfig {
            vector_weight: -0.1,
            ..SearchConfig::for_tenant("acme")
        };
        assert!(matches!(
            config.validate(),
            Err(RetrievalError::InvalidConfiguration { ref field, .. }) if field == "vector_weight"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_rrf_k() {
        let config = SearchConfig {
            rrf_k: 0.0,
            ..SearchConfig::for_tenant("acme")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(SearchConfig::for_tenant("acme").validate().is_ok());
    }
}
