//! Answerability scoring
//!
//! An ensemble over statistical, threshold, and feature-based algorithm
//! scores (plus reranker confidence when present), blended with the
//! source-aware result under its selected strategy, then checked against
//! the tenant thresholds.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use retrieval_config::{GuardrailConfig, GuardrailThresholds};

use crate::source_aware::{self, ConfidenceStrategy, SourceAwareResult, StageInputs};
use crate::stats::ScoreStats;

/// Individual algorithm scores entering the ensemble.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmScores {
    pub statistical: f32,
    pub threshold: f32,
    pub ml_features: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker_confidence: Option<f32>,
}

/// The full answerability computation for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerabilityScore {
    pub confidence: f32,
    pub score_stats: ScoreStats,
    pub algorithm_scores: AlgorithmScores,
    pub source_aware: SourceAwareResult,
    pub is_answerable: bool,
    pub reasoning: String,
    pub computation_time_ms: u64,
}

impl AnswerabilityScore {
    /// Compute answerability for the final score distribution, with the
    /// per-stage inputs feeding the source-aware pass.
    pub fn compute(
        final_scores: &[f32],
        stage_inputs: &StageInputs,
        config: &GuardrailConfig,
        tau: f32,
        max_confidence_threshold: f32,
    ) -> Self {
        let started = Instant::now();
        let stats = ScoreStats::from_scores(final_scores);
        let source_aware = source_aware::compute(stage_inputs, tau, max_confidence_threshold);

        let algorithm_scores = AlgorithmScores {
            statistical: statistical_score(&stats),
            threshold: threshold_score(&stats, &config.threshold),
            ml_features: ml_feature_score(&stats),
            reranker_confidence: stage_inputs.reranker.as_deref().map(|scores| {
                let reranker_stats = ScoreStats::from_scores(scores);
                (0.5 * reranker_stats.max
                    + 0.3 * reranker_stats.mean
                    + 0.2 * reranker_stats.consistency())
                .clamp(0.0, 1.0)
            }),
        };

        let ensemble = ensemble_confidence(&algorithm_scores, config);

        // The source-aware strategy decides how the ensemble and the
        // per-stage view reconcile: a preserved high-confidence stage may
        // lift the final number, a weak pipeline pulls it down.
        let confidence = match source_aware.strategy {
            ConfidenceStrategy::MaxConfidence => ensemble.max(source_aware.confidence),
            ConfidenceStrategy::Conservative => ensemble.min(source_aware.confidence),
            ConfidenceStrategy::AdaptiveWeighted => {
                (ensemble + source_aware.confidence) / 2.0
            }
        }
        .clamp(0.0, 1.0);

        let (is_answerable, reasoning) =
            threshold_decision(confidence, &stats, &config.threshold);

        Self {
            confidence,
            score_stats: stats,
            algorithm_scores,
            source_aware,
            is_answerable,
            reasoning,
            computation_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

fn statistical_score(stats: &ScoreStats) -> f32 {
    if stats.count == 0 {
        return 0.0;
    }
    (0.5 * stats.max + 0.3 * stats.mean + 0.2 * stats.consistency()).clamp(0.0, 1.0)
}

/// Fraction of the distribution-level threshold checks that pass. The
/// confidence bound is judged on the final number, not here.
fn threshold_score(stats: &ScoreStats, thresholds: &GuardrailThresholds) -> f32 {
    if stats.count == 0 {
        return 0.0;
    }
    let checks = [
        stats.max >= thresholds.min_top_score,
        stats.mean >= thresholds.min_mean_score,
        stats.std_dev <= thresholds.max_std_dev,
        stats.count >= thresholds.min_result_count,
    ];
    checks.iter().filter(|&&passed| passed).count() as f32 / checks.len() as f32
}

/// Cheap distribution features standing in for the learned scorer: result
/// mass, top-score separation, and spread.
fn ml_feature_score(stats: &ScoreStats) -> f32 {
    if stats.count == 0 {
        return 0.0;
    }
    let count_factor = (stats.count as f32 / 5.0).min(1.0);
    let separation = (stats.max - stats.mean).clamp(0.0, 1.0);
    (0.4 * count_factor + 0.3 * stats.max + 0.2 * stats.consistency() + 0.1 * separation)
        .clamp(0.0, 1.0)
}

/// Weighted ensemble, renormalized over the algorithms that produced a
/// score so a missing reranker redistributes its weight pro-rata.
fn ensemble_confidence(scores: &AlgorithmScores, config: &GuardrailConfig) -> f32 {
    let weights = &config.algorithm_weights;
    let mut weighted = weights.statistical * scores.statistical
        + weights.threshold * scores.threshold
        + weights.ml_features * scores.ml_features;
    let mut weight_sum = weights.statistical + weights.threshold + weights.ml_features;
    if let Some(reranker) = scores.reranker_confidence {
        weighted += weights.reranker_confidence * reranker;
        weight_sum += weights.reranker_confidence;
    }
    if weight_sum <= 0.0 {
        return 0.0;
    }
    (weighted / weight_sum).clamp(0.0, 1.0)
}

fn threshold_decision(
    confidence: f32,
    stats: &ScoreStats,
    thresholds: &GuardrailThresholds,
) -> (bool, String) {
    let mut failures: Vec<String> = Vec::new();
    if confidence < thresholds.min_confidence {
        failures.push(format!(
            "confidence {confidence:.3} below floor {:.3}",
            thresholds.min_confidence
        ));
    }
    if stats.max < thresholds.min_top_score {
        failures.push(format!(
            "top score {:.3} below floor {:.3}",
            stats.max, thresholds.min_top_score
        ));
    }
    if stats.mean < thresholds.min_mean_score {
        failures.push(format!(
            "mean score {:.3} below floor {:.3}",
            stats.mean, thresholds.min_mean_score
        ));
    }
    if stats.std_dev > thresholds.max_std_dev {
        failures.push(format!(
            "std dev {:.3} above ceiling {:.3}",
            stats.std_dev, thresholds.max_std_dev
        ));
    }
    if stats.count < thresholds.min_result_count {
        failures.push(format!(
            "result count {} below floor {}",
            stats.count, thresholds.min_result_count
        ));
    }

    if failures.is_empty() {
        (true, "all answerability thresholds satisfied".to_string())
    } else {
        (false, failures.join("; "))
    }
}
