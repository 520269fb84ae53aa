//! Source-aware confidence
//!
//! Per-stage confidence with degradation detection across the
//! vector→fusion and fusion→reranker transitions, and a strategy that
//! decides how stage confidences combine into one number.

use serde::{Deserialize, Serialize};

use crate::stats::ScoreStats;

/// Pipeline stages the guardrail reasons about, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Vector,
    Keyword,
    Fusion,
    Reranker,
}

/// Confidence computed for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfidence {
    pub stage: StageKind,
    pub confidence: f32,
    pub stats: ScoreStats,
    /// Fusion only: `fusionMax / vectorMax`, floored at 0.1, applied when
    /// the vector stage was already confident
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_preservation: Option<f32>,
}

/// A stage-to-stage confidence drop worth flagging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationAlert {
    pub from: StageKind,
    pub to: StageKind,
    /// Relative drop `(prior - current) / prior`
    pub severity: f32,
}

/// How the final confidence is assembled from the stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceStrategy {
    /// Trust the best stage; chosen when a confident stage degraded later
    MaxConfidence,
    /// Trust the worst stage; chosen when everything looks weak
    Conservative,
    /// Quality-weighted blend of all stages
    AdaptiveWeighted,
}

/// The full source-aware computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAwareResult {
    pub stages: Vec<StageConfidence>,
    pub alerts: Vec<DegradationAlert>,
    pub strategy: ConfidenceStrategy,
    pub confidence: f32,
}

/// Per-stage score lists feeding the computation. Sides that did not run
/// stay `None`.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    pub vector: Option<Vec<f32>>,
    pub keyword: Option<Vec<f32>>,
    pub fusion: Option<Vec<f32>>,
    pub reranker: Option<Vec<f32>>,
}

/// Vector stage was "already confident" above this; fusion quality
/// preservation only multiplies in that case.
const VECTOR_CONFIDENT_AT: f32 = 0.7;
const QUALITY_PRESERVATION_FLOOR: f32 = 0.1;
/// Alerts only fire when the prior stage stood above this.
const ALERT_PRIOR_FLOOR: f32 = 0.5;
/// Average stage confidence below this selects the conservative strategy.
const CONSERVATIVE_BELOW: f32 = 0.3;

/// Compute source-aware confidence. `tau` is the relative drop that
/// raises an alert; `max_confidence_threshold` is the stage confidence at
/// which max-confidence selection kicks in.
pub fn compute(inputs: &StageInputs, tau: f32, max_confidence_threshold: f32) -> SourceAwareResult {
    let mut stages: Vec<StageConfidence> = Vec::new();

    let vector = inputs.vector.as_deref().map(vector_confidence);
    if let Some(stage) = vector.clone() {
        stages.push(stage);
    }
    if let Some(scores) = inputs.keyword.as_deref() {
        stages.push(keyword_confidence(scores));
    }
    let fusion = inputs
        .fusion
        .as_deref()
        .map(|scores| fusion_confidence(scores, vector.as_ref()));
    if let Some(stage) = fusion.clone() {
        stages.push(stage);
    }
    let reranker = inputs.reranker.as_deref().map(reranker_confidence);
    if let Some(stage) = reranker.clone() {
        stages.push(stage);
    }

    let mut alerts = Vec::new();
    if let (Some(prior), Some(current)) = (vector.as_ref(), fusion.as_ref()) {
        if let Some(alert) = degradation(prior, current, tau) {
            alerts.push(alert);
        }
    }
    if let (Some(prior), Some(current)) = (fusion.as_ref(), reranker.as_ref()) {
        if let Some(alert) = degradation(prior, current, tau) {
            alerts.push(alert);
        }
    }

    let strategy = select_strategy(&stages, &alerts, max_confidence_threshold);
    let confidence = combine(&stages, &alerts, strategy);

    if !alerts.is_empty() {
        tracing::warn!(
            alerts = alerts.len(),
            strategy = ?strategy,
            confidence,
            "confidence degradation detected"
        );
    }

    SourceAwareResult {
        stages,
        alerts,
        strategy,
        confidence,
    }
}

fn vector_confidence(scores: &[f32]) -> StageConfidence {
    let stats = ScoreStats::from_scores(scores);
    let confidence =
        (0.6 * stats.max + 0.3 * stats.mean + 0.1 * stats.consistency()).clamp(0.0, 1.0);
    StageConfidence {
        stage: StageKind::Vector,
        confidence,
        stats,
        quality_preservation: None,
    }
}

/// Keyword scores run on a wider scale; halving the max acknowledges the
/// lower absolute magnitudes.
fn keyword_confidence(scores: &[f32]) -> StageConfidence {
    let stats = ScoreStats::from_scores(scores);
    let confidence =
        (0.5 * (stats.max / 2.0) + 0.3 * stats.mean + 0.2 * stats.consistency()).clamp(0.0, 1.0);
    StageConfidence {
        stage: StageKind::Keyword,
        confidence,
        stats,
        quality_preservation: None,
    }
}

fn fusion_confidence(scores: &[f32], vector: Option<&StageConfidence>) -> StageConfidence {
    let stats = ScoreStats::from_scores(scores);
    let base = (0.6 * stats.max + 0.3 * stats.mean + 0.1 * stats.consistency()).clamp(0.0, 1.0);

    // The key degradation signal: when the vector stage was already
    // confident, fusion is only as good as the share of that quality it
    // preserved.
    let quality_preservation = vector.and_then(|vector_stage| {
        if vector_stage.confidence >= VECTOR_CONFIDENT_AT && vector_stage.stats.max > 0.0 {
            Some((stats.max / vector_stage.stats.max).max(QUALITY_PRESERVATION_FLOOR))
        } else {
            None
        }
    });

    let confidence = match quality_preservation {
        Some(preservation) => (base * preservation.min(1.0)).clamp(0.0, 1.0),
        None => base,
    };

    StageConfidence {
        stage: StageKind::Fusion,
        confidence,
        stats,
        quality_preservation,
    }
}

fn reranker_confidence(scores: &[f32]) -> StageConfidence {
    let stats = ScoreStats::from_scores(scores);
    let confidence =
        (0.5 * stats.max + 0.3 * stats.mean + 0.2 * stats.consistency()).clamp(0.0, 1.0);
    StageConfidence {
        stage: StageKind::Reranker,
        confidence,
        stats,
        quality_preservation: None,
    }
}

fn degradation(
    prior: &StageConfidence,
    current: &StageConfidence,
    tau: f32,
) -> Option<DegradationAlert> {
    if prior.confidence <= ALERT_PRIOR_FLOOR {
        return None;
    }
    let drop = (prior.confidence - current.confidence) / prior.confidence;
    if drop > tau {
        Some(DegradationAlert {
            from: prior.stage,
            to: current.stage,
            severity: drop,
        })
    } else {
        None
    }
}

fn select_strategy(
    stages: &[StageConfidence],
    alerts: &[DegradationAlert],
    max_confidence_threshold: f32,
) -> ConfidenceStrategy {
    let any_confident = stages
        .iter()
        .any(|stage| stage.confidence >= max_confidence_threshold);
    if any_confident && !alerts.is_empty() {
        return ConfidenceStrategy::MaxConfidence;
    }

    if stages.is_empty() {
        return ConfidenceStrategy::Conservative;
    }
    let average =
        stages.iter().map(|stage| stage.confidence).sum::<f32>() / stages.len() as f32;
    if average < CONSERVATIVE_BELOW {
        return ConfidenceStrategy::Conservative;
    }

    ConfidenceStrategy::AdaptiveWeighted
}

fn combine(
    stages: &[StageConfidence],
    alerts: &[DegradationAlert],
    strategy: ConfidenceStrategy,
) -> f32 {
    if stages.is_empty() {
        return 0.0;
    }
    match strategy {
        ConfidenceStrategy::MaxConfidence => stages
            .iter()
            .map(|stage| stage.confidence)
            .fold(f32::NEG_INFINITY, f32::max),
        ConfidenceStrategy::Conservative => stages
            .iter()
            .map(|stage| stage.confidence)
            .fold(f32::INFINITY, f32::min),
        ConfidenceStrategy::AdaptiveWeighted => {
            // Quality-weighted blend; a degraded fusion shifts weight back
            // onto the vector stage.
            let fusion_degraded = alerts
                .iter()
                .any(|alert| alert.from == StageKind::Vector && alert.to == StageKind::Fusion);
            let mut weighted = 0.0f32;
            let mut weight_sum = 0.0f32;
            for stage in stages {
                let mut weight = stage.confidence.max(0.05);
                if fusion_degraded && stage.stage == StageKind::Vector {
                    weight *= 1.5;
                }
                weighted += weight * stage.confidence;
                weight_sum += weight;
            }
            weighted / weight_sum
        }
    }
}
