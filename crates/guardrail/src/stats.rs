//! Score distribution statistics

use serde::{Deserialize, Serialize};

/// Summary statistics over a score list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreStats {
    pub mean: f32,
    pub max: f32,
    pub min: f32,
    pub std_dev: f32,
    pub count: usize,
    /// p25 / p50 / p75 / p90
    pub percentiles: [f32; 4],
}

impl ScoreStats {
    /// Compute stats over the scores. An empty list yields all zeros.
    pub fn from_scores(scores: &[f32]) -> Self {
        let finite: Vec<f32> = scores.iter().copied().filter(|s| s.is_finite()).collect();
        if finite.is_empty() {
            return Self::default();
        }

        let count = finite.len();
        let mean = finite.iter().sum::<f32>() / count as f32;
        let max = finite.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let min = finite.iter().cloned().fold(f32::INFINITY, f32::min);
        let variance =
            finite.iter().map(|score| (score - mean).powi(2)).sum::<f32>() / count as f32;
        let std_dev = variance.sqrt();

        let mut sorted = finite;
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let percentile = |p: f32| {
            let rank = (p * (sorted.len() - 1) as f32).round() as usize;
            sorted[rank.min(sorted.len() - 1)]
        };

        Self {
            mean,
            max,
            min,
            std_dev,
            count,
            percentiles: [
                percentile(0.25),
                percentile(0.50),
                percentile(0.75),
                percentile(0.90),
            ],
        }
    }

    /// Spread-based consistency in [0, 1]: tight distributions score high.
    pub fn consistency(&self) -> f32 {
        (1.0 - self.std_dev).clamp(0.0, 1.0)
    }
}
