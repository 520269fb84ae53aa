//! Score normalization with safe fallbacks
//!
//! Both degenerate cases (single-element list, constant list) resolve to
//! 0.5 so that downstream weighting never divides by a zero range.

use retrieval_config::NormalizationName;

/// Normalization scheme. `MinMax` maps into [0, 1]; `ZScore` centers on the
/// mean; `None` passes scores through (rank-dominated strategies use it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    MinMax,
    ZScore,
    None,
}

impl From<NormalizationName> for Normalization {
    fn from(name: NormalizationName) -> Self {
        match name {
            NormalizationName::MinMax => Normalization::MinMax,
            NormalizationName::ZScore => Normalization::ZScore,
            NormalizationName::None => Normalization::None,
        }
    }
}

const DEGENERATE_FALLBACK: f32 = 0.5;

/// Normalize a score list under the chosen scheme.
pub fn normalize(scores: &[f32], scheme: Normalization) -> Vec<f32> {
    match scheme {
        Normalization::None => scores.to_vec(),
        Normalization::MinMax => min_max(scores),
        Normalization::ZScore => z_score(scores),
    }
}

fn min_max(scores: &[f32]) -> Vec<f32> {
    if scores.len() <= 1 {
        return scores.iter().map(|_| DEGENERATE_FALLBACK).collect();
    }
    let min = scores.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range <= f32::EPSILON {
        return scores.iter().map(|_| DEGENERATE_FALLBACK).collect();
    }
    scores.iter().map(|score| (score - min) / range).collect()
}

fn z_score(scores: &[f32]) -> Vec<f32> {
    if scores.len() <= 1 {
        return scores.iter().map(|_| DEGENERATE_FALLBACK).collect();
    }
    let mean = scores.iter().sum::<f32>() / scores.len() as f32;
    let variance =
        scores.iter().map(|score| (score - mean).powi(2)).sum::<f32>() / scores.len() as f32;
    let std_dev = variance.sqrt();
    if std_dev <= f32::EPSILON {
        return scores.iter().map(|_| DEGENERATE_FALLBACK).collect();
    }
    scores.iter().map(|score| (score - mean) / std_dev).collect()
}
