//! Accept/reject decisions and adaptive threshold calibration.
//!
//! The threshold lives in cosine-similarity space: a candidate is accepted
//! when its similarity is at least the threshold. Calibration derives a
//! per-identity threshold from the self-similarity of that identity's own
//! enrollment photos.

use crate::types::Embedding;
use serde::{Deserialize, Serialize};

pub const DEFAULT_THRESHOLD: f32 = 0.75;
pub const DEFAULT_CALIBRATION_FLOOR: f32 = 0.5;
pub const DEFAULT_CALIBRATION_MARGIN: f32 = 0.05;

/// Minimum number of embeddings needed to form at least one pair.
const MIN_CALIBRATION_SAMPLES: usize = 2;

/// Decision and calibration parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    /// Used when no adaptive threshold can be derived.
    pub default_threshold: f32,
    /// Lowest threshold calibration may produce.
    pub floor: f32,
    /// Subtracted from the least-similar enrollment pair.
    pub margin: f32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_THRESHOLD,
            floor: DEFAULT_CALIBRATION_FLOOR,
            margin: DEFAULT_CALIBRATION_MARGIN,
        }
    }
}

/// Outcome of a calibration pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Calibration {
    /// Threshold derived from pairwise self-similarity.
    Adaptive {
        threshold: f32,
        samples: usize,
        pairs: usize,
        min_similarity: f32,
        max_similarity: f32,
        mean_similarity: f32,
    },
    /// Fewer than two embeddings: the default threshold applies.
    Fallback { threshold: f32, samples: usize },
}

impl Calibration {
    pub fn threshold(&self) -> f32 {
        match self {
            Calibration::Adaptive { threshold, .. } | Calibration::Fallback { threshold, .. } => {
                *threshold
            }
        }
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, Calibration::Adaptive { .. })
    }

    /// Number of embeddings the calibration was computed over.
    pub fn samples(&self) -> usize {
        match self {
            Calibration::Adaptive { samples, .. } | Calibration::Fallback { samples, .. } => {
                *samples
            }
        }
    }
}

impl MatchPolicy {
    /// Top-1 decision: accept iff the best score reaches the threshold.
    ///
    /// NaN on either side never matches.
    pub fn decide(&self, best_score: f32, threshold: f32) -> bool {
        best_score >= threshold
    }

    /// `max(min(similarities) - margin, floor)`, or `None` for an empty set.
    pub fn threshold_from_similarities(&self, similarities: &[f32]) -> Option<f32> {
        let min = similarities.iter().copied().reduce(f32::min)?;
        Some((min - self.margin).max(self.floor))
    }

    /// Recompute the adaptive threshold over every enrollment embedding of
    /// one identity. Pure function of its input: callers re-run it over the
    /// full photo set whenever a photo is added.
    pub fn recalibrate(&self, embeddings: &[Embedding]) -> Calibration {
        if embeddings.len() < MIN_CALIBRATION_SAMPLES {
            tracing::warn!(
                samples = embeddings.len(),
                threshold = self.default_threshold,
                "calibration undersampled; using default threshold"
            );
            return Calibration::Fallback {
                threshold: self.default_threshold,
                samples: embeddings.len(),
            };
        }

        let similarities = pairwise_similarities(embeddings);
        let Some(threshold) = self.threshold_from_similarities(&similarities) else {
            return Calibration::Fallback {
                threshold: self.default_threshold,
                samples: embeddings.len(),
            };
        };
        let min_similarity = similarities.iter().copied().fold(f32::INFINITY, f32::min);
        let max_similarity = similarities
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        let mean_similarity = similarities.iter().sum::<f32>() / similarities.len() as f32;

        tracing::info!(
            samples = embeddings.len(),
            pairs = similarities.len(),
            min = min_similarity,
            max = max_similarity,
            mean = mean_similarity,
            threshold,
            "adaptive threshold calibrated"
        );

        Calibration::Adaptive {
            threshold,
            samples: embeddings.len(),
            pairs: similarities.len(),
            min_similarity,
            max_similarity,
            mean_similarity,
        }
    }
}

/// Cosine similarity of every unordered pair, in (i, j) order with i < j.
pub fn pairwise_similarities(embeddings: &[Embedding]) -> Vec<f32> {
    let n = embeddings.len();
    let mut out = Vec::with_capacity(n.saturating_sub(1) * n / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            out.push(embeddings[i].similarity(&embeddings[j]));
        }
    }
    out
}
