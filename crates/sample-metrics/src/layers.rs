//! Early-exit metrics over per-layer probability distributions.

use crate::compute::{validate_probs, MetricError};
use crate::name::MetricName;

/// Layer metrics for one token at one epoch, derived from the per-layer
/// argmax predictions of an early-exit model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerMetrics {
    /// Prediction depth: index of the lowest layer from which every layer
    /// up to the top agrees with the top layer. 0 when all layers agree.
    pub prediction_depth: f64,
    /// Index of the lowest layer whose argmax is the observed label,
    /// `n_layers` when no layer predicts it.
    pub first_layer: f64,
    /// Number of layers whose argmax is the observed label.
    pub total_agree_correct: f64,
    /// Number of layers whose argmax matches the top layer.
    pub total_agree_last: f64,
    /// Entropy of the per-layer argmax histogram. 0 when all layers agree.
    pub layer_entropy: f64,
}

impl LayerMetrics {
    pub fn value(&self, name: MetricName) -> Option<f64> {
        Some(match name {
            MetricName::PredictionDepth => self.prediction_depth,
            MetricName::FirstLayer => self.first_layer,
            MetricName::TotalAgreeCorrect => self.total_agree_correct,
            MetricName::TotalAgreeLast => self.total_agree_last,
            MetricName::LayerEntropy => self.layer_entropy,
            _ => return None,
        })
    }
}

fn argmax(probs: &[f64]) -> usize {
    let mut best = 0usize;
    for (i, &p) in probs.iter().enumerate() {
        if p > probs[best] {
            best = i;
        }
    }
    best
}

/// Compute the layer metrics for one token from its per-layer probability
/// vectors, ordered lowest layer first. Every row must be a distribution
/// over `tagset_size` labels and at least one layer is required.
pub fn layer_metrics(
    layer_probs: &[Vec<f64>],
    observed: usize,
    tagset_size: usize,
) -> Result<LayerMetrics, MetricError> {
    if layer_probs.is_empty() {
        return Err(MetricError::WrongDimension {
            expected: tagset_size,
            got: 0,
        });
    }
    for probs in layer_probs {
        validate_probs(probs, tagset_size)?;
    }

    let n_layers = layer_probs.len();
    let predictions: Vec<usize> = layer_probs.iter().map(|p| argmax(p)).collect();
    let last = predictions[n_layers - 1];

    let mut counts = vec![0u32; tagset_size];
    for &p in &predictions {
        counts[p] += 1;
    }
    let layer_entropy: f64 = counts
        .iter()
        .map(|&c| {
            let f = f64::from(c) / n_layers as f64;
            if f > 0.0 {
                -f * f.ln()
            } else {
                0.0
            }
        })
        .sum();

    let mut prediction_depth = n_layers;
    let mut depth_settled = false;
    let mut first_layer = n_layers;
    let mut total_agree_correct = 0usize;
    let mut total_agree_last = 0usize;

    // Walk from the top layer down; depth stops decreasing at the first
    // layer that disagrees with the top.
    for i in (0..n_layers).rev() {
        if predictions[i] == observed {
            first_layer = i;
            total_agree_correct += 1;
        }
        if predictions[i] == last {
            if !depth_settled {
                prediction_depth -= 1;
            }
            total_agree_last += 1;
        } else {
            depth_settled = true;
        }
    }

    Ok(LayerMetrics {
        prediction_depth: prediction_depth as f64,
        first_layer: first_layer as f64,
        total_agree_correct: total_agree_correct as f64,
        total_agree_last: total_agree_last as f64,
        layer_entropy,
    })
}
