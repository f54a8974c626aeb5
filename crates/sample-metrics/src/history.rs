//! The per-token accumulator carried across epochs.

use serde::{Deserialize, Serialize};

/// Accumulated training-dynamics state for one token instance.
///
/// One `TokenHistory` exists per training token and is updated exactly once
/// per completed epoch, in epoch order. All cross-epoch metrics are derived
/// from these running sums, so no per-epoch probability vectors need to be
/// retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHistory {
    /// Argmax label index of the previous epoch. None before the first one.
    pub last_prediction: Option<usize>,
    /// Running sum of p(observed label).
    pub confidence_sum: f64,
    /// Running sum of squared deviations of p(observed) from confidence.
    pub sq_difference_sum: f64,
    /// Number of epochs where argmax == observed.
    pub correctness_sum: u32,
    /// Last epoch (1-based) at which the argmax changed.
    pub last_iteration: u32,
    /// Number of completed epochs recorded so far.
    pub total_epochs: u32,
    /// Count of past argmax predictions per label index.
    pub prediction_counts: Vec<u32>,
    /// Per-epoch correctness flags, oldest first.
    pub correct_flags: Vec<bool>,
}

impl TokenHistory {
    /// Fresh accumulator for a tagset of the given size.
    pub fn new(tagset_size: usize) -> Self {
        Self {
            last_prediction: None,
            confidence_sum: 0.0,
            sq_difference_sum: 0.0,
            correctness_sum: 0,
            last_iteration: 0,
            total_epochs: 0,
            prediction_counts: vec![0; tagset_size],
            correct_flags: Vec::new(),
        }
    }

    /// Number of labels this accumulator was sized for.
    pub fn tagset_size(&self) -> usize {
        self.prediction_counts.len()
    }
}
