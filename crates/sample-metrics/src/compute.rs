//! Metric computation for one token at one epoch boundary.

use crate::history::TokenHistory;
use crate::name::MetricName;

/// A malformed probability vector for a single token/epoch. The caller logs
/// and skips the record; the run continues.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MetricError {
    /// Probability vector length does not match the tagset size.
    #[error("probability vector has {got} entries, expected {expected}")]
    WrongDimension { expected: usize, got: usize },
    /// A probability is outside [0, 1] or not a number.
    #[error("probability at index {index} is {value}, outside [0, 1]")]
    OutOfRange { index: usize, value: f64 },
    /// The observed label index does not address the probability vector.
    #[error("observed label index {got} out of range for tagset of {expected}")]
    LabelOutOfRange { expected: usize, got: usize },
}

/// Check that `probs` is a well-formed distribution over `tagset_size`
/// labels. Values must lie in [0, 1]; the vector is not required to sum to
/// exactly 1 (model output may be truncated).
pub fn validate_probs(probs: &[f64], tagset_size: usize) -> Result<(), MetricError> {
    if probs.len() != tagset_size {
        return Err(MetricError::WrongDimension {
            expected: tagset_size,
            got: probs.len(),
        });
    }
    for (index, &value) in probs.iter().enumerate() {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(MetricError::OutOfRange { index, value });
        }
    }
    Ok(())
}

/// All standard metric values for one token at one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSignals {
    /// Argmax label index of this epoch.
    pub prediction: usize,
    pub msp: f64,
    pub bvsb: f64,
    pub entropy: f64,
    pub cross_entropy: f64,
    pub confidence: f64,
    pub variability: f64,
    pub correctness: f64,
    pub iter_norm: f64,
    pub pehist: f64,
    pub mild: f64,
    pub mild_m: f64,
    pub mild_f: f64,
}

impl SampleSignals {
    /// Value of a standard metric. Layer metrics live in
    /// [`crate::layers::LayerMetrics`] and return None here.
    pub fn value(&self, name: MetricName) -> Option<f64> {
        Some(match name {
            MetricName::Msp => self.msp,
            MetricName::Bvsb => self.bvsb,
            MetricName::Entropy => self.entropy,
            MetricName::CrossEntropy => self.cross_entropy,
            MetricName::Confidence => self.confidence,
            MetricName::Variability => self.variability,
            MetricName::Correctness => self.correctness,
            MetricName::IterNorm => self.iter_norm,
            MetricName::Pehist => self.pehist,
            MetricName::Mild => self.mild,
            MetricName::MildM => self.mild_m,
            MetricName::MildF => self.mild_f,
            _ => return None,
        })
    }
}

fn argmax_top2(probs: &[f64]) -> (usize, f64) {
    let mut best = 0usize;
    for (i, &p) in probs.iter().enumerate() {
        if p > probs[best] {
            best = i;
        }
    }
    let mut second = 0.0f64;
    for (i, &p) in probs.iter().enumerate() {
        if i != best && p > second {
            second = p;
        }
    }
    (best, second)
}

/// Total length of runs of `target` in the per-epoch correctness flags.
/// A memorization episode is a maximal run of incorrect epochs, a
/// forgetting episode a maximal run of correct ones.
fn episode_length(flags: &[bool], target: bool) -> f64 {
    flags.iter().filter(|&&f| f == target).count() as f64
}

/// Compute all standard metrics for one token and fold this epoch into its
/// accumulator.
///
/// The accumulator must be updated exactly once per epoch, in order; the
/// caller enforces that. A fresh accumulator is the defined epoch-0
/// default: confidence equals p(observed), variability is 0, iter_norm
/// is 1, pehist is 0.
pub fn compute_metrics(
    history: &mut TokenHistory,
    probs: &[f64],
    observed: usize,
) -> Result<SampleSignals, MetricError> {
    validate_probs(probs, history.tagset_size())?;
    if observed >= probs.len() {
        return Err(MetricError::LabelOutOfRange {
            expected: probs.len(),
            got: observed,
        });
    }

    let (prediction, p_second) = argmax_top2(probs);
    let p_pred = probs[prediction];
    let p_true = probs[observed];

    history.total_epochs += 1;
    let total = f64::from(history.total_epochs);

    let msp = p_pred;
    let bvsb = p_pred - p_second;

    history.confidence_sum += p_true;
    let confidence = history.confidence_sum / total;

    history.sq_difference_sum += (p_true - confidence).powi(2);
    let variability = (history.sq_difference_sum / total).sqrt();

    let correct = prediction == observed;
    history.correctness_sum += u32::from(correct);
    let correctness = f64::from(history.correctness_sum) / total;

    let prediction_changed = history.last_prediction != Some(prediction);
    if prediction_changed {
        history.last_iteration = history.total_epochs;
    }
    history.last_prediction = Some(prediction);
    let iter_norm = f64::from(history.last_iteration) / total;

    history.prediction_counts[prediction] += 1;
    let max_certainty = (history.tagset_size() as f64).ln();
    let pehist = if max_certainty > 0.0 {
        let raw: f64 = history
            .prediction_counts
            .iter()
            .map(|&c| {
                let f = f64::from(c) / total;
                if f > 0.0 {
                    -f * f.ln()
                } else {
                    0.0
                }
            })
            .sum();
        raw / max_certainty
    } else {
        0.0
    };

    history.correct_flags.push(correct);
    let mild_m = episode_length(&history.correct_flags, false);
    let mild_f = episode_length(&history.correct_flags, true);
    let mild = mild_m - mild_f;

    let entropy: f64 = probs
        .iter()
        .map(|&p| if p > 0.0 { -p * p.ln() } else { 0.0 })
        .sum();

    let cross_entropy = (-p_true.ln()).min(f64::MAX);

    Ok(SampleSignals {
        prediction,
        msp,
        bvsb,
        entropy,
        cross_entropy,
        confidence,
        variability,
        correctness,
        iter_norm,
        pehist,
        mild,
        mild_m,
        mild_f,
    })
}
