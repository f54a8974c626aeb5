//! The trainer seam: a trait producing per-epoch per-token probability
//! outputs, plus a deterministic built-in implementation.
//!
//! The pipeline never talks to a model directly. It drives a
//! [`SequenceTrainer`] one epoch at a time and consumes the per-token
//! probability vectors from [`EpochOutput`]; metric computation, noise
//! modification and scoring all live downstream of this trait.

use corpus::{LabelDict, TaggedSplit};

pub mod lexicon;
pub mod mock;

pub use lexicon::LexiconTagger;
pub use mock::ScriptedTrainer;

/// Per-token outputs of one epoch, in the flat `iter_tokens` order of the
/// split they were produced from.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochOutput {
    /// One probability vector over the label dictionary per token.
    pub probs: Vec<Vec<f64>>,
    /// Per-layer probability matrices (lowest layer first), present only
    /// for early-exit trainers. The last layer equals `probs`.
    pub layer_probs: Option<Vec<Vec<Vec<f64>>>>,
}

impl EpochOutput {
    /// Number of tokens covered by this output.
    pub fn len(&self) -> usize {
        self.probs.len()
    }

    /// Whether the output covers no tokens.
    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    /// Argmax label index per token.
    pub fn predictions(&self) -> Vec<usize> {
        self.probs.iter().map(|p| argmax(p)).collect()
    }
}

pub(crate) fn argmax(probs: &[f64]) -> usize {
    let mut best = 0usize;
    for (i, &p) in probs.iter().enumerate() {
        if p > probs[best] {
            best = i;
        }
    }
    best
}

/// One trainable sequence-labeling model.
///
/// `train_epoch` fits one epoch on the given training split and returns the
/// outputs on that same split; tokens labeled [`corpus::noise::MASK_LABEL`]
/// carry zero loss weight. Implementations must be deterministic for a
/// fixed construction seed.
pub trait SequenceTrainer {
    /// Label dictionary the probability vectors are indexed by.
    fn tagset(&self) -> &LabelDict;

    /// Fit one epoch on `train` and return per-token outputs on it.
    fn train_epoch(&mut self, train: &TaggedSplit) -> anyhow::Result<EpochOutput>;

    /// Outputs on an arbitrary split without updating the model.
    fn predict(&self, split: &TaggedSplit) -> anyhow::Result<EpochOutput>;

    /// Stop updating the encoder; used by the decoder warm-up phase.
    fn freeze_encoder(&mut self) {}

    /// Resume updating the encoder.
    fn unfreeze_encoder(&mut self) {}

    /// Learning rate for subsequent epochs.
    fn set_learning_rate(&mut self, _lr: f64) {}

    /// Reset all learned state, reseeding the model.
    fn reinit(&mut self, seed: u64);
}
