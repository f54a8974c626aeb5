//! Mock trainer for driver and collector tests.

use std::collections::VecDeque;

use corpus::{LabelDict, TaggedSplit};

use crate::{EpochOutput, SequenceTrainer};

/// Convenience constructor for a single-metric test output.
pub fn make_output(probs: Vec<Vec<f64>>) -> EpochOutput {
    EpochOutput {
        probs,
        layer_probs: None,
    }
}

/// Trainer that replays canned per-epoch outputs.
///
/// `train_epoch` pops the next scripted output; `predict` always returns
/// the configured prediction output. Call counts and reinit seeds are
/// recorded for assertions.
pub struct ScriptedTrainer {
    labels: LabelDict,
    train_outputs: VecDeque<EpochOutput>,
    predict_output: EpochOutput,
    /// Number of `train_epoch` calls so far.
    pub train_calls: u32,
    /// Seeds passed to `reinit`, in order.
    pub reinit_seeds: Vec<u64>,
    /// Whether the encoder is currently frozen.
    pub frozen: bool,
}

impl ScriptedTrainer {
    /// Create a trainer replaying `train_outputs` epoch by epoch.
    pub fn new(
        labels: LabelDict,
        train_outputs: Vec<EpochOutput>,
        predict_output: EpochOutput,
    ) -> Self {
        Self {
            labels,
            train_outputs: train_outputs.into(),
            predict_output,
            train_calls: 0,
            reinit_seeds: Vec::new(),
            frozen: false,
        }
    }

    /// Scripted epochs not yet consumed.
    pub fn remaining_epochs(&self) -> usize {
        self.train_outputs.len()
    }
}

impl SequenceTrainer for ScriptedTrainer {
    fn tagset(&self) -> &LabelDict {
        &self.labels
    }

    fn train_epoch(&mut self, _train: &TaggedSplit) -> anyhow::Result<EpochOutput> {
        self.train_calls += 1;
        self.train_outputs
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("ScriptedTrainer ran out of epochs"))
    }

    fn predict(&self, _split: &TaggedSplit) -> anyhow::Result<EpochOutput> {
        Ok(self.predict_output.clone())
    }

    fn freeze_encoder(&mut self) {
        self.frozen = true;
    }

    fn unfreeze_encoder(&mut self) {
        self.frozen = false;
    }

    fn reinit(&mut self, seed: u64) {
        self.reinit_seeds.push(seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus::{Sentence, TaggedSplit, Token};

    fn tiny_split() -> TaggedSplit {
        TaggedSplit {
            sentences: vec![Sentence {
                tokens: vec![Token {
                    text: "x".to_string(),
                    clean: "O".to_string(),
                    observed: "O".to_string(),
                }],
            }],
        }
    }

    #[test]
    fn test_replays_outputs_in_order() {
        let split = tiny_split();
        let dict = LabelDict::from_splits([&split]);
        let mut trainer = ScriptedTrainer::new(
            dict,
            vec![
                make_output(vec![vec![0.9, 0.1]]),
                make_output(vec![vec![0.2, 0.8]]),
            ],
            make_output(vec![vec![0.5, 0.5]]),
        );

        assert_eq!(trainer.train_epoch(&split).unwrap().probs[0], vec![0.9, 0.1]);
        assert_eq!(trainer.train_epoch(&split).unwrap().probs[0], vec![0.2, 0.8]);
        assert_eq!(trainer.train_calls, 2);
        assert_eq!(trainer.remaining_epochs(), 0);
        assert!(trainer.train_epoch(&split).is_err());
    }

    #[test]
    fn test_records_lifecycle_calls() {
        let split = tiny_split();
        let dict = LabelDict::from_splits([&split]);
        let mut trainer =
            ScriptedTrainer::new(dict, vec![], make_output(vec![vec![1.0]]));

        trainer.freeze_encoder();
        assert!(trainer.frozen);
        trainer.unfreeze_encoder();
        assert!(!trainer.frozen);

        trainer.reinit(13);
        trainer.reinit(17);
        assert_eq!(trainer.reinit_seeds, vec![13, 17]);
    }
}
