//! A deterministic count-based emission tagger.
//!
//! Learns per-word label counts from the observed labels it is trained on.
//! Distributions start close to the label prior and sharpen as counts
//! accumulate over epochs, which gives the per-token metrics realistic
//! training dynamics without an external model.

use std::collections::HashMap;

use corpus::noise::MASK_LABEL;
use corpus::{LabelDict, TaggedSplit};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{EpochOutput, SequenceTrainer};

/// Additive smoothing toward the label prior.
const SMOOTHING: f64 = 1.0;

/// Count-based [`SequenceTrainer`] with optional simulated early-exit
/// layers. Fully determined by its construction seed.
pub struct LexiconTagger {
    labels: LabelDict,
    /// Per-word label counts, the "encoder".
    counts: HashMap<String, Vec<f64>>,
    /// Corpus-level label counts, the "decoder".
    prior: Vec<f64>,
    /// Sub-epsilon per-label jitter for deterministic tie breaking.
    tiebreak: Vec<f64>,
    learning_rate: f64,
    encoder_frozen: bool,
    num_layers: usize,
    epochs_trained: u32,
}

impl LexiconTagger {
    /// Single-layer tagger for standard mode.
    pub fn new(labels: LabelDict, seed: u64, learning_rate: f64) -> Self {
        Self::with_layers(labels, seed, learning_rate, 1)
    }

    /// Multi-layer tagger for EE mode. Lower layers produce flatter
    /// versions of the top-layer distribution.
    pub fn with_layers(labels: LabelDict, seed: u64, learning_rate: f64, num_layers: usize) -> Self {
        assert!(num_layers >= 1, "at least one layer required");
        let tagset = labels.len();
        let mut tagger = Self {
            labels,
            counts: HashMap::new(),
            prior: vec![0.0; tagset],
            tiebreak: Vec::new(),
            learning_rate,
            encoder_frozen: false,
            num_layers,
            epochs_trained: 0,
        };
        tagger.reseed(seed);
        tagger
    }

    /// Number of epochs fitted so far.
    pub fn epochs_trained(&self) -> u32 {
        self.epochs_trained
    }

    fn reseed(&mut self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        self.tiebreak = (0..self.labels.len())
            .map(|_| rng.gen_range(0.0..1e-9))
            .collect();
    }

    /// Smoothed distribution over labels for one word.
    fn distribution(&self, word: &str) -> Vec<f64> {
        let tagset = self.labels.len();
        let prior_total: f64 = self.prior.iter().sum();
        let empty;
        let word_counts = match self.counts.get(word) {
            Some(c) => c,
            None => {
                empty = vec![0.0; tagset];
                &empty
            }
        };

        let mut scores: Vec<f64> = (0..tagset)
            .map(|i| {
                let prior = if prior_total > 0.0 {
                    self.prior[i] / prior_total
                } else {
                    1.0 / tagset as f64
                };
                word_counts[i] + SMOOTHING * prior + self.tiebreak[i]
            })
            .collect();
        let total: f64 = scores.iter().sum();
        for s in &mut scores {
            *s /= total;
        }
        scores
    }

    fn output_for(&self, split: &TaggedSplit) -> anyhow::Result<EpochOutput> {
        let mut probs = Vec::with_capacity(split.num_tokens());
        for (_, _, token) in split.iter_tokens() {
            probs.push(self.distribution(&token.text));
        }

        let layer_probs = if self.num_layers > 1 {
            let tagset = self.labels.len() as f64;
            let layers: Vec<Vec<Vec<f64>>> = probs
                .iter()
                .map(|p| {
                    (0..self.num_layers)
                        .map(|layer| {
                            let weight = (layer + 1) as f64 / self.num_layers as f64;
                            p.iter()
                                .map(|&v| weight * v + (1.0 - weight) / tagset)
                                .collect()
                        })
                        .collect()
                })
                .collect();
            Some(layers)
        } else {
            None
        };

        Ok(EpochOutput { probs, layer_probs })
    }
}

impl SequenceTrainer for LexiconTagger {
    fn tagset(&self) -> &LabelDict {
        &self.labels
    }

    fn train_epoch(&mut self, train: &TaggedSplit) -> anyhow::Result<EpochOutput> {
        for (_, _, token) in train.iter_tokens() {
            // Masked tokens carry zero loss weight.
            if token.observed == MASK_LABEL {
                continue;
            }
            let idx = self.labels.idx(&token.observed)?;
            self.prior[idx] += self.learning_rate;
            if !self.encoder_frozen {
                let counts = self
                    .counts
                    .entry(token.text.clone())
                    .or_insert_with(|| vec![0.0; self.labels.len()]);
                counts[idx] += self.learning_rate;
            }
        }
        self.epochs_trained += 1;
        tracing::debug!(
            epoch = self.epochs_trained,
            words = self.counts.len(),
            frozen = self.encoder_frozen,
            "Fitted lexicon epoch"
        );
        self.output_for(train)
    }

    fn predict(&self, split: &TaggedSplit) -> anyhow::Result<EpochOutput> {
        self.output_for(split)
    }

    fn freeze_encoder(&mut self) {
        self.encoder_frozen = true;
    }

    fn unfreeze_encoder(&mut self) {
        self.encoder_frozen = false;
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn reinit(&mut self, seed: u64) {
        self.counts.clear();
        self.prior = vec![0.0; self.labels.len()];
        self.encoder_frozen = false;
        self.epochs_trained = 0;
        self.reseed(seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus::{Sentence, Token};

    fn make_token(text: &str, label: &str) -> Token {
        Token {
            text: text.to_string(),
            clean: label.to_string(),
            observed: label.to_string(),
        }
    }

    fn make_split() -> TaggedSplit {
        TaggedSplit {
            sentences: vec![
                Sentence {
                    tokens: vec![
                        make_token("John", "B-PER"),
                        make_token("visited", "O"),
                        make_token("Berlin", "B-LOC"),
                    ],
                },
                Sentence {
                    tokens: vec![
                        make_token("John", "B-PER"),
                        make_token("left", "O"),
                        make_token("home", "O"),
                    ],
                },
            ],
        }
    }

    fn make_dict(split: &TaggedSplit) -> LabelDict {
        LabelDict::from_splits([split])
    }

    #[test]
    fn test_probabilities_are_normalized() {
        let split = make_split();
        let mut tagger = LexiconTagger::new(make_dict(&split), 13, 0.1);
        let output = tagger.train_epoch(&split).unwrap();
        assert_eq!(output.len(), 6);
        for p in &output.probs {
            let sum: f64 = p.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
            assert!(p.iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let split = make_split();
        let mut a = LexiconTagger::new(make_dict(&split), 42, 0.1);
        let mut b = LexiconTagger::new(make_dict(&split), 42, 0.1);
        for _ in 0..3 {
            assert_eq!(a.train_epoch(&split).unwrap(), b.train_epoch(&split).unwrap());
        }
    }

    #[test]
    fn test_distributions_sharpen_over_epochs() {
        let split = make_split();
        let dict = make_dict(&split);
        let per = dict.idx("B-PER").unwrap();
        let mut tagger = LexiconTagger::new(dict, 7, 0.5);

        let first = tagger.train_epoch(&split).unwrap().probs[0][per];
        let mut last = first;
        for _ in 0..4 {
            last = tagger.train_epoch(&split).unwrap().probs[0][per];
        }
        assert!(last > first);
    }

    #[test]
    fn test_learns_majority_label_per_word() {
        let split = make_split();
        let dict = make_dict(&split);
        let per = dict.idx("B-PER").unwrap();
        let mut tagger = LexiconTagger::new(dict, 7, 1.0);
        let mut output = tagger.train_epoch(&split).unwrap();
        for _ in 0..3 {
            output = tagger.train_epoch(&split).unwrap();
        }
        // "John" appears twice as B-PER.
        assert_eq!(output.predictions()[0], per);
        assert_eq!(output.predictions()[3], per);
    }

    #[test]
    fn test_masked_tokens_are_not_learned() {
        let mut split = make_split();
        let mut dict = make_dict(&split);
        dict.add(MASK_LABEL);
        split.sentences[0].tokens[0].observed = MASK_LABEL.to_string();

        let mut tagger = LexiconTagger::new(dict.clone(), 7, 1.0);
        for _ in 0..5 {
            tagger.train_epoch(&split).unwrap();
        }
        let output = tagger.predict(&split).unwrap();
        let mask = dict.idx(MASK_LABEL).unwrap();
        let per = dict.idx("B-PER").unwrap();
        // "John" in the second sentence still trains as B-PER; nothing
        // ever predicts the mask label.
        assert_eq!(output.predictions()[3], per);
        assert!(output.predictions().iter().all(|&p| p != mask));
    }

    #[test]
    fn test_frozen_encoder_keeps_word_counts() {
        let split = make_split();
        let dict = make_dict(&split);
        let mut tagger = LexiconTagger::new(dict, 7, 1.0);
        tagger.freeze_encoder();
        tagger.train_epoch(&split).unwrap();
        assert!(tagger.counts.is_empty());
        tagger.unfreeze_encoder();
        tagger.train_epoch(&split).unwrap();
        assert!(!tagger.counts.is_empty());
    }

    #[test]
    fn test_reinit_resets_learned_state() {
        let split = make_split();
        let dict = make_dict(&split);
        let mut a = LexiconTagger::new(dict.clone(), 3, 0.1);
        let mut b = LexiconTagger::new(dict, 3, 0.1);

        a.train_epoch(&split).unwrap();
        a.train_epoch(&split).unwrap();
        a.reinit(3);
        assert_eq!(a.epochs_trained(), 0);
        assert_eq!(a.train_epoch(&split).unwrap(), b.train_epoch(&split).unwrap());
    }

    #[test]
    fn test_ee_layers_flatten_toward_bottom() {
        let split = make_split();
        let dict = make_dict(&split);
        let mut tagger = LexiconTagger::with_layers(dict, 11, 1.0, 4);
        let output = tagger.train_epoch(&split).unwrap();
        let layers = output.layer_probs.as_ref().unwrap();
        assert_eq!(layers.len(), output.len());

        for (token, token_layers) in layers.iter().enumerate() {
            assert_eq!(token_layers.len(), 4);
            // Top layer is exactly the final distribution.
            for (a, b) in token_layers[3].iter().zip(&output.probs[token]) {
                assert!((a - b).abs() < 1e-12);
            }
            // Lower layers are closer to uniform: max probability shrinks.
            let max_of = |p: &Vec<f64>| p.iter().cloned().fold(f64::MIN, f64::max);
            assert!(max_of(&token_layers[0]) <= max_of(&token_layers[3]) + 1e-12);
        }
    }

    #[test]
    fn test_predict_handles_unseen_words() {
        let split = make_split();
        let dict = make_dict(&split);
        let o = dict.idx("O").unwrap();
        let mut tagger = LexiconTagger::new(dict, 5, 1.0);
        for _ in 0..3 {
            tagger.train_epoch(&split).unwrap();
        }

        let dev = TaggedSplit {
            sentences: vec![Sentence {
                tokens: vec![make_token("unseen", "O")],
            }],
        };
        let output = tagger.predict(&dev).unwrap();
        // Unknown words fall back to the label prior; "O" dominates it.
        assert_eq!(output.predictions(), vec![o]);
    }
}
