//! Metric-driven noise modifications of the training split.
//!
//! Tokens are grouped into four categories by whether the baseline model's
//! prediction agrees with the observed label and whether the observed label
//! is "O". A modification selects one category, thresholds a sample metric,
//! and either masks the matching tokens or relabels them with the model's
//! prediction.

use serde::{Deserialize, Serialize};

use crate::types::TaggedSplit;

/// Observed label assigned to masked tokens. Downstream training gives this
/// label zero loss weight.
pub const MASK_LABEL: &str = "B-MASK";

/// Token category: (prediction == observed) x (observed == "O").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Correct prediction, observed is O.
    AgreeOutside,
    /// Incorrect prediction, observed is O.
    DisagreeOutside,
    /// Correct prediction, observed is an entity tag.
    AgreeEntity,
    /// Incorrect prediction, observed is an entity tag.
    DisagreeEntity,
}

impl Category {
    /// Parse the numeric category id used in config files ("1".."4").
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "1" => Some(Self::AgreeOutside),
            "2" => Some(Self::DisagreeOutside),
            "3" => Some(Self::AgreeEntity),
            "4" => Some(Self::DisagreeEntity),
            _ => None,
        }
    }

    /// Numeric id for paths and table headers.
    pub fn id(&self) -> &'static str {
        match self {
            Self::AgreeOutside => "1",
            Self::DisagreeOutside => "2",
            Self::AgreeEntity => "3",
            Self::DisagreeEntity => "4",
        }
    }

    fn conditions(&self) -> (bool, bool) {
        match self {
            Self::AgreeOutside => (true, true),
            Self::DisagreeOutside => (false, true),
            Self::AgreeEntity => (true, false),
            Self::DisagreeEntity => (false, false),
        }
    }

    /// Whether a token with the given agreement/outside status belongs here.
    pub fn matches(&self, prediction_agrees: bool, observed_is_outside: bool) -> bool {
        self.conditions() == (prediction_agrees, observed_is_outside)
    }

    /// Relabeling is only meaningful when the prediction disagrees with the
    /// observed label (categories 2 and 4), where the prediction is the
    /// alternative label.
    pub fn supports_relabel(&self) -> bool {
        matches!(self, Self::DisagreeOutside | Self::DisagreeEntity)
    }
}

/// Which side of the threshold selects a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Select tokens with metric value strictly below the threshold.
    Left,
    /// Select tokens with metric value strictly above the threshold.
    Right,
}

impl Direction {
    fn selects(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Left => value < threshold,
            Self::Right => value > threshold,
        }
    }
}

/// The noise transform applied to selected tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modification {
    /// Replace the observed label with the MASK label.
    Mask,
    /// Replace the observed label with the model's predicted label.
    Relabel,
}

/// A fully resolved modification for one category.
#[derive(Debug, Clone)]
pub struct ModificationSpec {
    pub category: Category,
    pub modification: Modification,
    pub threshold: f64,
    pub direction: Direction,
}

/// Per-token baseline information at the modification epoch: the predicted
/// BIO label and the thresholded metric's value.
#[derive(Debug, Clone)]
pub struct TokenEpochInfo {
    pub predicted: String,
    pub value: f64,
}

/// Counts of labels changed by a modification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModificationOutcome {
    /// Tokens changed by the threshold rule itself.
    pub tokens_changed: usize,
    /// Tokens changed by relabel continuation over the rest of an entity.
    pub tokens_changed_additionally: usize,
}

fn entity_type(tag: &str) -> Option<&str> {
    tag.split_once('-').map(|(_, kind)| kind)
}

/// Apply a modification to the training split in place.
///
/// `view` must be flat-aligned with `split.iter_tokens()` and carries the
/// baseline predictions and metric values at the configured epoch. Already
/// masked tokens are never re-selected.
pub fn apply_modification(
    split: &mut TaggedSplit,
    view: &[TokenEpochInfo],
    spec: &ModificationSpec,
) -> ModificationOutcome {
    debug_assert_eq!(split.num_tokens(), view.len());

    let mut outcome = ModificationOutcome::default();
    let mut flat = 0usize;

    for sentence in &mut split.sentences {
        // Relabel continuation state, reset per sentence.
        let mut prev_label = "O".to_string();
        let mut previous_changed = false;

        for token in &mut sentence.tokens {
            let info = &view[flat];
            flat += 1;

            let already_masked = entity_type(&token.observed) == Some("MASK");
            let agrees = token.observed == info.predicted;
            let outside = token.observed == "O";

            if !already_masked && spec.category.matches(agrees, outside) {
                if spec.direction.selects(info.value, spec.threshold) {
                    match spec.modification {
                        Modification::Mask => token.observed = MASK_LABEL.to_string(),
                        Modification::Relabel => {
                            token.observed = info.predicted.clone();
                            prev_label = info.predicted.clone();
                            previous_changed = true;
                        }
                    }
                    outcome.tokens_changed += 1;
                }
                // A category token failing the threshold does not break a
                // relabeled span in progress.
            } else {
                // Extend a relabeled span over following tokens of the same
                // entity type, when both observed and predicted agree on it.
                let prev_kind = entity_type(&prev_label);
                if spec.modification == Modification::Relabel
                    && previous_changed
                    && prev_kind.is_some()
                    && entity_type(&token.observed) == prev_kind
                    && entity_type(&info.predicted) == prev_kind
                {
                    token.observed = info.predicted.clone();
                    outcome.tokens_changed_additionally += 1;
                } else {
                    previous_changed = false;
                }
            }
        }
    }

    tracing::debug!(
        category = spec.category.id(),
        changed = outcome.tokens_changed,
        changed_additionally = outcome.tokens_changed_additionally,
        "Applied noise modification"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Sentence, Token};

    fn split_of(tokens: Vec<(&str, &str)>) -> TaggedSplit {
        TaggedSplit {
            sentences: vec![Sentence {
                tokens: tokens
                    .into_iter()
                    .map(|(clean, observed)| Token {
                        text: "w".to_string(),
                        clean: clean.to_string(),
                        observed: observed.to_string(),
                    })
                    .collect(),
            }],
        }
    }

    fn info(predicted: &str, value: f64) -> TokenEpochInfo {
        TokenEpochInfo {
            predicted: predicted.to_string(),
            value,
        }
    }

    #[test]
    fn test_category_conditions() {
        assert!(Category::AgreeOutside.matches(true, true));
        assert!(Category::DisagreeOutside.matches(false, true));
        assert!(Category::AgreeEntity.matches(true, false));
        assert!(Category::DisagreeEntity.matches(false, false));
        assert!(!Category::AgreeOutside.matches(false, true));
        assert_eq!(Category::from_id("2"), Some(Category::DisagreeOutside));
        assert_eq!(Category::from_id("5"), None);
    }

    #[test]
    fn test_mask_below_threshold() {
        // Category 4: observed is an entity, prediction disagrees.
        let mut split = split_of(vec![("B-LOC", "B-LOC"), ("O", "B-PER")]);
        let view = vec![info("B-LOC", 0.9), info("O", 0.2)];
        let spec = ModificationSpec {
            category: Category::DisagreeEntity,
            modification: Modification::Mask,
            threshold: 0.5,
            direction: Direction::Left,
        };
        let outcome = apply_modification(&mut split, &view, &spec);
        assert_eq!(outcome.tokens_changed, 1);
        assert_eq!(split.sentences[0].tokens[1].observed, MASK_LABEL);
        // The agreeing token is untouched.
        assert_eq!(split.sentences[0].tokens[0].observed, "B-LOC");
    }

    #[test]
    fn test_direction_right() {
        let mut split = split_of(vec![("O", "B-PER")]);
        let view = vec![info("O", 0.8)];
        let spec = ModificationSpec {
            category: Category::DisagreeEntity,
            modification: Modification::Mask,
            threshold: 0.5,
            direction: Direction::Right,
        };
        let outcome = apply_modification(&mut split, &view, &spec);
        assert_eq!(outcome.tokens_changed, 1);
    }

    #[test]
    fn test_threshold_not_crossed_leaves_labels() {
        let mut split = split_of(vec![("O", "B-PER")]);
        let view = vec![info("O", 0.7)];
        let spec = ModificationSpec {
            category: Category::DisagreeEntity,
            modification: Modification::Mask,
            threshold: 0.5,
            direction: Direction::Left,
        };
        let outcome = apply_modification(&mut split, &view, &spec);
        assert_eq!(outcome.tokens_changed, 0);
        assert_eq!(split.sentences[0].tokens[0].observed, "B-PER");
    }

    #[test]
    fn test_relabel_with_continuation() {
        // First token disagrees (observed B-ORG, predicted B-PER) and is
        // below the threshold, so it is relabeled. The second token agrees
        // with its prediction (I-PER) and shares the relabeled entity type,
        // so the span extension relabels it additionally.
        let mut split = split_of(vec![("B-PER", "B-ORG"), ("I-PER", "I-PER")]);
        let view = vec![info("B-PER", 0.1), info("I-PER", 0.3)];
        let spec = ModificationSpec {
            category: Category::DisagreeEntity,
            modification: Modification::Relabel,
            threshold: 0.5,
            direction: Direction::Left,
        };
        let outcome = apply_modification(&mut split, &view, &spec);
        assert_eq!(outcome.tokens_changed, 1);
        assert_eq!(outcome.tokens_changed_additionally, 1);
        assert_eq!(split.sentences[0].tokens[0].observed, "B-PER");
        assert_eq!(split.sentences[0].tokens[1].observed, "I-PER");
    }

    #[test]
    fn test_relabel_continuation_broken_by_other_type() {
        // Span extension stops when the following token's type differs.
        let mut split = split_of(vec![("B-PER", "B-ORG"), ("I-LOC", "I-LOC")]);
        let view = vec![info("B-PER", 0.1), info("I-LOC", 0.3)];
        let spec = ModificationSpec {
            category: Category::DisagreeEntity,
            modification: Modification::Relabel,
            threshold: 0.5,
            direction: Direction::Left,
        };
        let outcome = apply_modification(&mut split, &view, &spec);
        assert_eq!(outcome.tokens_changed, 1);
        assert_eq!(outcome.tokens_changed_additionally, 0);
        assert_eq!(split.sentences[0].tokens[1].observed, "I-LOC");
    }

    #[test]
    fn test_masked_tokens_never_reselected() {
        let mut split = split_of(vec![("O", MASK_LABEL)]);
        let view = vec![info("O", 0.0)];
        let spec = ModificationSpec {
            category: Category::DisagreeEntity,
            modification: Modification::Mask,
            threshold: 0.5,
            direction: Direction::Left,
        };
        let outcome = apply_modification(&mut split, &view, &spec);
        assert_eq!(outcome.tokens_changed, 0);
    }
}
