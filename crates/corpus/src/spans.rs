//! BIO span decoding and span-level F1 between label columns.

use std::collections::HashSet;

use crate::types::{LabelColumn, TaggedSplit};

/// A decoded entity span: token range within a sentence plus entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    /// Index of the first token (inclusive).
    pub start: usize,
    /// Index of the last token (inclusive).
    pub end: usize,
    /// Entity type without the BIO prefix.
    pub kind: String,
}

/// Decode spans from a sequence of BIO tags.
///
/// `B-X` starts a span; `I-X` continues a span of the same type and
/// otherwise starts a new one (lenient decoding, matching common NER
/// evaluation practice). Anything else closes the current span.
pub fn spans_from_bio<S: AsRef<str>>(tags: &[S]) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut open: Option<Span> = None;

    for (i, tag) in tags.iter().enumerate() {
        let tag = tag.as_ref();
        if let Some(kind) = tag.strip_prefix("B-") {
            if let Some(span) = open.take() {
                spans.push(span);
            }
            open = Some(Span {
                start: i,
                end: i,
                kind: kind.to_string(),
            });
        } else if let Some(kind) = tag.strip_prefix("I-") {
            match open.as_mut() {
                Some(span) if span.kind == kind => span.end = i,
                _ => {
                    if let Some(span) = open.take() {
                        spans.push(span);
                    }
                    open = Some(Span {
                        start: i,
                        end: i,
                        kind: kind.to_string(),
                    });
                }
            }
        } else {
            if let Some(span) = open.take() {
                spans.push(span);
            }
        }
    }
    if let Some(span) = open {
        spans.push(span);
    }
    spans
}

/// Micro-averaged span-level precision/recall/F1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub gold_spans: usize,
    pub predicted_spans: usize,
    pub correct_spans: usize,
}

/// Span F1 treating `gold` as reference and `predicted` as hypothesis.
///
/// Spans are matched on exact (sentence, start, end, type). An empty
/// reference with an empty hypothesis scores 1.0.
pub fn span_f1(split: &TaggedSplit, gold: LabelColumn, predicted: LabelColumn) -> SpanScores {
    let mut gold_set: HashSet<(usize, Span)> = HashSet::new();
    let mut pred_set: HashSet<(usize, Span)> = HashSet::new();

    for (si, sentence) in split.sentences.iter().enumerate() {
        let gold_tags: Vec<&str> = sentence.tokens.iter().map(|t| t.label(gold)).collect();
        let pred_tags: Vec<&str> = sentence.tokens.iter().map(|t| t.label(predicted)).collect();
        for span in spans_from_bio(&gold_tags) {
            gold_set.insert((si, span));
        }
        for span in spans_from_bio(&pred_tags) {
            pred_set.insert((si, span));
        }
    }

    let correct = gold_set.intersection(&pred_set).count();
    let (gold_n, pred_n) = (gold_set.len(), pred_set.len());

    let precision = if pred_n == 0 {
        if gold_n == 0 {
            1.0
        } else {
            0.0
        }
    } else {
        correct as f64 / pred_n as f64
    };
    let recall = if gold_n == 0 {
        if pred_n == 0 {
            1.0
        } else {
            0.0
        }
    } else {
        correct as f64 / gold_n as f64
    };
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    SpanScores {
        precision,
        recall,
        f1,
        gold_spans: gold_n,
        predicted_spans: pred_n,
        correct_spans: correct,
    }
}
