//! Column-format tagged corpora for label-noise experiments.
//!
//! Loads token-per-line TSV corpora with a clean and an observed (possibly
//! noisy) label column, decodes BIO spans, scores span-level F1 between any
//! two label columns, and applies metric-driven noise modifications
//! (mask / relabel) to the training split.

pub mod loader;
pub mod noise;
pub mod spans;
pub mod types;

pub use loader::{load_split, write_split, CorpusPaths, TaggedCorpus};
pub use noise::{
    apply_modification, Category, Direction, Modification, ModificationOutcome, ModificationSpec,
    TokenEpochInfo,
};
pub use spans::{span_f1, spans_from_bio, Span, SpanScores};
pub use types::{CorpusError, LabelColumn, LabelDict, Sentence, TaggedSplit, Token};
