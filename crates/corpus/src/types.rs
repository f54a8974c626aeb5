//! Core data types for tagged corpora.

use std::collections::HashMap;
use std::path::PathBuf;

/// Errors from corpus loading and label handling. All of these are
/// structural and abort the run.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    /// Dataset file could not be read.
    #[error("failed to read corpus file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A token line had an unexpected number of columns.
    #[error("malformed line {line} in {path}: expected 2 or 3 tab-separated columns")]
    MalformedLine { path: PathBuf, line: usize },
    /// A split contained no sentences.
    #[error("corpus file {path} contains no sentences")]
    EmptySplit { path: PathBuf },
    /// A label was requested that is not in the dictionary.
    #[error("label {0:?} is not in the label dictionary")]
    UnknownLabel(String),
}

/// Which label column of a token to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelColumn {
    /// The clean (gold) label.
    Clean,
    /// The observed, possibly noisy, label used for training.
    Observed,
}

/// One labeled token instance.
#[derive(Debug, Clone)]
pub struct Token {
    /// Surface form.
    pub text: String,
    /// Clean (gold) BIO label.
    pub clean: String,
    /// Observed BIO label, mutated in place by noise modifications.
    pub observed: String,
}

impl Token {
    /// Read one of the two label columns.
    pub fn label(&self, column: LabelColumn) -> &str {
        match column {
            LabelColumn::Clean => &self.clean,
            LabelColumn::Observed => &self.observed,
        }
    }

    /// Whether the observed and clean labels disagree.
    pub fn is_noisy(&self) -> bool {
        self.clean != self.observed
    }
}

/// A sentence: a run of tokens between blank lines in the source file.
#[derive(Debug, Clone, Default)]
pub struct Sentence {
    pub tokens: Vec<Token>,
}

impl Sentence {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// One split (train/dev/test) of a corpus.
#[derive(Debug, Clone, Default)]
pub struct TaggedSplit {
    pub sentences: Vec<Sentence>,
}

impl TaggedSplit {
    /// Total number of tokens across all sentences.
    pub fn num_tokens(&self) -> usize {
        self.sentences.iter().map(Sentence::len).sum()
    }

    /// Iterate tokens in flat order (sentence-major), with their
    /// (sentence_index, token_index) coordinates.
    pub fn iter_tokens(&self) -> impl Iterator<Item = (usize, usize, &Token)> {
        self.sentences.iter().enumerate().flat_map(|(si, sent)| {
            sent.tokens
                .iter()
                .enumerate()
                .map(move |(ti, tok)| (si, ti, tok))
        })
    }
}

/// Ordered label dictionary. Index 0 is always "O".
#[derive(Debug, Clone)]
pub struct LabelDict {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelDict {
    /// Build a dictionary from the labels occurring in the given splits.
    /// "O" gets index 0, the rest keep first-occurrence order.
    pub fn from_splits<'a>(splits: impl IntoIterator<Item = &'a TaggedSplit>) -> Self {
        let mut dict = Self {
            labels: vec!["O".to_string()],
            index: HashMap::from([("O".to_string(), 0)]),
        };
        for split in splits {
            for (_, _, token) in split.iter_tokens() {
                dict.add(&token.clean);
                dict.add(&token.observed);
            }
        }
        dict
    }

    /// Add a label if it is not present. Returns its index.
    pub fn add(&mut self, label: &str) -> usize {
        if let Some(&idx) = self.index.get(label) {
            return idx;
        }
        let idx = self.labels.len();
        self.labels.push(label.to_string());
        self.index.insert(label.to_string(), idx);
        idx
    }

    /// Index of a label, or an error if it was never added.
    pub fn idx(&self, label: &str) -> Result<usize, CorpusError> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| CorpusError::UnknownLabel(label.to_string()))
    }

    /// Label at an index. Panics on out-of-range, which indicates a bug.
    pub fn label(&self, idx: usize) -> &str {
        &self.labels[idx]
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// All labels in index order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}
