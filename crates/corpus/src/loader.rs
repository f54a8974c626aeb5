//! Reading and writing token-per-line TSV corpora.
//!
//! Each line is `token<TAB>clean<TAB>observed`; two-column files carry a
//! single label used for both columns. Sentences are separated by blank
//! lines and `-DOCSTART-` document markers are skipped.

use std::path::{Path, PathBuf};

use crate::types::{CorpusError, LabelColumn, Sentence, TaggedSplit, Token};

const DOCSTART: &str = "-DOCSTART-";

/// Paths to the three splits of one corpus.
#[derive(Debug, Clone)]
pub struct CorpusPaths {
    pub train: PathBuf,
    pub dev: PathBuf,
    pub test: PathBuf,
}

/// A fully loaded corpus.
#[derive(Debug, Clone)]
pub struct TaggedCorpus {
    pub train: TaggedSplit,
    pub dev: TaggedSplit,
    pub test: TaggedSplit,
}

impl TaggedCorpus {
    /// Load train/dev/test splits from disk.
    pub fn load(paths: &CorpusPaths) -> Result<Self, CorpusError> {
        let train = load_split(&paths.train)?;
        let dev = load_split(&paths.dev)?;
        let test = load_split(&paths.test)?;
        tracing::info!(
            train_sentences = train.sentences.len(),
            dev_sentences = dev.sentences.len(),
            test_sentences = test.sentences.len(),
            train = %paths.train.display(),
            "Loaded corpus"
        );
        Ok(Self { train, dev, test })
    }
}

/// Load one split from a TSV file.
pub fn load_split(path: &Path) -> Result<TaggedSplit, CorpusError> {
    let contents = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut sentences = Vec::new();
    let mut current = Sentence::default();

    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            if !current.is_empty() {
                sentences.push(std::mem::take(&mut current));
            }
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields[0] == DOCSTART {
            if !current.is_empty() {
                sentences.push(std::mem::take(&mut current));
            }
            continue;
        }

        let token = match fields.as_slice() {
            [text, label] => Token {
                text: text.to_string(),
                clean: normalize_bio(label),
                observed: normalize_bio(label),
            },
            [text, clean, observed] => Token {
                text: text.to_string(),
                clean: normalize_bio(clean),
                observed: normalize_bio(observed),
            },
            _ => {
                return Err(CorpusError::MalformedLine {
                    path: path.to_path_buf(),
                    line: line_no + 1,
                })
            }
        };
        current.tokens.push(token);
    }
    if !current.is_empty() {
        sentences.push(current);
    }

    if sentences.is_empty() {
        return Err(CorpusError::EmptySplit {
            path: path.to_path_buf(),
        });
    }

    Ok(TaggedSplit { sentences })
}

/// Write one label column of a split back to a TSV file, creating parent
/// directories as needed.
pub fn write_split(
    split: &TaggedSplit,
    column: LabelColumn,
    path: &Path,
) -> Result<(), CorpusError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let mut out = String::new();
    for sentence in &split.sentences {
        for token in &sentence.tokens {
            out.push_str(&token.text);
            out.push('\t');
            out.push_str(token.label(column));
            out.push('\n');
        }
        out.push('\n');
    }

    std::fs::write(path, out).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Map BIOES prefixes onto plain BIO (S- becomes B-, E- becomes I-).
fn normalize_bio(label: &str) -> String {
    if let Some(rest) = label.strip_prefix("S-") {
        format!("B-{rest}")
    } else if let Some(rest) = label.strip_prefix("E-") {
        format!("I-{rest}")
    } else {
        label.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_three_column_split() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(
            &tmp,
            "train.tsv",
            "Paris\tB-LOC\tB-ORG\nis\tO\tO\n\nBerlin\tB-LOC\tB-LOC\n",
        );
        let split = load_split(&path).unwrap();
        assert_eq!(split.sentences.len(), 2);
        assert_eq!(split.sentences[0].tokens[0].clean, "B-LOC");
        assert_eq!(split.sentences[0].tokens[0].observed, "B-ORG");
        assert!(split.sentences[0].tokens[0].is_noisy());
        assert!(!split.sentences[1].tokens[0].is_noisy());
    }

    #[test]
    fn test_load_two_column_split_duplicates_label() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "dev.tsv", "Paris\tB-LOC\n");
        let split = load_split(&path).unwrap();
        let token = &split.sentences[0].tokens[0];
        assert_eq!(token.clean, "B-LOC");
        assert_eq!(token.observed, "B-LOC");
    }

    #[test]
    fn test_docstart_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "train.tsv", "-DOCSTART-\tO\n\nParis\tB-LOC\n");
        let split = load_split(&path).unwrap();
        assert_eq!(split.sentences.len(), 1);
        assert_eq!(split.sentences[0].tokens[0].text, "Paris");
    }

    #[test]
    fn test_bioes_normalized_on_load() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "t.tsv", "Paris\tS-LOC\nSaint\tB-LOC\nDenis\tE-LOC\n");
        let split = load_split(&path).unwrap();
        let labels: Vec<&str> = split.sentences[0]
            .tokens
            .iter()
            .map(|t| t.clean.as_str())
            .collect();
        assert_eq!(labels, vec!["B-LOC", "B-LOC", "I-LOC"]);
    }

    #[test]
    fn test_malformed_line_errors() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "bad.tsv", "Paris\tB-LOC\tO\textra\n");
        let err = load_split(&path).unwrap_err();
        assert!(matches!(err, CorpusError::MalformedLine { line: 1, .. }));
    }

    #[test]
    fn test_empty_split_errors() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "empty.tsv", "\n\n");
        assert!(matches!(
            load_split(&path).unwrap_err(),
            CorpusError::EmptySplit { .. }
        ));
    }

    #[test]
    fn test_missing_file_errors() {
        let tmp = TempDir::new().unwrap();
        let err = load_split(&tmp.path().join("nope.tsv")).unwrap_err();
        assert!(matches!(err, CorpusError::Io { .. }));
    }

    #[test]
    fn test_write_then_reload_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "t.tsv", "Paris\tB-LOC\tO\nis\tO\tO\n");
        let split = load_split(&path).unwrap();

        let out = tmp.path().join("nested/out.tsv");
        write_split(&split, LabelColumn::Observed, &out).unwrap();
        let reloaded = load_split(&out).unwrap();
        assert_eq!(reloaded.sentences[0].tokens[0].observed, "O");
        assert_eq!(reloaded.num_tokens(), 2);
    }
}
