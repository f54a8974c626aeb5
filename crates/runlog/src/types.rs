//! Row and result types for experiment runs.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// One row of a per-run metric table: one token at one epoch.
///
/// `values` is aligned with the metric column list the table was created
/// with, in the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    /// Sentence index within the training split.
    pub sent_index: u32,
    /// Token index within the sentence.
    pub token_index: u32,
    /// 1-based epoch this row was logged after. Epoch 0 is reserved for
    /// the decoder warm-up pass of early-exit runs.
    pub epoch: u32,
    /// Token surface form.
    pub text: String,
    /// Label the model was trained on at this epoch.
    pub observed: String,
    /// Gold label.
    pub clean: String,
    /// Argmax prediction at this epoch.
    pub predicted: String,
    /// Whether observed differed from clean when the run started.
    pub noisy: bool,
    /// Metric values, one per configured metric column.
    pub values: Vec<f64>,
}

/// Parameters of the noise modification applied in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationParams {
    /// "mask" or "relabel".
    pub modification: String,
    /// Metric driving the selection.
    pub metric: String,
    pub threshold: f64,
    /// "left" or "right" of the threshold.
    pub direction: String,
    /// Baseline epoch whose metric values drive the selection.
    pub epoch_change: u32,
    /// Category ids ("1".."4") the selection applies to.
    pub categories: Vec<String>,
}

impl ModificationParams {
    /// Stable label used in run ids and output paths.
    pub fn label(&self) -> String {
        format!(
            "{}_{}_{}_th{}_ep{}_cat{}",
            self.modification,
            self.metric,
            self.direction,
            self.threshold,
            self.epoch_change,
            self.categories.join(".")
        )
    }
}

/// Span F1 on the dev and test splits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScorePair {
    pub dev_f1: f64,
    pub test_f1: f64,
}

/// Outcome of one (corpus, modification, seed, mode) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub corpus: String,
    /// "standard" or "EE".
    pub mode: String,
    pub seed: u64,
    /// ISO 8601 timestamp of when the run finished.
    pub timestamp: String,
    /// Epochs per training phase.
    pub num_epochs: u32,
    /// None for baseline-only runs.
    pub modification: Option<ModificationParams>,
    /// Tokens changed by the category/threshold selection.
    pub tokens_changed: u64,
    /// Tokens changed by span continuation on top of the selection.
    pub tokens_changed_additionally: u64,
    /// Span F1 of the modified training labels against the clean ones,
    /// measured right after the modification. None for baseline-only runs.
    pub noise_share_f1: Option<f64>,
    /// Path of this run's Parquet metric table, relative to the results dir.
    pub metric_table: String,
    /// Scores after the baseline phase.
    pub baseline: ScorePair,
    /// Scores after retraining on the modified corpus, if a modification ran.
    pub retrained: Option<ScorePair>,
}

impl RunResult {
    /// Stable identifier, unique within one experiment.
    pub fn run_id(&self) -> String {
        let mod_label = self
            .modification
            .as_ref()
            .map_or_else(|| "baseline".to_string(), ModificationParams::label);
        format!("{}_{}_{}_seed{}", self.corpus, self.mode, mod_label, self.seed)
    }

    /// Write the result as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(run = %self.run_id(), path = %path.display(), "Wrote run result");
        Ok(())
    }

    /// Load a result from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let result = serde_json::from_str(&contents)?;
        Ok(result)
    }

    /// Load every `*.json` run result directly under `dir`. Files that do
    /// not parse as run results are skipped with a warning.
    pub fn load_dir(dir: &Path) -> anyhow::Result<Vec<Self>> {
        let mut results = Vec::new();
        if !dir.exists() {
            return Ok(results);
        }
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();
        for path in entries {
            match Self::load(&path) {
                Ok(result) => results.push(result),
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "Skipping unreadable result file");
                }
            }
        }
        Ok(results)
    }
}

/// Mean and population standard deviation. Returns (0.0, 0.0) for empty input.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
