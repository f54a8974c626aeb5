//! JSON experiment config loading and validation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use corpus::{Category, Direction, Modification};
use sample_metrics::{MetricName, Mode};
use serde::{Deserialize, Deserializer};

/// Top-level experiment descriptor. Immutable once loaded and validated.
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub experiment_name: String,
    pub paths: PathsConfig,
    pub parameters: ParametersConfig,
    /// Token categories to modify, as "category1".."category4".
    pub categories: Vec<String>,
    /// Corpus names the experiment corpora derive from. Accepted for
    /// config-format compatibility; baselines are trained per entry in
    /// `corpora`.
    pub source_corpora: Vec<String>,
    /// Corpora the modification experiments run on.
    pub corpora: Vec<String>,
    /// Which modification kinds are enabled for this experiment.
    pub modifications: Vec<Modification>,
    pub seeds: Vec<u64>,
    /// Mode name → ordered metric-name list logged in that mode.
    pub sample_metrics: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub plot_histograms: bool,
    #[serde(default)]
    pub only_best_parameter_sets: bool,
    #[serde(default)]
    pub only_results_summarization: bool,
}

/// Filesystem layout of datasets and outputs.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    pub data_path: PathBuf,
    pub resources_path: PathBuf,
    pub results_tables_path: PathBuf,
    /// Mode name → directory holding that mode's baseline metric tables.
    pub baseline_paths: HashMap<String, PathBuf>,
    #[serde(default = "default_train_extension")]
    pub train_filename_extension: String,
    #[serde(default = "default_dev_extension")]
    pub dev_filename_extension: String,
    #[serde(default = "default_test_extension")]
    pub test_filename_extension: String,
}

impl PathsConfig {
    /// Train/dev/test file locations for one corpus.
    pub fn corpus_paths(&self, corpus: &str) -> corpus::CorpusPaths {
        corpus::CorpusPaths {
            train: self
                .data_path
                .join(format!("{corpus}{}", self.train_filename_extension)),
            dev: self
                .data_path
                .join(format!("{corpus}{}", self.dev_filename_extension)),
            test: self
                .data_path
                .join(format!("{corpus}{}", self.test_filename_extension)),
        }
    }

    /// Baseline metric table for one (mode, corpus, seed).
    pub fn baseline_table(&self, mode: Mode, corpus: &str, seed: u64) -> PathBuf {
        self.baseline_paths[mode.as_str()]
            .join(corpus)
            .join(format!("seed{seed}.parquet"))
    }
}

/// Training parameters shared by every run.
#[derive(Debug, Clone, Deserialize)]
pub struct ParametersConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_num_epochs")]
    pub num_epochs: u32,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub scheduler: Option<String>,
    #[serde(default)]
    pub monitor_test: bool,
    /// Reinitialize the model before retraining. Retraining always starts
    /// from a freshly built model; `false` does not continue from the
    /// baseline weights.
    #[serde(default = "default_true")]
    pub model_reinit: bool,
    /// Decoder warm-up before EE training; logged as epoch 0.
    #[serde(default)]
    pub decoder_init: Option<DecoderInit>,
    /// Simulated early-exit layers in EE mode.
    #[serde(default = "default_num_layers")]
    pub num_layers: usize,
    /// Mode names to run, "standard" and/or "EE".
    pub modes: Vec<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub modify_category1: Option<CategoryModification>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub modify_category2: Option<CategoryModification>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub modify_category3: Option<CategoryModification>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub modify_category4: Option<CategoryModification>,
}

/// Decoder warm-up settings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DecoderInit {
    pub lr: f64,
    pub num_epochs: u32,
}

/// Modification settings for one token category.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryModification {
    /// Baseline epoch whose metric values drive the selection.
    pub epoch_change: u32,
    pub metric: String,
    pub threshold: f64,
    pub direction: Direction,
    pub modification: Modification,
}

/// Config files mark disabled categories with `false` instead of omitting
/// the key; accept both.
fn false_as_none<'de, D>(deserializer: D) -> Result<Option<CategoryModification>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Disabled(bool),
        Enabled(CategoryModification),
    }
    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Disabled(enabled)) => {
            if enabled {
                Err(serde::de::Error::custom(
                    "modify_category settings must be false or a settings object",
                ))
            } else {
                Ok(None)
            }
        }
        Some(Raw::Enabled(m)) => Ok(Some(m)),
    }
}

fn default_train_extension() -> String {
    "_train.tsv".to_string()
}
fn default_dev_extension() -> String {
    "_dev.tsv".to_string()
}
fn default_test_extension() -> String {
    "_test.tsv".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_learning_rate() -> f64 {
    0.1
}
fn default_num_epochs() -> u32 {
    10
}
fn default_model() -> String {
    "lexicon".to_string()
}
fn default_num_layers() -> usize {
    4
}
fn default_true() -> bool {
    true
}

impl ExperimentConfig {
    /// Load and validate a config from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        tracing::info!(path = %path.display(), "Loaded experiment config");
        Ok(config)
    }

    /// The configured modes, parsed.
    pub fn modes(&self) -> Vec<Mode> {
        self.parameters
            .modes
            .iter()
            .filter_map(|m| Mode::parse(m))
            .collect()
    }

    /// The ordered metric list for one mode, parsed.
    pub fn metrics_for(&self, mode: Mode) -> Vec<MetricName> {
        self.sample_metrics
            .get(mode.as_str())
            .map(|names| names.iter().filter_map(|n| n.parse().ok()).collect())
            .unwrap_or_default()
    }

    /// Modification settings for one category, if configured.
    pub fn category_modification(&self, category: Category) -> Option<&CategoryModification> {
        match category {
            Category::AgreeOutside => self.parameters.modify_category1.as_ref(),
            Category::DisagreeOutside => self.parameters.modify_category2.as_ref(),
            Category::AgreeEntity => self.parameters.modify_category3.as_ref(),
            Category::DisagreeEntity => self.parameters.modify_category4.as_ref(),
        }
    }

    /// Fail fast on anything a run would only trip over midway.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.parameters.modes.is_empty() {
            anyhow::bail!("parameters.modes must not be empty");
        }
        if self.seeds.is_empty() {
            anyhow::bail!("seeds must not be empty");
        }
        if self.corpora.is_empty() {
            anyhow::bail!("corpora must not be empty");
        }
        if self.parameters.num_epochs == 0 {
            anyhow::bail!("parameters.num_epochs must be at least 1");
        }

        for mode_name in &self.parameters.modes {
            let mode = Mode::parse(mode_name)
                .ok_or_else(|| anyhow::anyhow!("unknown mode {mode_name:?} in parameters.modes"))?;
            if !self.paths.baseline_paths.contains_key(mode_name) {
                anyhow::bail!("paths.baseline_paths is missing an entry for mode {mode_name:?}");
            }
            let metric_names = self
                .sample_metrics
                .get(mode_name)
                .ok_or_else(|| anyhow::anyhow!("sample_metrics is missing mode {mode_name:?}"))?;
            if metric_names.is_empty() {
                anyhow::bail!("sample_metrics.{mode_name} must not be empty");
            }
            for name in metric_names {
                let metric: MetricName = name.parse()?;
                if !MetricName::available_in(mode).contains(&metric) {
                    anyhow::bail!("metric {name:?} is not available in {mode_name} mode");
                }
            }
        }

        for cat_name in &self.categories {
            let id = cat_name
                .strip_prefix("category")
                .and_then(Category::from_id)
                .ok_or_else(|| anyhow::anyhow!("unknown category {cat_name:?}"))?;
            let Some(settings) = self.category_modification(id) else {
                anyhow::bail!("categories lists {cat_name:?} but parameters.modify_{cat_name} is disabled");
            };
            if settings.modification == Modification::Relabel && !id.supports_relabel() {
                anyhow::bail!(
                    "relabel is only valid for categories 2 and 4, not {cat_name:?}"
                );
            }
            if settings.epoch_change < 1 || settings.epoch_change > self.parameters.num_epochs {
                anyhow::bail!(
                    "modify_{cat_name}.epoch_change must be within 1..=num_epochs"
                );
            }
            if !settings.threshold.is_finite() {
                anyhow::bail!("modify_{cat_name}.threshold must be finite");
            }
            let metric: MetricName = settings.metric.parse()?;
            for mode in self.modes() {
                if !self.metrics_for(mode).contains(&metric) {
                    anyhow::bail!(
                        "modify_{cat_name}.metric {:?} is not logged in {} mode",
                        settings.metric,
                        mode
                    );
                }
            }
        }

        Ok(())
    }
}
