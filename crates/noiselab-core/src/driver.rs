//! Run matrix generation and per-run execution.

use std::path::PathBuf;

use corpus::noise::MASK_LABEL;
use corpus::{
    apply_modification, span_f1, write_split, Category, LabelColumn, LabelDict, ModificationSpec,
    TaggedCorpus, TaggedSplit, TokenEpochInfo,
};
use indicatif::{ProgressBar, ProgressStyle};
use runlog::{MetricReader, MetricWriter, ModificationParams, RunResult, ScorePair};
use sample_metrics::{MetricName, Mode};
use tagger::{EpochOutput, LexiconTagger, SequenceTrainer};

use crate::collector::MetricCollector;
use crate::config::{CategoryModification, ExperimentConfig};

/// One cell of the run matrix.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub corpus: String,
    pub mode: Mode,
    pub seed: u64,
    /// None runs only the baseline phase.
    pub modification: Option<PlannedModification>,
}

/// A category modification scheduled for one run.
#[derive(Debug, Clone)]
pub struct PlannedModification {
    pub category: Category,
    pub settings: CategoryModification,
}

impl PlannedModification {
    fn params(&self) -> ModificationParams {
        ModificationParams {
            modification: serde_label(&self.settings.modification),
            metric: self.settings.metric.clone(),
            threshold: self.settings.threshold,
            direction: serde_label(&self.settings.direction),
            epoch_change: self.settings.epoch_change,
            categories: vec![self.category.id().to_string()],
        }
    }
}

/// Lowercase serde name of a unit enum variant.
fn serde_label<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

impl RunSpec {
    /// Stable identifier matching [`RunResult::run_id`].
    pub fn run_id(&self) -> String {
        let mod_label = self
            .modification
            .as_ref()
            .map_or_else(|| "baseline".to_string(), |m| m.params().label());
        format!("{}_{}_{}_seed{}", self.corpus, self.mode, mod_label, self.seed)
    }
}

/// Expand the config into the full corpus × modification × seed × mode
/// matrix. Triples with no enabled category modification get a
/// baseline-only spec so their metric tables still exist.
pub fn run_matrix(config: &ExperimentConfig) -> Vec<RunSpec> {
    let mut specs = Vec::new();
    for corpus in &config.corpora {
        for mode in config.modes() {
            for &seed in &config.seeds {
                let mut any = false;
                for cat_name in &config.categories {
                    let Some(category) = cat_name.strip_prefix("category").and_then(Category::from_id)
                    else {
                        continue;
                    };
                    let Some(settings) = config.category_modification(category) else {
                        continue;
                    };
                    if !config.modifications.contains(&settings.modification) {
                        continue;
                    }
                    any = true;
                    specs.push(RunSpec {
                        corpus: corpus.clone(),
                        mode,
                        seed,
                        modification: Some(PlannedModification {
                            category,
                            settings: settings.clone(),
                        }),
                    });
                }
                if !any {
                    specs.push(RunSpec {
                        corpus: corpus.clone(),
                        mode,
                        seed,
                        modification: None,
                    });
                }
            }
        }
    }
    specs
}

/// Execute every run in the matrix, skipping runs whose result already
/// exists. Sequential by design; the results directory is append-only.
pub fn run_experiment(config: &ExperimentConfig, gpu: u32) -> anyhow::Result<()> {
    if config.only_results_summarization {
        tracing::info!("only_results_summarization is set, skipping all runs");
        return Ok(());
    }
    tracing::info!(gpu, "GPU id recorded, the built-in tagger runs on CPU");

    let specs = run_matrix(config);
    let runs_dir = config.paths.results_tables_path.join("runs");
    std::fs::create_dir_all(&runs_dir)?;

    let bar = ProgressBar::new(specs.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("valid progress bar template")
            .progress_chars("=> "),
    );

    for spec in specs {
        let run_id = spec.run_id();
        bar.set_message(run_id.clone());
        let result_path = runs_dir.join(format!("{run_id}.json"));
        if result_path.exists() {
            tracing::info!(run = %run_id, "Result exists, skipping");
            bar.inc(1);
            continue;
        }

        let result = execute_spec(config, &spec, &runs_dir)?;
        result.save(&result_path)?;
        bar.inc(1);
    }
    bar.finish_with_message("all runs complete");
    Ok(())
}

/// Run one spec end to end: baseline, modification, retraining.
fn execute_spec(
    config: &ExperimentConfig,
    spec: &RunSpec,
    runs_dir: &PathBuf,
) -> anyhow::Result<RunResult> {
    tracing::info!(run = %spec.run_id(), "Starting run");

    let corpus = TaggedCorpus::load(&config.paths.corpus_paths(&spec.corpus))?;
    let mut dict = LabelDict::from_splits([&corpus.train, &corpus.dev, &corpus.test]);
    dict.add(MASK_LABEL);
    let metrics = config.metrics_for(spec.mode);

    let (baseline_table, baseline_scores) =
        ensure_baseline(config, spec, &corpus, &dict, &metrics)?;

    let Some(planned) = &spec.modification else {
        return Ok(RunResult {
            corpus: spec.corpus.clone(),
            mode: spec.mode.to_string(),
            seed: spec.seed,
            timestamp: chrono::Utc::now().to_rfc3339(),
            num_epochs: config.parameters.num_epochs,
            modification: None,
            tokens_changed: 0,
            tokens_changed_additionally: 0,
            noise_share_f1: None,
            metric_table: baseline_table.display().to_string(),
            baseline: baseline_scores,
            retrained: None,
        });
    };

    // Modification phase: select tokens from the baseline table's values at
    // the configured epoch.
    let metric: MetricName = planned.settings.metric.parse()?;
    let table = MetricReader::read_all(&baseline_table)?;
    let view: Vec<TokenEpochInfo> = table
        .epoch_values(planned.settings.epoch_change, metric)?
        .into_iter()
        .map(|(predicted, value)| TokenEpochInfo { predicted, value })
        .collect();
    if view.len() != corpus.train.num_tokens() {
        anyhow::bail!(
            "baseline table epoch {} has {} tokens, training split has {}",
            planned.settings.epoch_change,
            view.len(),
            corpus.train.num_tokens()
        );
    }

    let mut modified = corpus.train.clone();
    let mod_spec = ModificationSpec {
        category: planned.category,
        modification: planned.settings.modification,
        threshold: planned.settings.threshold,
        direction: planned.settings.direction,
    };
    let outcome = apply_modification(&mut modified, &view, &mod_spec);
    let noise_share = span_f1(&modified, LabelColumn::Clean, LabelColumn::Observed).f1;
    tracing::info!(
        changed = outcome.tokens_changed,
        additionally = outcome.tokens_changed_additionally,
        noise_share,
        "Applied modification"
    );

    let run_id = spec.run_id();
    write_split(
        &modified,
        LabelColumn::Observed,
        &runs_dir.join(format!("{run_id}_train.tsv")),
    )?;

    // Retraining phase on the modified labels.
    let mut trainer = build_trainer(config, spec.mode, &dict, spec.seed)?;
    if config.parameters.model_reinit {
        trainer.reinit(spec.seed);
    }
    let table_path = runs_dir.join(format!("{run_id}.parquet"));
    let retrained_scores = train_phase(
        config,
        spec.mode,
        trainer.as_mut(),
        &modified,
        &corpus,
        &dict,
        &metrics,
        &table_path,
    )?;

    Ok(RunResult {
        corpus: spec.corpus.clone(),
        mode: spec.mode.to_string(),
        seed: spec.seed,
        timestamp: chrono::Utc::now().to_rfc3339(),
        num_epochs: config.parameters.num_epochs,
        modification: Some(planned.params()),
        tokens_changed: outcome.tokens_changed as u64,
        tokens_changed_additionally: outcome.tokens_changed_additionally as u64,
        noise_share_f1: Some(noise_share),
        metric_table: format!("runs/{run_id}.parquet"),
        baseline: baseline_scores,
        retrained: Some(retrained_scores),
    })
}

/// Train the baseline for (mode, corpus, seed) unless its artifacts already
/// exist, and return the metric table path plus dev/test scores.
fn ensure_baseline(
    config: &ExperimentConfig,
    spec: &RunSpec,
    corpus: &TaggedCorpus,
    dict: &LabelDict,
    metrics: &[MetricName],
) -> anyhow::Result<(PathBuf, ScorePair)> {
    let table = config.paths.baseline_table(spec.mode, &spec.corpus, spec.seed);
    let scores_path = table.with_extension("json");

    if table.exists() && scores_path.exists() {
        let result = RunResult::load(&scores_path)?;
        tracing::info!(path = %table.display(), "Reusing baseline");
        return Ok((table, result.baseline));
    }

    tracing::info!(
        corpus = %spec.corpus,
        mode = %spec.mode,
        seed = spec.seed,
        "Training baseline"
    );
    let mut trainer = build_trainer(config, spec.mode, dict, spec.seed)?;
    let scores = train_phase(
        config,
        spec.mode,
        trainer.as_mut(),
        &corpus.train,
        corpus,
        dict,
        metrics,
        &table,
    )?;

    let result = RunResult {
        corpus: spec.corpus.clone(),
        mode: spec.mode.to_string(),
        seed: spec.seed,
        timestamp: chrono::Utc::now().to_rfc3339(),
        num_epochs: config.parameters.num_epochs,
        modification: None,
        tokens_changed: 0,
        tokens_changed_additionally: 0,
        noise_share_f1: None,
        metric_table: table.display().to_string(),
        baseline: scores,
        retrained: None,
    };
    result.save(&scores_path)?;

    Ok((table, scores))
}

/// One full training phase: optional EE decoder warm-up logged as epoch 0,
/// then `num_epochs` epochs with per-token metric logging, then dev/test
/// evaluation.
#[allow(clippy::too_many_arguments)]
fn train_phase(
    config: &ExperimentConfig,
    mode: Mode,
    trainer: &mut dyn SequenceTrainer,
    train: &TaggedSplit,
    corpus: &TaggedCorpus,
    dict: &LabelDict,
    metrics: &[MetricName],
    table_path: &PathBuf,
) -> anyhow::Result<ScorePair> {
    let mut collector = MetricCollector::new(metrics.to_vec(), dict.len(), train.num_tokens());
    let mut writer = MetricWriter::new(table_path.clone(), metrics.to_vec());

    if mode == Mode::EarlyExit {
        if let Some(warmup) = config.parameters.decoder_init {
            trainer.freeze_encoder();
            trainer.set_learning_rate(warmup.lr);
            let mut last = None;
            for _ in 0..warmup.num_epochs {
                last = Some(trainer.train_epoch(train)?);
            }
            if let Some(output) = last {
                writer.record_all(collector.observe(0, train, dict, &output)?);
            }
            trainer.unfreeze_encoder();
            trainer.set_learning_rate(config.parameters.learning_rate);
        }
    }

    for epoch in 1..=config.parameters.num_epochs {
        let output = trainer.train_epoch(train)?;
        writer.record_all(collector.observe(epoch, train, dict, &output)?);
        if config.parameters.monitor_test {
            let test = evaluate_split(trainer, &corpus.test, dict)?;
            tracing::info!(epoch, test_f1 = test, "Monitoring test score");
        }
    }
    writer.finish()?;

    let dev_f1 = evaluate_split(trainer, &corpus.dev, dict)?;
    let test_f1 = evaluate_split(trainer, &corpus.test, dict)?;
    tracing::info!(dev_f1, test_f1, "Phase finished");
    Ok(ScorePair { dev_f1, test_f1 })
}

/// Span F1 of the trainer's predictions against a split's clean labels.
fn evaluate_split(
    trainer: &dyn SequenceTrainer,
    split: &TaggedSplit,
    dict: &LabelDict,
) -> anyhow::Result<f64> {
    let output = trainer.predict(split)?;
    Ok(span_f1(
        &with_predictions(split, &output, dict),
        LabelColumn::Clean,
        LabelColumn::Observed,
    )
    .f1)
}

/// A copy of `split` with the observed column replaced by predictions.
fn with_predictions(split: &TaggedSplit, output: &EpochOutput, dict: &LabelDict) -> TaggedSplit {
    let predictions = output.predictions();
    let mut scored = split.clone();
    let mut i = 0;
    for sentence in &mut scored.sentences {
        for token in &mut sentence.tokens {
            token.observed = dict.label(predictions[i]).to_string();
            i += 1;
        }
    }
    scored
}

/// Instantiate the configured trainer for one run.
fn build_trainer(
    config: &ExperimentConfig,
    mode: Mode,
    dict: &LabelDict,
    seed: u64,
) -> anyhow::Result<Box<dyn SequenceTrainer>> {
    match config.parameters.model.as_str() {
        "lexicon" => {
            let tagger = match mode {
                Mode::Standard => {
                    LexiconTagger::new(dict.clone(), seed, config.parameters.learning_rate)
                }
                Mode::EarlyExit => LexiconTagger::with_layers(
                    dict.clone(),
                    seed,
                    config.parameters.learning_rate,
                    config.parameters.num_layers,
                ),
            };
            Ok(Box::new(tagger))
        }
        other => anyhow::bail!("unknown model {other:?}, only \"lexicon\" is built in"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_json() -> String {
        r#"{
            "paths": {
                "data_path": "data",
                "resources_path": "resources",
                "results_tables_path": "results",
                "baseline_paths": { "standard": "baselines/standard", "EE": "baselines/EE" }
            },
            "parameters": {
                "num_epochs": 3,
                "modes": ["standard", "EE"],
                "modify_category1": {
                    "epoch_change": 1,
                    "metric": "entropy",
                    "threshold": 0.5,
                    "direction": "right",
                    "modification": "mask"
                },
                "modify_category2": {
                    "epoch_change": 2,
                    "metric": "correctness",
                    "threshold": 0.5,
                    "direction": "left",
                    "modification": "relabel"
                }
            },
            "categories": ["category1", "category2"],
            "source_corpora": ["c1"],
            "corpora": ["c1", "c2"],
            "modifications": ["mask", "relabel"],
            "seeds": [13, 17],
            "sample_metrics": {
                "standard": ["entropy", "correctness"],
                "EE": ["entropy", "correctness", "pd"]
            }
        }"#
        .to_string()
    }

    #[test]
    fn test_matrix_is_full_cartesian_product() {
        let config: ExperimentConfig = serde_json::from_str(&config_json()).unwrap();
        config.validate().unwrap();
        let specs = run_matrix(&config);
        // 2 corpora × 2 modes × 2 seeds × 2 categories.
        assert_eq!(specs.len(), 16);
        assert!(specs.iter().all(|s| s.modification.is_some()));
    }

    #[test]
    fn test_matrix_respects_enabled_modifications() {
        let json = config_json().replace("[\"mask\", \"relabel\"]", "[\"mask\"]");
        let config: ExperimentConfig = serde_json::from_str(&json).unwrap();
        let specs = run_matrix(&config);
        // Only the category1 mask runs remain.
        assert_eq!(specs.len(), 8);
        for spec in &specs {
            let planned = spec.modification.as_ref().unwrap();
            assert_eq!(planned.category, Category::AgreeOutside);
        }
    }

    #[test]
    fn test_matrix_falls_back_to_baseline_runs() {
        let json = config_json().replace("[\"mask\", \"relabel\"]", "[]");
        let config: ExperimentConfig = serde_json::from_str(&json).unwrap();
        let specs = run_matrix(&config);
        // One baseline-only spec per (corpus, mode, seed).
        assert_eq!(specs.len(), 8);
        assert!(specs.iter().all(|s| s.modification.is_none()));
    }

    #[test]
    fn test_run_id_is_stable() {
        let config: ExperimentConfig = serde_json::from_str(&config_json()).unwrap();
        let specs = run_matrix(&config);
        let spec = specs
            .iter()
            .find(|s| {
                s.corpus == "c1"
                    && s.mode == Mode::Standard
                    && s.seed == 13
                    && s.modification.as_ref().unwrap().category == Category::DisagreeOutside
            })
            .unwrap();
        assert_eq!(
            spec.run_id(),
            "c1_standard_relabel_correctness_left_th0.5_ep2_cat2_seed13"
        );
    }
}
