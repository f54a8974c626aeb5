//! End-to-end run over a tiny corpus with the built-in lexicon tagger.

use std::fs;
use std::path::Path;

use noiselab_core::{driver, summarize, ExperimentConfig};
use runlog::{MetricReader, RunResult};
use sample_metrics::MetricName;
use tempfile::TempDir;

fn write_corpus(data_dir: &Path) {
    fs::create_dir_all(data_dir).unwrap();
    // Train carries clean and observed columns; "Berlin" in the second
    // sentence is mislabeled as O.
    fs::write(
        data_dir.join("c1_train.tsv"),
        "John\tB-PER\tB-PER\nvisited\tO\tO\nBerlin\tB-LOC\tB-LOC\n\n\
         Mary\tB-PER\tB-PER\nleft\tO\tO\nBerlin\tB-LOC\tO\n\n\
         John\tB-PER\tB-PER\nstayed\tO\tO\nhome\tO\tO\n",
    )
    .unwrap();
    fs::write(
        data_dir.join("c1_dev.tsv"),
        "Mary\tB-PER\nvisited\tO\nBerlin\tB-LOC\n",
    )
    .unwrap();
    fs::write(
        data_dir.join("c1_test.tsv"),
        "John\tB-PER\nleft\tO\nBerlin\tB-LOC\n",
    )
    .unwrap();
}

fn experiment_config(root: &Path) -> ExperimentConfig {
    let value = serde_json::json!({
        "experiment_name": "tiny_relabel",
        "paths": {
            "data_path": root.join("data"),
            "resources_path": root.join("resources"),
            "results_tables_path": root.join("results"),
            "baseline_paths": { "standard": root.join("baselines/standard") }
        },
        "parameters": {
            "num_epochs": 3,
            "learning_rate": 0.5,
            "modes": ["standard"],
            "modify_category2": {
                "epoch_change": 2,
                "metric": "correctness",
                "threshold": 0.5,
                "direction": "left",
                "modification": "relabel"
            }
        },
        "categories": ["category2"],
        "source_corpora": ["c1"],
        "corpora": ["c1"],
        "modifications": ["relabel"],
        "seeds": [13],
        "sample_metrics": { "standard": ["entropy", "correctness"] },
        "plot_histograms": true
    });
    let config: ExperimentConfig = serde_json::from_value(value).unwrap();
    config.validate().unwrap();
    config
}

fn ee_config(root: &Path) -> ExperimentConfig {
    let value = serde_json::json!({
        "experiment_name": "tiny_ee_mask",
        "paths": {
            "data_path": root.join("data"),
            "resources_path": root.join("resources"),
            "results_tables_path": root.join("results"),
            "baseline_paths": { "EE": root.join("baselines/EE") }
        },
        "parameters": {
            "num_epochs": 2,
            "learning_rate": 0.5,
            "num_layers": 3,
            "decoder_init": { "lr": 0.1, "num_epochs": 2 },
            "modes": ["EE"],
            "modify_category1": {
                "epoch_change": 1,
                "metric": "pd",
                "threshold": 1.5,
                "direction": "right",
                "modification": "mask"
            }
        },
        "categories": ["category1"],
        "source_corpora": ["c1"],
        "corpora": ["c1"],
        "modifications": ["mask"],
        "seeds": [13],
        "sample_metrics": { "EE": ["entropy", "correctness", "pd"] }
    });
    let config: ExperimentConfig = serde_json::from_value(value).unwrap();
    config.validate().unwrap();
    config
}

#[test]
fn test_ee_warmup_logs_epoch_zero_with_layer_metrics() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("data"));
    let config = ee_config(tmp.path());

    driver::run_experiment(&config, 0).unwrap();

    // The decoder warm-up's final pass is logged as epoch 0, ahead of the
    // regular training epochs.
    let baseline = tmp.path().join("baselines/EE/c1/seed13.parquet");
    let table = MetricReader::read_all(&baseline).unwrap();
    assert_eq!(table.epochs(), vec![0, 1, 2]);
    assert_eq!(
        table.metrics,
        vec![
            MetricName::Entropy,
            MetricName::Correctness,
            MetricName::PredictionDepth,
        ]
    );
    for epoch in table.epochs() {
        assert_eq!(table.epoch_records(epoch).len(), 9);
    }
    let depth_column = table.metric_column(MetricName::PredictionDepth).unwrap();
    for record in &table.records {
        let depth = record.values[depth_column];
        assert!((0.0..=3.0).contains(&depth));
    }

    // The retraining table carries the warm-up epoch as well.
    let run_id = "c1_EE_mask_pd_right_th1.5_ep1_cat1_seed13";
    let retrained =
        MetricReader::read_all(&tmp.path().join(format!("results/runs/{run_id}.parquet")))
            .unwrap();
    assert_eq!(retrained.epochs(), vec![0, 1, 2]);
}

#[test]
fn test_full_run_produces_results_and_tables() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("data"));
    let config = experiment_config(tmp.path());

    assert_eq!(driver::run_matrix(&config).len(), 1);
    driver::run_experiment(&config, 0).unwrap();

    let runs_dir = tmp.path().join("results/runs");
    let run_id = "c1_standard_relabel_correctness_left_th0.5_ep2_cat2_seed13";
    let result = RunResult::load(&runs_dir.join(format!("{run_id}.json"))).unwrap();
    assert_eq!(result.corpus, "c1");
    assert_eq!(result.seed, 13);
    assert!(result.modification.is_some());
    assert!(result.noise_share_f1.is_some());
    assert!(result.retrained.is_some());

    // The modified training split was written out alongside the result.
    assert!(runs_dir.join(format!("{run_id}_train.tsv")).exists());

    // The retraining metric table has exactly the configured metrics, one
    // row per train token per epoch.
    let table = MetricReader::read_all(&runs_dir.join(format!("{run_id}.parquet"))).unwrap();
    assert_eq!(
        table.metrics,
        vec![MetricName::Entropy, MetricName::Correctness]
    );
    let epochs = table.epochs();
    assert_eq!(epochs, vec![1, 2, 3]);
    for epoch in epochs {
        assert_eq!(table.epoch_records(epoch).len(), 9);
    }

    // The baseline table and its score sidecar were created too.
    let baseline = tmp.path().join("baselines/standard/c1/seed13.parquet");
    assert!(baseline.exists());
    assert!(baseline.with_extension("json").exists());
}

#[test]
fn test_rerun_skips_existing_results() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("data"));
    let config = experiment_config(tmp.path());

    driver::run_experiment(&config, 0).unwrap();
    let run_id = "c1_standard_relabel_correctness_left_th0.5_ep2_cat2_seed13";
    let result_path = tmp
        .path()
        .join(format!("results/runs/{run_id}.json"));
    let first = fs::read(&result_path).unwrap();

    // A second invocation leaves the existing result untouched.
    driver::run_experiment(&config, 0).unwrap();
    assert_eq!(fs::read(&result_path).unwrap(), first);
}

#[test]
fn test_summarize_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("data"));
    let config = experiment_config(tmp.path());
    driver::run_experiment(&config, 0).unwrap();

    summarize::summarize(&config).unwrap();
    let summary_path = tmp.path().join("results/summary.csv");
    let first = fs::read(&summary_path).unwrap();
    assert!(!first.is_empty());

    // One histogram table per run result.
    let histograms: Vec<_> = fs::read_dir(tmp.path().join("results/histograms"))
        .unwrap()
        .collect();
    assert_eq!(histograms.len(), 1);

    summarize::summarize(&config).unwrap();
    assert_eq!(fs::read(&summary_path).unwrap(), first);
}
