//! Aggregates run results into CSV summary tables.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use runlog::{mean_std, MetricReader, RunResult};
use sample_metrics::bucket_counts;

use crate::config::ExperimentConfig;

const HISTOGRAM_BUCKETS: usize = 10;

/// Aggregated scores for one (corpus, mode, modification) group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub corpus: String,
    pub mode: String,
    pub modification: String,
    pub seeds: Vec<u64>,
    pub mean_test_f1: f64,
    pub std_test_f1: f64,
    pub mean_dev_f1: f64,
    pub mean_noise_share: Option<f64>,
    /// True when not every configured seed has a result.
    pub incomplete: bool,
}

/// Group loaded results by (corpus, mode, modification) and aggregate
/// across seeds. Missing seeds mark the group incomplete instead of
/// failing. Output order is deterministic.
pub fn summarize_results(results: &[RunResult], expected_seeds: &[u64]) -> Vec<GroupSummary> {
    let expected: BTreeSet<u64> = expected_seeds.iter().copied().collect();

    let mut groups: BTreeMap<(String, String, String), Vec<&RunResult>> = BTreeMap::new();
    for result in results {
        let label = result
            .modification
            .as_ref()
            .map_or_else(|| "baseline".to_string(), |m| m.label());
        groups
            .entry((result.corpus.clone(), result.mode.clone(), label))
            .or_default()
            .push(result);
    }

    let mut summaries = Vec::with_capacity(groups.len());
    for ((corpus, mode, modification), mut members) in groups {
        members.sort_by_key(|r| r.seed);

        let final_scores = |r: &RunResult| r.retrained.unwrap_or(r.baseline);
        let test_scores: Vec<f64> = members.iter().map(|r| final_scores(r).test_f1).collect();
        let dev_scores: Vec<f64> = members.iter().map(|r| final_scores(r).dev_f1).collect();
        let noise_shares: Vec<f64> = members.iter().filter_map(|r| r.noise_share_f1).collect();

        let (mean_test_f1, std_test_f1) = mean_std(&test_scores);
        let (mean_dev_f1, _) = mean_std(&dev_scores);
        let mean_noise_share = if noise_shares.is_empty() {
            None
        } else {
            Some(mean_std(&noise_shares).0)
        };

        let seeds: Vec<u64> = members.iter().map(|r| r.seed).collect();
        let present: BTreeSet<u64> = seeds.iter().copied().collect();
        summaries.push(GroupSummary {
            corpus,
            mode,
            modification,
            incomplete: present != expected,
            seeds,
            mean_test_f1,
            std_test_f1,
            mean_dev_f1,
            mean_noise_share,
        });
    }
    summaries
}

/// Per (corpus, mode), the modification group with the best mean dev score.
pub fn best_parameter_sets(summaries: &[GroupSummary]) -> Vec<&GroupSummary> {
    let mut best: BTreeMap<(String, String), &GroupSummary> = BTreeMap::new();
    for summary in summaries {
        if summary.modification == "baseline" {
            continue;
        }
        let key = (summary.corpus.clone(), summary.mode.clone());
        match best.get(&key) {
            Some(current) if current.mean_dev_f1 >= summary.mean_dev_f1 => {}
            _ => {
                best.insert(key, summary);
            }
        }
    }
    best.into_values().collect()
}

/// Scan the results directory, write `summary.csv`, and optionally the
/// best-parameters and histogram tables. Running twice over the same
/// inputs writes identical bytes.
pub fn summarize(config: &ExperimentConfig) -> anyhow::Result<()> {
    let out_dir = &config.paths.results_tables_path;
    let runs_dir = out_dir.join("runs");
    let results = RunResult::load_dir(&runs_dir)?;
    if results.is_empty() {
        tracing::warn!(dir = %runs_dir.display(), "No run results to summarize");
        return Ok(());
    }

    let summaries = summarize_results(&results, &config.seeds);
    write_summary_csv(&summaries, &out_dir.join("summary.csv"))?;

    if config.only_best_parameter_sets {
        let best = best_parameter_sets(&summaries);
        write_best_csv(&best, &out_dir.join("best_parameters.csv"))?;
    }

    if config.plot_histograms {
        write_histograms(config, &results, &out_dir.join("histograms"))?;
    }

    println!(
        "Summarized {} runs into {} groups ({})",
        results.len(),
        summaries.len(),
        out_dir.join("summary.csv").display()
    );
    Ok(())
}

fn format_f64(value: f64) -> String {
    format!("{value:.6}")
}

fn write_summary_csv(summaries: &[GroupSummary], path: &Path) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "corpus",
        "mode",
        "modification",
        "seeds",
        "mean_test_f1",
        "std_test_f1",
        "mean_dev_f1",
        "mean_noise_share",
        "incomplete",
    ])?;
    for s in summaries {
        let seeds = s
            .seeds
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        writer.write_record([
            s.corpus.as_str(),
            s.mode.as_str(),
            s.modification.as_str(),
            seeds.as_str(),
            &format_f64(s.mean_test_f1),
            &format_f64(s.std_test_f1),
            &format_f64(s.mean_dev_f1),
            &s.mean_noise_share.map_or(String::new(), format_f64),
            if s.incomplete { "yes" } else { "no" },
        ])?;
    }
    writer.flush()?;
    tracing::info!(path = %path.display(), groups = summaries.len(), "Wrote summary table");
    Ok(())
}

fn write_best_csv(best: &[&GroupSummary], path: &Path) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["corpus", "mode", "modification", "mean_dev_f1", "mean_test_f1"])?;
    for s in best {
        writer.write_record([
            s.corpus.as_str(),
            s.mode.as_str(),
            s.modification.as_str(),
            &format_f64(s.mean_dev_f1),
            &format_f64(s.mean_test_f1),
        ])?;
    }
    writer.flush()?;
    tracing::info!(path = %path.display(), "Wrote best-parameters table");
    Ok(())
}

/// Per run and metric, bucket counts of the metric's values per epoch.
fn write_histograms(
    config: &ExperimentConfig,
    results: &[RunResult],
    out_dir: &Path,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(out_dir)?;
    for result in results {
        let table_path = resolve_table_path(config, &result.metric_table);
        if !table_path.exists() {
            tracing::warn!(path = %table_path.display(), "Metric table missing, skipping histogram");
            continue;
        }
        let table = MetricReader::read_all(&table_path)?;

        let path = out_dir.join(format!("{}_hist.csv", result.run_id()));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["metric", "epoch", "bucket_low", "bucket_high", "count"])?;

        for (column, metric) in table.metrics.iter().enumerate() {
            let all: Vec<f64> = table.records.iter().map(|r| r.values[column]).collect();
            let edges = histogram_edges(&all);
            for epoch in table.epochs() {
                let values: Vec<f64> = table
                    .epoch_records(epoch)
                    .iter()
                    .map(|r| r.values[column])
                    .collect();
                for (bucket, count) in bucket_counts(&values, &edges).iter().enumerate() {
                    writer.write_record([
                        metric.as_str(),
                        &epoch.to_string(),
                        &format_f64(edges[bucket]),
                        &format_f64(edges[bucket + 1]),
                        &count.to_string(),
                    ])?;
                }
            }
        }
        writer.flush()?;
        tracing::info!(path = %path.display(), "Wrote metric histograms");
    }
    Ok(())
}

/// Evenly spaced edges over the observed value range of a whole run, so
/// every epoch of one metric shares the same buckets.
fn histogram_edges(values: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let low = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let high = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (low, high) = if finite.is_empty() {
        (0.0, 1.0)
    } else if high > low {
        (low, high)
    } else {
        (low, low + 1.0)
    };
    (0..=HISTOGRAM_BUCKETS)
        .map(|i| low + (high - low) * i as f64 / HISTOGRAM_BUCKETS as f64)
        .collect()
}

fn resolve_table_path(config: &ExperimentConfig, stored: &str) -> PathBuf {
    let path = PathBuf::from(stored);
    if path.is_absolute() {
        path
    } else {
        config.paths.results_tables_path.join(path)
    }
}
