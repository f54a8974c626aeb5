//! Experiment orchestration: config, run matrix, metric collection and
//! result summarization.

pub mod collector;
pub mod config;
pub mod driver;
pub mod summarize;

pub use collector::MetricCollector;
pub use config::ExperimentConfig;
pub use driver::{run_experiment, run_matrix, RunSpec};
pub use summarize::summarize;
