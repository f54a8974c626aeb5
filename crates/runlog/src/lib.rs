//! Parquet I/O for per-run metric tables and JSON run results.
//!
//! Each run writes one metric table: one row per (token, epoch), with a
//! fixed set of identity columns followed by one Float64 column per
//! configured sample metric. Run outcomes are stored as one JSON document
//! per run; the summarizer reads them back with [`RunResult::load_dir`].

pub mod reader;
pub mod types;
pub mod writer;

pub use reader::{MetricReader, MetricTable};
pub use types::{mean_std, MetricRecord, ModificationParams, RunResult, ScorePair};
pub use writer::{metric_schema, MetricWriter, FIXED_COLUMNS};
