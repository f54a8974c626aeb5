//! Per-token sample metrics computed from model output probabilities
//! during training.
//!
//! Three metric families:
//!
//! - single-epoch metrics ([`MetricName::Msp`], [`MetricName::Bvsb`],
//!   [`MetricName::Entropy`], [`MetricName::CrossEntropy`]) are pure
//!   functions of the current epoch's probability vector;
//! - cross-epoch metrics (confidence, variability, correctness, iter_norm,
//!   pehist, MILD) additionally need the per-token [`TokenHistory`]
//!   accumulator carried across epochs;
//! - early-exit metrics (pd, fl, tac, tal, le) are functions of the current
//!   epoch's per-layer probability matrix.
//!
//! # Key types
//!
//! - [`MetricName`]: the fixed metric vocabulary, split by [`Mode`]
//! - [`TokenHistory`]: explicit per-token accumulator, one per train token
//! - [`compute_metrics`]: one token, one epoch, all requested metrics

pub mod compute;
pub mod histogram;
pub mod history;
pub mod layers;
pub mod name;

pub use compute::{compute_metrics, validate_probs, MetricError, SampleSignals};
pub use histogram::bucket_counts;
pub use history::TokenHistory;
pub use layers::{layer_metrics, LayerMetrics};
pub use name::{Mode, MetricName};
