//! The fixed metric vocabulary and per-mode availability.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which output stream the metrics are computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Final-layer probabilities only.
    #[serde(rename = "standard")]
    Standard,
    /// Early-exit: per-layer probabilities are available in addition.
    #[serde(rename = "EE")]
    EarlyExit,
}

impl Mode {
    /// Parse a mode name from config files.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(Self::Standard),
            "EE" => Some(Self::EarlyExit),
            _ => None,
        }
    }

    /// Name as it appears in config files and paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::EarlyExit => "EE",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sample metric identifier.
///
/// Values documented with their ranges; probabilities are natural-log based
/// where entropies are involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricName {
    /// Max softmax probability, in [0, 1].
    #[serde(rename = "msp")]
    Msp,
    /// Best minus second-best probability, in [0, 1].
    #[serde(rename = "BvSB")]
    Bvsb,
    /// Predictive entropy of the current distribution, >= 0.
    #[serde(rename = "entropy")]
    Entropy,
    /// -ln p(observed label), >= 0.
    #[serde(rename = "cross_entropy")]
    CrossEntropy,
    /// Running mean of p(observed label) across epochs, in [0, 1].
    #[serde(rename = "confidence")]
    Confidence,
    /// Dispersion of p(observed label) around the running confidence, >= 0.
    #[serde(rename = "variability")]
    Variability,
    /// Fraction of epochs with argmax == observed, in [0, 1].
    #[serde(rename = "correctness")]
    Correctness,
    /// Last epoch the argmax changed, normalized by total epochs, in (0, 1].
    #[serde(rename = "iter_norm")]
    IterNorm,
    /// Normalized entropy of the past-prediction histogram, in [0, 1].
    #[serde(rename = "pehist")]
    Pehist,
    /// Memorization minus forgetting episode length.
    #[serde(rename = "mild")]
    Mild,
    /// Total memorization episode length, >= 0.
    #[serde(rename = "mild_m")]
    MildM,
    /// Total forgetting episode length, >= 0.
    #[serde(rename = "mild_f")]
    MildF,
    /// Prediction depth: layers from the top still agreeing with the final
    /// prediction, in [0, n_layers].
    #[serde(rename = "pd")]
    PredictionDepth,
    /// Lowest layer predicting the observed label (n_layers if none).
    #[serde(rename = "fl")]
    FirstLayer,
    /// Layers agreeing with the observed label, in [0, n_layers].
    #[serde(rename = "tac")]
    TotalAgreeCorrect,
    /// Layers agreeing with the final layer, in [1, n_layers].
    #[serde(rename = "tal")]
    TotalAgreeLast,
    /// Entropy of the per-layer argmax histogram, >= 0.
    #[serde(rename = "le")]
    LayerEntropy,
}

/// Unknown metric name in a config file.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown sample metric {0:?}")]
pub struct UnknownMetric(pub String);

impl MetricName {
    /// All metrics computable in the given mode. EE mode extends the
    /// standard set with the layer metrics.
    pub fn available_in(mode: Mode) -> &'static [MetricName] {
        const STANDARD: &[MetricName] = &[
            MetricName::Msp,
            MetricName::Bvsb,
            MetricName::Entropy,
            MetricName::CrossEntropy,
            MetricName::Confidence,
            MetricName::Variability,
            MetricName::Correctness,
            MetricName::IterNorm,
            MetricName::Pehist,
            MetricName::Mild,
            MetricName::MildM,
            MetricName::MildF,
        ];
        const EE: &[MetricName] = &[
            MetricName::Msp,
            MetricName::Bvsb,
            MetricName::Entropy,
            MetricName::CrossEntropy,
            MetricName::Confidence,
            MetricName::Variability,
            MetricName::Correctness,
            MetricName::IterNorm,
            MetricName::Pehist,
            MetricName::Mild,
            MetricName::MildM,
            MetricName::MildF,
            MetricName::PredictionDepth,
            MetricName::FirstLayer,
            MetricName::TotalAgreeCorrect,
            MetricName::TotalAgreeLast,
            MetricName::LayerEntropy,
        ];
        match mode {
            Mode::Standard => STANDARD,
            Mode::EarlyExit => EE,
        }
    }

    /// Whether this metric needs per-layer outputs.
    pub fn is_layer_metric(&self) -> bool {
        matches!(
            self,
            Self::PredictionDepth
                | Self::FirstLayer
                | Self::TotalAgreeCorrect
                | Self::TotalAgreeLast
                | Self::LayerEntropy
        )
    }

    /// Whether this metric depends on the accumulated epoch history.
    pub fn is_cross_epoch(&self) -> bool {
        matches!(
            self,
            Self::Confidence
                | Self::Variability
                | Self::Correctness
                | Self::IterNorm
                | Self::Pehist
                | Self::Mild
                | Self::MildM
                | Self::MildF
        )
    }

    /// Identifier as used in config files and table headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Msp => "msp",
            Self::Bvsb => "BvSB",
            Self::Entropy => "entropy",
            Self::CrossEntropy => "cross_entropy",
            Self::Confidence => "confidence",
            Self::Variability => "variability",
            Self::Correctness => "correctness",
            Self::IterNorm => "iter_norm",
            Self::Pehist => "pehist",
            Self::Mild => "mild",
            Self::MildM => "mild_m",
            Self::MildF => "mild_f",
            Self::PredictionDepth => "pd",
            Self::FirstLayer => "fl",
            Self::TotalAgreeCorrect => "tac",
            Self::TotalAgreeLast => "tal",
            Self::LayerEntropy => "le",
        }
    }
}

impl FromStr for MetricName {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let all = Self::available_in(Mode::EarlyExit);
        all.iter()
            .find(|m| m.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
