//! Turns per-epoch trainer outputs into metric table rows.

use corpus::{LabelDict, TaggedSplit};
use runlog::MetricRecord;
use sample_metrics::{compute_metrics, layer_metrics, MetricName, TokenHistory};
use tagger::EpochOutput;

/// Holds the per-token accumulators of one training phase and produces one
/// [`MetricRecord`] per token per observed epoch.
///
/// Epochs must be observed in strictly increasing consecutive order; a gap
/// or repeat is a driver bug and fails the run. A malformed probability
/// vector only drops that token's record for that epoch.
pub struct MetricCollector {
    metrics: Vec<MetricName>,
    histories: Vec<TokenHistory>,
    last_epoch: Option<u32>,
}

impl MetricCollector {
    /// Fresh collector for one training phase.
    pub fn new(metrics: Vec<MetricName>, tagset_size: usize, num_tokens: usize) -> Self {
        Self {
            metrics,
            histories: vec![TokenHistory::new(tagset_size); num_tokens],
            last_epoch: None,
        }
    }

    fn needs_layers(&self) -> bool {
        self.metrics.iter().any(MetricName::is_layer_metric)
    }

    /// Fold one epoch's outputs into the accumulators and return the rows
    /// to log.
    pub fn observe(
        &mut self,
        epoch: u32,
        split: &TaggedSplit,
        dict: &LabelDict,
        output: &EpochOutput,
    ) -> anyhow::Result<Vec<MetricRecord>> {
        if let Some(last) = self.last_epoch {
            if epoch != last + 1 {
                anyhow::bail!("observed epoch {epoch} after epoch {last}, expected {}", last + 1);
            }
        }
        if output.len() != self.histories.len() {
            anyhow::bail!(
                "trainer produced {} token outputs, split has {}",
                output.len(),
                self.histories.len()
            );
        }
        if self.needs_layers() && output.layer_probs.is_none() {
            anyhow::bail!("layer metrics are configured but the trainer produced no layer outputs");
        }
        self.last_epoch = Some(epoch);

        let mut records = Vec::with_capacity(output.len());
        for (i, (sent_index, token_index, token)) in split.iter_tokens().enumerate() {
            let observed_idx = dict.idx(&token.observed)?;

            // Layer rows are validated before the history absorbs the
            // epoch, so a dropped record never advances the accumulator.
            let layers = match &output.layer_probs {
                Some(all) if self.needs_layers() => {
                    match layer_metrics(&all[i], observed_idx, dict.len()) {
                        Ok(m) => Some(m),
                        Err(error) => {
                            tracing::warn!(
                                sent_index,
                                token_index,
                                epoch,
                                %error,
                                "Skipping token with malformed layer probabilities"
                            );
                            continue;
                        }
                    }
                }
                _ => None,
            };

            let signals = match compute_metrics(&mut self.histories[i], &output.probs[i], observed_idx)
            {
                Ok(signals) => signals,
                Err(error) => {
                    tracing::warn!(
                        sent_index,
                        token_index,
                        epoch,
                        %error,
                        "Skipping token with malformed probabilities"
                    );
                    continue;
                }
            };

            let values = self
                .metrics
                .iter()
                .map(|m| {
                    signals
                        .value(*m)
                        .or_else(|| layers.as_ref().and_then(|l| l.value(*m)))
                        .ok_or_else(|| anyhow::anyhow!("metric {m} has no value source"))
                })
                .collect::<anyhow::Result<Vec<f64>>>()?;

            records.push(MetricRecord {
                sent_index: sent_index as u32,
                token_index: token_index as u32,
                epoch,
                text: token.text.clone(),
                observed: token.observed.clone(),
                clean: token.clean.clone(),
                predicted: dict.label(signals.prediction).to_string(),
                noisy: token.is_noisy(),
                values,
            });
        }
        Ok(records)
    }
}
