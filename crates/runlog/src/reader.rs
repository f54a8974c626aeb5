//! Reads per-run metric tables back from Parquet files.

use crate::types::MetricRecord;
use crate::writer::FIXED_COLUMNS;
use arrow::array::*;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use sample_metrics::MetricName;
use std::collections::BTreeSet;
use std::path::Path;

/// An in-memory metric table: the metric column list discovered from the
/// Parquet schema plus all rows in file order.
#[derive(Debug, Clone)]
pub struct MetricTable {
    pub metrics: Vec<MetricName>,
    pub records: Vec<MetricRecord>,
}

impl MetricTable {
    /// Position of a metric in the value vectors, if present.
    pub fn metric_column(&self, name: MetricName) -> Option<usize> {
        self.metrics.iter().position(|m| *m == name)
    }

    /// Distinct epochs present, ascending.
    pub fn epochs(&self) -> Vec<u32> {
        let set: BTreeSet<u32> = self.records.iter().map(|r| r.epoch).collect();
        set.into_iter().collect()
    }

    /// Rows of one epoch, in token order as written.
    pub fn epoch_records(&self, epoch: u32) -> Vec<&MetricRecord> {
        self.records.iter().filter(|r| r.epoch == epoch).collect()
    }

    /// Per-token (predicted label, metric value) pairs for one epoch, in
    /// token order. This is the view the noise modification step consumes.
    pub fn epoch_values(&self, epoch: u32, metric: MetricName) -> anyhow::Result<Vec<(String, f64)>> {
        let column = self
            .metric_column(metric)
            .ok_or_else(|| anyhow::anyhow!("Metric table has no {metric} column"))?;
        let rows = self.epoch_records(epoch);
        if rows.is_empty() {
            anyhow::bail!("Metric table has no rows for epoch {epoch}");
        }
        Ok(rows
            .into_iter()
            .map(|r| (r.predicted.clone(), r.values[column]))
            .collect())
    }
}

/// Static methods for reading metric tables.
pub struct MetricReader;

impl MetricReader {
    /// Read a whole metric table from a Parquet file.
    pub fn read_all(path: &Path) -> anyhow::Result<MetricTable> {
        let file = std::fs::File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

        let fields = builder.schema().fields().clone();
        if fields.len() < FIXED_COLUMNS.len() {
            anyhow::bail!(
                "Metric table {} has {} columns, expected at least {}",
                path.display(),
                fields.len(),
                FIXED_COLUMNS.len()
            );
        }
        for (i, name) in FIXED_COLUMNS.iter().enumerate() {
            if fields[i].name() != name {
                anyhow::bail!(
                    "Metric table {} column {i} is {:?}, expected {:?}",
                    path.display(),
                    fields[i].name(),
                    name
                );
            }
        }
        let metrics: Vec<MetricName> = fields
            .iter()
            .skip(FIXED_COLUMNS.len())
            .map(|f| f.name().parse())
            .collect::<Result<_, _>>()?;

        let reader = builder.build()?;
        let mut records = Vec::new();
        for batch_result in reader {
            let batch = batch_result?;
            let mut batch_records = extract_records_from_batch(&batch, metrics.len())?;
            records.append(&mut batch_records);
        }

        tracing::debug!(
            rows = records.len(),
            metrics = metrics.len(),
            path = %path.display(),
            "Read metric table"
        );

        Ok(MetricTable { metrics, records })
    }
}

/// Extract metric records from a single Arrow RecordBatch.
fn extract_records_from_batch(
    batch: &RecordBatch,
    num_metrics: usize,
) -> anyhow::Result<Vec<MetricRecord>> {
    let sent_indices = batch
        .column(0)
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| anyhow::anyhow!("Column 0 (sent_index) is not UInt32Array"))?;

    let token_indices = batch
        .column(1)
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| anyhow::anyhow!("Column 1 (token_index) is not UInt32Array"))?;

    let epochs = batch
        .column(2)
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| anyhow::anyhow!("Column 2 (epoch) is not UInt32Array"))?;

    let texts = batch
        .column(3)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow::anyhow!("Column 3 (text) is not StringArray"))?;

    let observed = batch
        .column(4)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow::anyhow!("Column 4 (observed) is not StringArray"))?;

    let clean = batch
        .column(5)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow::anyhow!("Column 5 (clean) is not StringArray"))?;

    let predicted = batch
        .column(6)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow::anyhow!("Column 6 (predicted) is not StringArray"))?;

    let noisy = batch
        .column(7)
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| anyhow::anyhow!("Column 7 (noisy) is not BooleanArray"))?;

    let mut metric_columns = Vec::with_capacity(num_metrics);
    for m in 0..num_metrics {
        let index = FIXED_COLUMNS.len() + m;
        let column = batch
            .column(index)
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| anyhow::anyhow!("Column {index} (metric) is not Float64Array"))?;
        metric_columns.push(column);
    }

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        records.push(MetricRecord {
            sent_index: sent_indices.value(i),
            token_index: token_indices.value(i),
            epoch: epochs.value(i),
            text: texts.value(i).to_string(),
            observed: observed.value(i).to_string(),
            clean: clean.value(i).to_string(),
            predicted: predicted.value(i).to_string(),
            noisy: noisy.value(i),
            values: metric_columns.iter().map(|c| c.value(i)).collect(),
        });
    }

    Ok(records)
}
