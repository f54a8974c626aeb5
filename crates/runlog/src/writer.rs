//! Writes per-run metric tables to Parquet files using Arrow.

use crate::types::MetricRecord;
use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use sample_metrics::MetricName;
use std::path::PathBuf;
use std::sync::Arc;

/// Names of the fixed leading columns, before the metric columns.
pub const FIXED_COLUMNS: [&str; 8] = [
    "sent_index",
    "token_index",
    "epoch",
    "text",
    "observed",
    "clean",
    "predicted",
    "noisy",
];

/// Arrow schema for a metric table: the fixed columns followed by one
/// Float64 column per configured metric, in configuration order.
pub fn metric_schema(metrics: &[MetricName]) -> Schema {
    let mut fields = vec![
        Field::new("sent_index", DataType::UInt32, false),
        Field::new("token_index", DataType::UInt32, false),
        Field::new("epoch", DataType::UInt32, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("observed", DataType::Utf8, false),
        Field::new("clean", DataType::Utf8, false),
        Field::new("predicted", DataType::Utf8, false),
        Field::new("noisy", DataType::Boolean, false),
    ];
    for metric in metrics {
        fields.push(Field::new(metric.as_str(), DataType::Float64, false));
    }
    Schema::new(fields)
}

/// Buffers metric records and writes them to a Parquet file.
pub struct MetricWriter {
    metrics: Vec<MetricName>,
    records: Vec<MetricRecord>,
    output_path: PathBuf,
}

impl MetricWriter {
    /// Create a writer for the given metric columns.
    pub fn new(output_path: PathBuf, metrics: Vec<MetricName>) -> Self {
        Self {
            metrics,
            records: Vec::new(),
            output_path,
        }
    }

    /// The configured metric columns, in table order.
    pub fn metrics(&self) -> &[MetricName] {
        &self.metrics
    }

    /// Buffer a single record.
    pub fn record(&mut self, record: MetricRecord) {
        self.records.push(record);
    }

    /// Buffer multiple records.
    pub fn record_all(&mut self, records: Vec<MetricRecord>) {
        self.records.extend(records);
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write all buffered records to the Parquet file and return the path.
    /// Fails if any record's value vector does not match the metric columns.
    pub fn finish(self) -> anyhow::Result<PathBuf> {
        let schema = Arc::new(metric_schema(&self.metrics));

        let batch = if self.records.is_empty() {
            RecordBatch::new_empty(schema.clone())
        } else {
            build_record_batch(&self.metrics, &self.records)?
        };

        if let Some(parent) = self.output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(&self.output_path)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;

        tracing::info!(
            records = self.records.len(),
            path = %self.output_path.display(),
            "Wrote metric Parquet file"
        );

        Ok(self.output_path)
    }
}

/// Build an Arrow RecordBatch from metric records.
fn build_record_batch(
    metrics: &[MetricName],
    records: &[MetricRecord],
) -> anyhow::Result<RecordBatch> {
    for (i, record) in records.iter().enumerate() {
        if record.values.len() != metrics.len() {
            anyhow::bail!(
                "Record {i} has {} metric values, table has {} metric columns",
                record.values.len(),
                metrics.len()
            );
        }
    }

    let schema = Arc::new(metric_schema(metrics));

    let sent_indices: UInt32Array = records.iter().map(|r| Some(r.sent_index)).collect();
    let token_indices: UInt32Array = records.iter().map(|r| Some(r.token_index)).collect();
    let epochs: UInt32Array = records.iter().map(|r| Some(r.epoch)).collect();
    let texts: StringArray = records.iter().map(|r| Some(r.text.as_str())).collect();
    let observed: StringArray = records.iter().map(|r| Some(r.observed.as_str())).collect();
    let clean: StringArray = records.iter().map(|r| Some(r.clean.as_str())).collect();
    let predicted: StringArray = records.iter().map(|r| Some(r.predicted.as_str())).collect();
    let noisy: BooleanArray = records.iter().map(|r| Some(r.noisy)).collect();

    let mut columns: Vec<Arc<dyn arrow::array::Array>> = vec![
        Arc::new(sent_indices),
        Arc::new(token_indices),
        Arc::new(epochs),
        Arc::new(texts),
        Arc::new(observed),
        Arc::new(clean),
        Arc::new(predicted),
        Arc::new(noisy),
    ];
    for column in 0..metrics.len() {
        let values: Float64Array = records.iter().map(|r| Some(r.values[column])).collect();
        columns.push(Arc::new(values));
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}
