//! Saved session data
//!
//! One long-format columnar table per run, with columns `channel` (Utf8),
//! `time` (Float64), `value` (Float64) and `measured` (Boolean), written as Parquet
//! under the session's save path. Loading reconstructs the same channel
//! streams. Optionally each run is mirrored to a MATLAB Level-4 `.mat` file
//! (one N×2 time/value matrix per channel) for cross-tool consumption.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, BooleanArray, Float64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use tracing::info;

use crate::logs::{LogData, Sample};
use crate::{Error, Result};

/// Reconciled raw data for one session: one table per run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionData {
    runs: Vec<LogData>,
}

impl SessionData {
    /// Wrap per-run tables (a single-run session is a one-element list).
    #[must_use]
    pub fn new(runs: Vec<LogData>) -> Self {
        Self { runs }
    }

    /// Per-run tables in run order.
    #[must_use]
    pub fn runs(&self) -> &[LogData] {
        &self.runs
    }

    /// Save each run to its expected data file, optionally mirroring a
    /// `.mat` file alongside.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] when run count and path count disagree; IO/Arrow/
    /// Parquet failures otherwise.
    pub fn save(&self, data_paths: &[impl AsRef<Path>], save_mat: bool) -> Result<()> {
        if self.runs.len() != data_paths.len() {
            return Err(Error::Storage(format!(
                "{} run(s) but {} data path(s)",
                self.runs.len(),
                data_paths.len()
            )));
        }
        for (run, path) in self.runs.iter().zip(data_paths) {
            let path = path.as_ref();
            write_parquet(run, path)?;
            info!(path = %path.display(), "saved session data");
            if save_mat {
                let mat_path = path.with_extension("mat");
                write_mat(run, &mat_path)?;
                info!(path = %mat_path.display(), "saved .mat mirror");
            }
        }
        Ok(())
    }

    /// Load previously saved per-run tables.
    ///
    /// # Errors
    ///
    /// IO/Parquet failure, or [`Error::Storage`] on an unexpected schema.
    pub fn load(data_paths: &[impl AsRef<Path>]) -> Result<Self> {
        let runs = data_paths
            .iter()
            .map(|p| read_parquet(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { runs })
    }
}

fn schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("channel", DataType::Utf8, false),
        Field::new("time", DataType::Float64, false),
        Field::new("value", DataType::Float64, false),
        Field::new("measured", DataType::Boolean, false),
    ]))
}

/// Flatten channel streams into one long-format record batch.
///
/// # Errors
///
/// Arrow failure constructing the batch.
pub fn to_record_batch(data: &LogData) -> Result<RecordBatch> {
    let total: usize = data.values().map(Vec::len).sum();
    let mut channels = Vec::with_capacity(total);
    let mut times = Vec::with_capacity(total);
    let mut values = Vec::with_capacity(total);
    let mut measured = Vec::with_capacity(total);
    for (channel, samples) in data {
        for sample in samples {
            channels.push(channel.as_str());
            times.push(sample.time);
            values.push(sample.value);
            measured.push(sample.measured);
        }
    }

    Ok(RecordBatch::try_new(
        schema(),
        vec![
            Arc::new(StringArray::from(channels)),
            Arc::new(Float64Array::from(times)),
            Arc::new(Float64Array::from(values)),
            Arc::new(BooleanArray::from(measured)),
        ],
    )?)
}

/// Rebuild channel streams from a long-format record batch.
///
/// # Errors
///
/// [`Error::Storage`] when a column is missing or has the wrong type.
pub fn from_record_batch(batch: &RecordBatch) -> Result<LogData> {
    let channels = column::<StringArray>(batch, "channel")?;
    let times = column::<Float64Array>(batch, "time")?;
    let values = column::<Float64Array>(batch, "value")?;
    let measured = column::<BooleanArray>(batch, "measured")?;

    let mut data = LogData::new();
    for row in 0..batch.num_rows() {
        data.entry(channels.value(row).to_string())
            .or_default()
            .push(Sample {
                time: times.value(row),
                value: values.value(row),
                measured: measured.value(row),
            });
    }
    Ok(data)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::Storage(format!("saved table is missing column `{name}`")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::Storage(format!("saved table column `{name}` has the wrong type")))
}

fn write_parquet(data: &LogData, path: &Path) -> Result<()> {
    let batch = to_record_batch(data)?;
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn read_parquet(path: &Path) -> Result<LogData> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut data = LogData::new();
    for batch in reader {
        for (channel, mut samples) in from_record_batch(&batch?)? {
            data.entry(channel).or_default().append(&mut samples);
        }
    }
    Ok(data)
}

/// MATLAB Level-4 mirror: one `mrows`×2 double matrix per channel, columns
/// time then value, names sanitized to MATLAB identifiers.
fn write_mat(data: &LogData, path: &Path) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for (channel, samples) in data {
        let name = matlab_identifier(channel);
        let rows = i32::try_from(samples.len())
            .map_err(|_| Error::Storage(format!("channel `{channel}` too long for .mat mirror")))?;

        // Level-4 header: type (0 = LE double matrix), mrows, ncols, imagf,
        // name length including the trailing NUL
        for word in [0i32, rows, 2, 0, i32::try_from(name.len()).unwrap_or(i32::MAX) + 1] {
            w.write_all(&word.to_le_bytes())?;
        }
        w.write_all(name.as_bytes())?;
        w.write_all(&[0])?;

        // column-major payload: all times, then all values
        for sample in samples {
            w.write_all(&sample.time.to_le_bytes())?;
        }
        for sample in samples {
            w.write_all(&sample.value.to_le_bytes())?;
        }
    }
    w.flush()?;
    Ok(())
}

fn matlab_identifier(channel: &str) -> String {
    let mut name: String = channel
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        name.insert(0, 'c');
    }
    name
}
