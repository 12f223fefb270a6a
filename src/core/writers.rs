//! CSV writers for clustering results.
//!
//! - labeled localizations: `x,y,frame,label`
//! - per-cluster summary: one row per cluster that survived the size filter

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use super::loaders::Localizations;
use crate::processors::temporal::ClusterStats;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to flush data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("length mismatch: {locs_len} localizations, {labels_len} labels")]
    LengthMismatch { locs_len: usize, labels_len: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// CSV writer over a buffered file, with parent directories created.
struct CsvSink {
    writer: csv::Writer<BufWriter<File>>,
    path: String,
}

impl CsvSink {
    fn create(path: &Path) -> Result<Self> {
        ensure_parent_dirs(path)?;
        let file = File::create(path).map_err(|e| WriteError::CreateFile {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(Self {
            writer: csv::Writer::from_writer(BufWriter::new(file)),
            path: path.display().to_string(),
        })
    }

    fn record<I, T>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer
            .write_record(fields)
            .map_err(|e| WriteError::CsvError {
                path: self.path.clone(),
                source: e,
            })
    }

    fn finish(mut self) -> Result<()> {
        self.writer.flush().map_err(|e| WriteError::WriteFile {
            path: self.path,
            source: e,
        })
    }
}

/// Write localizations with their cluster labels.
///
/// Coordinates are written with full precision so the file can be clustered
/// again with identical results. Noise is written as `-1`.
///
/// # Errors
///
/// Returns an error if `labels` does not have one entry per localization or
/// the file cannot be created or written.
///
/// # Example
///
/// ```no_run
/// use paint_cluster::core::loaders::Localizations;
/// use paint_cluster::core::writers::write_labels_csv;
/// use std::path::Path;
///
/// let locs = Localizations::from_columns(vec![1.0, 2.0], vec![3.0, 4.0], vec![0, 5]);
/// write_labels_csv(Path::new("labels.csv"), &locs, &[0, -1]).unwrap();
/// ```
pub fn write_labels_csv(path: &Path, locs: &Localizations, labels: &[i32]) -> Result<()> {
    if locs.len() != labels.len() {
        return Err(WriteError::LengthMismatch {
            locs_len: locs.len(),
            labels_len: labels.len(),
        });
    }

    let mut sink = CsvSink::create(path)?;
    sink.record(["x", "y", "frame", "label"])?;
    for (i, label) in labels.iter().enumerate() {
        sink.record([
            locs.x[i].to_string(),
            locs.y[i].to_string(),
            locs.frame[i].to_string(),
            label.to_string(),
        ])?;
    }
    sink.finish()
}

/// Write the per-cluster summary.
///
/// `label` is left empty for clusters rejected by temporal validation.
pub fn write_cluster_stats_csv(path: &Path, stats: &[ClusterStats]) -> Result<()> {
    let mut sink = CsvSink::create(path)?;
    sink.record([
        "cluster",
        "n_locs",
        "mean_frame",
        "max_window_fraction",
        "center_x",
        "center_y",
        "accepted",
        "label",
    ])?;
    for s in stats {
        sink.record([
            s.id.to_string(),
            s.n_locs.to_string(),
            format!("{:.3}", s.mean_frame),
            format!("{:.4}", s.max_window_fraction),
            format!("{:.6}", s.center_x),
            format!("{:.6}", s.center_y),
            s.accepted.to_string(),
            s.label.map(|l| l.to_string()).unwrap_or_default(),
        ])?;
    }
    sink.finish()
}
