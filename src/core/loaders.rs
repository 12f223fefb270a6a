//! Localization container and CSV loader.
//!
//! Localization tables are read from CSV files with (case-insensitive) `x`,
//! `y` and `frame` columns; any other columns are ignored.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error on line {line}: {message}")]
    ParseError { line: u64, message: String },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Localizations as parallel coordinate and frame columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Localizations {
    /// X coordinates of all points.
    pub x: Vec<f64>,
    /// Y coordinates of all points.
    pub y: Vec<f64>,
    /// Acquisition frame of each point.
    pub frame: Vec<u32>,
}

impl Localizations {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set from its columns.
    pub fn from_columns(x: Vec<f64>, y: Vec<f64>, frame: Vec<u32>) -> Self {
        Self { x, y, frame }
    }

    /// Creates an empty set with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            frame: Vec::with_capacity(capacity),
        }
    }

    /// Number of localizations.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    #[inline]
    pub fn push(&mut self, x: f64, y: f64, frame: u32) {
        self.x.push(x);
        self.y.push(y);
        self.frame.push(frame);
    }

    /// Largest frame index, 0 for an empty set.
    pub fn max_frame(&self) -> u32 {
        self.frame.iter().copied().max().unwrap_or(0)
    }

    /// Keeps the localizations whose label satisfies `keep`.
    pub fn select_by_label<F>(&self, labels: &[i32], keep: F) -> Self
    where
        F: Fn(i32) -> bool,
    {
        let mut out = Self::new();
        for (i, &label) in labels.iter().enumerate().take(self.len()) {
            if keep(label) {
                out.push(self.x[i], self.y[i], self.frame[i]);
            }
        }
        out
    }
}

/// Load localizations from a CSV file with `x`, `y` and `frame` columns.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a required column is
/// missing, a value fails to parse (negative frames included) or the file
/// has no data rows.
pub fn load_locs_csv<P: AsRef<Path>>(path: P) -> Result<Localizations> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect();

    let missing: Vec<&str> = ["x", "y", "frame"]
        .into_iter()
        .filter(|name| !col_map.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(LoaderError::MissingColumns(missing.join(", ")));
    }
    let x_idx = col_map["x"];
    let y_idx = col_map["y"];
    let frame_idx = col_map["frame"];

    let mut locs = Localizations::with_capacity(10_000);

    for result in reader.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());

        let field = |idx: usize, name: &'static str| {
            record.get(idx).map(str::trim).ok_or_else(|| LoaderError::ParseError {
                line,
                message: format!("missing {} value", name),
            })
        };

        let x: f64 = field(x_idx, "x")?.parse().map_err(|_| LoaderError::ParseError {
            line,
            message: format!("invalid x value: {}", record.get(x_idx).unwrap_or_default()),
        })?;
        let y: f64 = field(y_idx, "y")?.parse().map_err(|_| LoaderError::ParseError {
            line,
            message: format!("invalid y value: {}", record.get(y_idx).unwrap_or_default()),
        })?;
        let frame: u32 = field(frame_idx, "frame")?
            .parse()
            .map_err(|_| LoaderError::ParseError {
                line,
                message: format!(
                    "invalid frame value: {}",
                    record.get(frame_idx).unwrap_or_default()
                ),
            })?;

        locs.push(x, y, frame);
    }

    if locs.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(locs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_localizations_operations() {
        let mut locs = Localizations::new();
        assert!(locs.is_empty());
        assert_eq!(locs.max_frame(), 0);

        locs.push(1.0, 2.0, 7);
        locs.push(3.0, 4.0, 3);

        assert_eq!(locs.len(), 2);
        assert_eq!(locs.max_frame(), 7);

        let kept = locs.select_by_label(&[-1, 0], |l| l >= 0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.x[0], 3.0);
        assert_eq!(kept.frame[0], 3);
    }

    #[test]
    fn test_load_locs_csv() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Frame,X,Y,photons").unwrap();
        writeln!(file, "0,1.5,2.5,1000").unwrap();
        writeln!(file, "12,3.0,4.0,800").unwrap();
        file.flush().unwrap();

        let locs = load_locs_csv(file.path())?;
        assert_eq!(locs.len(), 2);
        assert_eq!(locs.x[0], 1.5);
        assert_eq!(locs.y[1], 4.0);
        assert_eq!(locs.frame, vec![0, 12]);

        Ok(())
    }

    #[test]
    fn test_load_locs_csv_missing_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "x,y").unwrap();
        writeln!(file, "1.0,2.0").unwrap();
        file.flush().unwrap();

        let err = load_locs_csv(file.path()).unwrap_err();
        assert!(matches!(err, LoaderError::MissingColumns(ref c) if c == "frame"));
    }

    #[test]
    fn test_load_locs_csv_negative_frame() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "x,y,frame").unwrap();
        writeln!(file, "1.0,2.0,-3").unwrap();
        file.flush().unwrap();

        let err = load_locs_csv(file.path()).unwrap_err();
        assert!(matches!(err, LoaderError::ParseError { .. }));
    }

    #[test]
    fn test_load_locs_csv_empty() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "x,y,frame").unwrap();
        file.flush().unwrap();

        let err = load_locs_csv(file.path()).unwrap_err();
        assert!(matches!(err, LoaderError::EmptyFile(_)));
    }
}
