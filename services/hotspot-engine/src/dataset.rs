//! CSV datasets of observed locations.

use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const LAT_COLUMN: &str = "lat";
pub const LONG_COLUMN: &str = "long";
pub const RISK_SCORE_COLUMN: &str = "risk_score";

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("dataset file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read dataset: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV has no header row")]
    MissingHeader,
}

#[derive(Error, Debug, PartialEq)]
pub enum ColumnError {
    #[error("dataset has no '{0}' column")]
    Missing(String),

    #[error("column '{column}' row {row}: '{value}' is not a finite number")]
    NotNumeric {
        column: String,
        row: usize,
        value: String,
    },
}

/// A parsed CSV file: header names plus every record, in file order.
#[derive(Debug, Clone)]
pub struct Dataset {
    headers: Vec<String>,
    records: Vec<StringRecord>,
}

impl Dataset {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.is_empty() || headers.iter().all(String::is_empty) {
            return Err(DatasetError::MissingHeader);
        }

        let records = reader.records().collect::<Result<Vec<_>, _>>()?;
        Ok(Self { headers, records })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DatasetError> {
        Self::from_reader(bytes)
    }

    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DatasetError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_reader(io::BufReader::new(file))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_columns(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.column_index(name).is_some())
    }

    /// Every value of `name` parsed as a finite float, in row order.
    pub fn column_f64(&self, name: &str) -> Result<Vec<f64>, ColumnError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| ColumnError::Missing(name.to_string()))?;

        self.records
            .iter()
            .enumerate()
            .map(|(row, record)| {
                let raw = record.get(idx).unwrap_or("");
                raw.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| ColumnError::NotNumeric {
                        column: name.to_string(),
                        row: row + 1,
                        value: raw.to_string(),
                    })
            })
            .collect()
    }

    /// `(lat, long)` pairs in row order.
    pub fn coordinates(&self) -> Result<Vec<(f64, f64)>, ColumnError> {
        let lats = self.column_f64(LAT_COLUMN)?;
        let longs = self.column_f64(LONG_COLUMN)?;
        Ok(lats.into_iter().zip(longs).collect())
    }
}

/// Atomically replaces `path` with `bytes`, creating parent directories.
pub fn replace_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("dataset");
    let tmp_path = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let result = (|| {
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
