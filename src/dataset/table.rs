//! Tabular source reading.
//!
//! Sources are CSV or Parquet files. Every column is materialized as text so
//! that numeric and string encodings of the same identifier compare equal
//! after normalization.

use std::fs::File;
use std::io::Seek;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, StringArray};
use arrow::compute::cast;
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rustc_hash::FxHashMap;

use crate::error::util::safe_open_file;
use crate::error::{Error, Result};
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Default batch size for source reading
pub const DEFAULT_BATCH_SIZE: usize = 16384;

/// Supported on-disk source formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Parquet,
}

impl SourceFormat {
    /// Pick the format from the file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") | Some("txt") => Ok(Self::Csv),
            Some("parquet") | Some("pq") => Ok(Self::Parquet),
            Some(other) => Err(Error::source_unreadable(
                path,
                format!("unsupported source format '.{other}' (expected .csv or .parquet)"),
            )),
            None => Err(Error::source_unreadable(
                path,
                "source file has no extension (expected .csv or .parquet)",
            )),
        }
    }
}

/// A fully loaded source with every column held as optional text
#[derive(Debug, Clone)]
pub struct TextTable {
    path: PathBuf,
    headers: Vec<String>,
    num_rows: usize,
    columns: FxHashMap<String, Vec<Option<String>>>,
}

impl TextTable {
    /// Read a CSV or Parquet file
    pub fn read(path: &Path, purpose: &str) -> Result<Self> {
        let start = std::time::Instant::now();
        log_operation_start(&format!("Reading {purpose} source"), path);

        let batches = match SourceFormat::from_path(path)? {
            SourceFormat::Csv => read_csv_batches(path, purpose)?,
            SourceFormat::Parquet => read_parquet_batches(path, purpose)?,
        };

        let table = Self::from_batches(path, &batches)?;
        log_operation_complete("read", path, table.num_rows, start.elapsed());
        Ok(table)
    }

    /// Build a table from record batches, casting each column to text
    pub fn from_batches(path: &Path, batches: &[RecordBatch]) -> Result<Self> {
        let mut headers = Vec::new();
        let mut columns: FxHashMap<String, Vec<Option<String>>> = FxHashMap::default();
        let mut num_rows = 0;

        if let Some(first) = batches.first() {
            for field in first.schema().fields() {
                headers.push(field.name().trim().to_string());
            }
        }

        for batch in batches {
            num_rows += batch.num_rows();
            for (idx, field) in batch.schema().fields().iter().enumerate() {
                let text = cast(batch.column(idx), &DataType::Utf8).map_err(|e| {
                    Error::source_unreadable(
                        path,
                        format!("column '{}' cannot be read as text: {e}", field.name()),
                    )
                })?;
                let strings = text
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or_else(|| {
                        Error::source_unreadable(
                            path,
                            format!("column '{}' is not a string array", field.name()),
                        )
                    })?;

                let values = columns.entry(field.name().trim().to_string()).or_default();
                values.extend((0..strings.len()).map(|i| {
                    if strings.is_null(i) {
                        None
                    } else {
                        Some(strings.value(i).to_string())
                    }
                }));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            num_rows,
            columns,
        })
    }

    /// The file this table was read from
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Column names in file order
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data rows
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Find a column by any of its accepted names
    #[must_use]
    pub fn optional_column(&self, aliases: &[&str]) -> Option<&[Option<String>]> {
        aliases
            .iter()
            .find_map(|name| self.columns.get(*name))
            .map(Vec::as_slice)
    }

    /// Find a required column by any of its accepted names
    pub fn column(&self, aliases: &[&str]) -> Result<&[Option<String>]> {
        self.optional_column(aliases)
            .ok_or_else(|| Error::MissingColumn {
                path: self.path.clone(),
                column: aliases.first().copied().unwrap_or_default().to_string(),
            })
    }
}

fn read_csv_batches(path: &Path, purpose: &str) -> Result<Vec<RecordBatch>> {
    let mut file = safe_open_file(path, purpose)?;

    // Only the header names are taken from inference; every column is read as text
    let format = Format::default().with_header(true);
    let (inferred, _) = format
        .infer_schema(&mut file, Some(0))
        .map_err(|e| Error::source_unreadable(path, e))?;
    file.rewind()?;

    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), DataType::Utf8, true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let reader = ReaderBuilder::new(schema)
        .with_format(format)
        .with_batch_size(DEFAULT_BATCH_SIZE)
        .build(file)
        .map_err(|e| Error::source_unreadable(path, e))?;

    reader
        .map(|batch| batch.map_err(|e| Error::source_unreadable(path, e)))
        .collect()
}

fn read_parquet_batches(path: &Path, purpose: &str) -> Result<Vec<RecordBatch>> {
    let file: File = safe_open_file(path, purpose)?;

    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::source_unreadable(path, e))?
        .with_batch_size(DEFAULT_BATCH_SIZE)
        .build()
        .map_err(|e| Error::source_unreadable(path, e))?;

    reader
        .map(|batch| batch.map_err(|e| Error::source_unreadable(path, e)))
        .collect()
}
