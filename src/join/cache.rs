//! Persisted join cache.
//!
//! The augmented join is stored as a Parquet file next to a plain-text
//! summary (`<stem>_summary.txt`). The runtime only ever reads it; it is
//! written by the offline preprocessing run.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, Field, FieldRef};
use chrono::{Local, NaiveDateTime};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::config::DATETIME_FORMAT;
use crate::error::util::{write_atomically, write_atomically_with};
use crate::error::{Error, Result};
use crate::join::record::Record;
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Arrow fields of the cache file, in column order
#[must_use]
pub fn cache_fields() -> Vec<FieldRef> {
    let text = |name: &str| Arc::new(Field::new(name, DataType::Utf8, true));
    vec![
        text("maskedid"),
        text("maskedid_studyid"),
        text("proc_name"),
        text("photo_name"),
        text("pat_mrn"),
        Arc::new(Field::new("exam_date", DataType::Date32, true)),
        text("laterality"),
        text("main_diagnosis"),
        text("order_diagnosis"),
        Arc::new(Field::new("has_notes", DataType::Boolean, false)),
        Arc::new(Field::new("notes_count", DataType::UInt32, false)),
        Arc::new(Field::new("has_annotations", DataType::Boolean, false)),
        Arc::new(Field::new("annotations_count", DataType::UInt32, false)),
    ]
}

/// Path of the summary written beside a cache file
#[must_use]
pub fn summary_path(cache_path: &Path) -> PathBuf {
    let stem = cache_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "preprocessed_dataset".to_string());
    cache_path.with_file_name(format!("{stem}_summary.txt"))
}

/// Totals recorded with a cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSummary {
    pub total_images: usize,
    pub with_notes: usize,
    pub with_annotations: usize,
    pub with_both: usize,
    pub created_at: NaiveDateTime,
}

impl CacheSummary {
    /// Count linkage flags over the augmented records
    #[must_use]
    pub fn from_records(records: &[Record]) -> Self {
        Self {
            total_images: records.len(),
            with_notes: records.iter().filter(|r| r.has_notes).count(),
            with_annotations: records.iter().filter(|r| r.has_annotations).count(),
            with_both: records
                .iter()
                .filter(|r| r.has_notes && r.has_annotations)
                .count(),
            created_at: Local::now().naive_local(),
        }
    }

    /// Render as `key: value` lines
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "total_images: {}", self.total_images);
        let _ = writeln!(out, "with_notes: {}", self.with_notes);
        let _ = writeln!(out, "with_annotations: {}", self.with_annotations);
        let _ = writeln!(out, "with_both: {}", self.with_both);
        let _ = writeln!(out, "created_at: {}", self.created_at.format(DATETIME_FORMAT));
        out
    }

    /// Parse the `key: value` text form
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let mut total_images = None;
        let mut with_notes = None;
        let mut with_annotations = None;
        let mut with_both = None;
        let mut created_at = None;

        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            let count = || value.parse::<usize>().ok();
            match key.trim() {
                "total_images" => total_images = count(),
                "with_notes" => with_notes = count(),
                "with_annotations" => with_annotations = count(),
                "with_both" => with_both = count(),
                "created_at" => {
                    created_at = NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
                        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
                        .ok();
                }
                _ => {}
            }
        }

        match (total_images, with_notes, with_annotations, with_both, created_at) {
            (Some(total_images), Some(with_notes), Some(with_annotations), Some(with_both), Some(created_at)) => {
                Ok(Self {
                    total_images,
                    with_notes,
                    with_annotations,
                    with_both,
                    created_at,
                })
            }
            _ => Err(Error::cache_unusable(path, "incomplete cache summary")),
        }
    }

    /// Read the summary beside a cache file
    pub fn read(cache_path: &Path) -> Result<Self> {
        let path = summary_path(cache_path);
        let text = fs::read_to_string(&path).map_err(|e| Error::cache_unusable(&path, e))?;
        Self::parse(&text, &path)
    }
}

/// Why the cache can or cannot be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    /// Cache present and newer than every source
    Fresh(PathBuf),
    /// Caching turned off in the configuration
    Disabled,
    /// No file at the configured path
    Missing(PathBuf),
    /// A source changed after the cache was written
    Stale { path: PathBuf, newer_source: PathBuf },
}

impl CacheStatus {
    /// Inspect the cache file against the source files' modification times
    #[must_use]
    pub fn check(cache_path: Option<&Path>, sources: &[&Path]) -> Self {
        let Some(path) = cache_path else {
            return Self::Disabled;
        };
        let Some(cache_time) = modified(path) else {
            return Self::Missing(path.to_path_buf());
        };
        for source in sources {
            if modified(source).is_some_and(|t| t > cache_time) {
                return Self::Stale {
                    path: path.to_path_buf(),
                    newer_source: source.to_path_buf(),
                };
            }
        }
        Self::Fresh(path.to_path_buf())
    }

    /// Human readable reason the slow path is taken, if any
    #[must_use]
    pub fn fallback_reason(&self) -> Option<String> {
        match self {
            Self::Fresh(_) => None,
            Self::Disabled => Some("join cache disabled in configuration".to_string()),
            Self::Missing(path) => Some(format!(
                "join cache not found at {} - run the preprocess command first",
                path.display()
            )),
            Self::Stale { path, newer_source } => Some(format!(
                "join cache {} is older than source {}",
                path.display(),
                newer_source.display()
            )),
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Write the augmented records and their summary
pub fn write_cache(path: &Path, records: &[Record]) -> Result<CacheSummary> {
    let start = std::time::Instant::now();
    log_operation_start("Writing join cache", path);

    let fields = cache_fields();
    let batch: RecordBatch = serde_arrow::to_record_batch(&fields, &records)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    write_atomically_with(path, |file| {
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    })?;

    let summary = CacheSummary::from_records(records);
    write_atomically(&summary_path(path), summary.to_text().as_bytes())?;

    log_operation_complete("wrote", path, records.len(), start.elapsed());
    Ok(summary)
}

/// Read the augmented records from a cache file. A single deserialization,
/// independent of how many notes and annotations exist.
pub fn read_cache(path: &Path) -> Result<Vec<Record>> {
    let start = std::time::Instant::now();
    log_operation_start("Loading preprocessed dataset from", path);

    let file = File::open(path).map_err(|e| Error::cache_unusable(path, e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::cache_unusable(path, e))?
        .build()
        .map_err(|e| Error::cache_unusable(path, e))?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| Error::cache_unusable(path, e))?;
        let mut chunk: Vec<Record> = serde_arrow::from_record_batch(&batch)
            .map_err(|e| Error::cache_unusable(path, e))?;
        records.append(&mut chunk);
    }

    log_operation_complete("loaded", path, records.len(), start.elapsed());
    Ok(records)
}
