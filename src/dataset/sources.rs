//! Typed rows of the four raw sources.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dataset::date::{DateFormatConfig, parse_date_string};
use crate::dataset::keys::{normalize_key, normalize_opt};
use crate::dataset::table::TextTable;
use crate::error::{Error, Result};

/// Column names accepted for each logical field
pub mod columns {
    pub const MASKED_ID: &[&str] = &["maskedid"];
    pub const STUDY_ID: &[&str] = &["maskedid_studyid"];
    pub const PATIENT_ID: &[&str] = &["pat_mrn"];
    pub const EXAM_DATE: &[&str] = &["exam_date"];
    pub const LATERALITY: &[&str] = &["laterality"];
    pub const MAIN_DIAGNOSIS: &[&str] = &["main_diagnosis"];
    pub const ORDER_DIAGNOSIS: &[&str] = &["order_diagnosis"];
    pub const PROC_NAME: &[&str] = &["proc_name"];
    pub const PHOTO_NAME: &[&str] = &["photo_name"];

    pub const NOTE_ID: &[&str] = &["note_id"];
    pub const NOTE_DATE: &[&str] = &["note_date"];
    pub const NOTE_TEXT: &[&str] = &["note_text"];
    pub const NOTE_TYPE: &[&str] = &["ip_note_type"];

    pub const ANNOTATION_SUBJECT: &[&str] = &["maskedid", "studyid"];
    pub const ANNOTATION_DATE: &[&str] = &["annotation_date", "date"];
    pub const EXAM_FIELD: &[&str] = &["examfield"];
    pub const VALUE: &[&str] = &["value"];
}

/// One image row of the crosswalk table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrosswalkRow {
    pub masked_id: Option<String>,
    pub study_id: Option<String>,
    pub proc_name: Option<String>,
    pub photo_name: Option<String>,
    pub patient_id: Option<String>,
    pub exam_date: Option<NaiveDate>,
    pub laterality: Option<String>,
    pub main_diagnosis: Option<String>,
    pub order_diagnosis: Option<String>,
}

/// One exam row of the diagnosis table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisRow {
    pub study_id: Option<String>,
    pub patient_id: Option<String>,
    pub exam_date: Option<NaiveDate>,
    pub laterality: Option<String>,
    pub main_diagnosis: Option<String>,
    pub order_diagnosis: Option<String>,
}

/// A free-text clinical note. Read-only reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub note_id: Option<String>,
    pub patient_id: String,
    pub note_date: NaiveDate,
    pub text: String,
    pub note_type: Option<String>,
}

/// A structured exam annotation. Read-only reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub subject_id: String,
    pub exam_field: String,
    pub value: String,
    pub laterality: String,
    pub annotation_date: NaiveDate,
}

/// Column accessor that applies key normalization and date parsing row by row
struct RowReader<'a> {
    table: &'a TextTable,
    dates: &'a DateFormatConfig,
}

impl<'a> RowReader<'a> {
    fn new(table: &'a TextTable, dates: &'a DateFormatConfig) -> Self {
        Self { table, dates }
    }

    fn required(&self, aliases: &[&str]) -> Result<&'a [Option<String>]> {
        self.table.column(aliases)
    }

    fn optional(&self, aliases: &[&str]) -> Option<&'a [Option<String>]> {
        self.table.optional_column(aliases)
    }

    fn key(column: Option<&[Option<String>]>, row: usize) -> Option<String> {
        column.and_then(|c| normalize_opt(c[row].as_deref()))
    }

    fn text(column: Option<&[Option<String>]>, row: usize) -> Option<String> {
        column
            .and_then(|c| c[row].as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Parse a date cell. Blank cells are `None`; anything else that does not
    /// parse makes the whole source unreadable.
    fn date(&self, column: Option<&[Option<String>]>, row: usize, name: &str) -> Result<Option<NaiveDate>> {
        let Some(raw) = column.and_then(|c| c[row].as_deref()) else {
            return Ok(None);
        };
        if normalize_key(raw).is_none() {
            return Ok(None);
        }
        parse_date_string(raw, self.dates).map(Some).ok_or_else(|| {
            Error::source_unreadable(
                self.table.path(),
                format!("invalid date '{raw}' in column '{name}' at row {}", row + 1),
            )
        })
    }
}

/// Parse crosswalk rows
pub fn crosswalk_rows(table: &TextTable, dates: &DateFormatConfig) -> Result<Vec<CrosswalkRow>> {
    let r = RowReader::new(table, dates);
    let masked = Some(r.required(columns::MASKED_ID)?);
    let study = Some(r.required(columns::STUDY_ID)?);
    let proc_name = Some(r.required(columns::PROC_NAME)?);
    let photo = Some(r.required(columns::PHOTO_NAME)?);
    let patient = r.optional(columns::PATIENT_ID);
    let exam_date = r.optional(columns::EXAM_DATE);
    let laterality = r.optional(columns::LATERALITY);
    let main_dx = r.optional(columns::MAIN_DIAGNOSIS);
    let order_dx = r.optional(columns::ORDER_DIAGNOSIS);

    (0..table.num_rows())
        .map(|row| {
            Ok(CrosswalkRow {
                masked_id: RowReader::key(masked, row),
                study_id: RowReader::key(study, row),
                proc_name: RowReader::text(proc_name, row),
                photo_name: RowReader::text(photo, row),
                patient_id: RowReader::key(patient, row),
                exam_date: r.date(exam_date, row, "exam_date")?,
                laterality: RowReader::text(laterality, row),
                main_diagnosis: RowReader::text(main_dx, row),
                order_diagnosis: RowReader::text(order_dx, row),
            })
        })
        .collect()
}

/// Parse diagnosis rows
pub fn diagnosis_rows(table: &TextTable, dates: &DateFormatConfig) -> Result<Vec<DiagnosisRow>> {
    let r = RowReader::new(table, dates);
    let study = Some(r.required(columns::STUDY_ID)?);
    let patient = Some(r.required(columns::PATIENT_ID)?);
    let exam_date = Some(r.required(columns::EXAM_DATE)?);
    let laterality = r.optional(columns::LATERALITY);
    let main_dx = r.optional(columns::MAIN_DIAGNOSIS);
    let order_dx = r.optional(columns::ORDER_DIAGNOSIS);

    (0..table.num_rows())
        .map(|row| {
            Ok(DiagnosisRow {
                study_id: RowReader::key(study, row),
                patient_id: RowReader::key(patient, row),
                exam_date: r.date(exam_date, row, "exam_date")?,
                laterality: RowReader::text(laterality, row),
                main_diagnosis: RowReader::text(main_dx, row),
                order_diagnosis: RowReader::text(order_dx, row),
            })
        })
        .collect()
}

/// Parse notes, keeping only `note_type` when the source carries a note-type column.
///
/// Notes without a patient or a date can never be linked and are dropped.
pub fn note_rows(
    table: &TextTable,
    dates: &DateFormatConfig,
    note_type: Option<&str>,
) -> Result<Vec<Note>> {
    let r = RowReader::new(table, dates);
    let patient = Some(r.required(columns::PATIENT_ID)?);
    let note_date = Some(r.required(columns::NOTE_DATE)?);
    let text = r.required(columns::NOTE_TEXT)?;
    let note_id = r.optional(columns::NOTE_ID);
    let types = r.optional(columns::NOTE_TYPE);

    if note_type.is_some() && types.is_none() {
        log::warn!(
            "Column 'ip_note_type' not found in {} - using all notes",
            table.path().display()
        );
    }

    let mut notes = Vec::with_capacity(table.num_rows());
    let mut unlinkable = 0usize;
    for row in 0..table.num_rows() {
        let kind = RowReader::text(types, row);
        if let (Some(wanted), Some(_)) = (note_type, types) {
            if kind.as_deref() != Some(wanted) {
                continue;
            }
        }

        let date = r.date(note_date, row, "note_date")?;
        match (RowReader::key(patient, row), date) {
            (Some(patient_id), Some(note_date)) => notes.push(Note {
                note_id: RowReader::key(note_id, row),
                patient_id,
                note_date,
                text: text[row].clone().unwrap_or_default(),
                note_type: kind,
            }),
            _ => unlinkable += 1,
        }
    }

    if let Some(wanted) = note_type.filter(|_| types.is_some()) {
        log::info!(
            "Filtered to {wanted}: {} / {} notes",
            notes.len() + unlinkable,
            table.num_rows()
        );
    }
    if unlinkable > 0 {
        log::warn!(
            "Skipped {unlinkable} notes without patient id or date in {}",
            table.path().display()
        );
    }
    Ok(notes)
}

/// Parse structured exam annotations.
///
/// Annotations without a subject or a date can never be linked and are dropped.
pub fn annotation_rows(table: &TextTable, dates: &DateFormatConfig) -> Result<Vec<Annotation>> {
    let r = RowReader::new(table, dates);
    let subject = Some(r.required(columns::ANNOTATION_SUBJECT)?);
    let ann_date = Some(r.required(columns::ANNOTATION_DATE)?);
    let field = r.optional(columns::EXAM_FIELD);
    let value = r.optional(columns::VALUE);
    let laterality = r.optional(columns::LATERALITY);

    let mut annotations = Vec::with_capacity(table.num_rows());
    let mut unlinkable = 0usize;
    for row in 0..table.num_rows() {
        let date = r.date(ann_date, row, "annotation_date")?;
        match (RowReader::key(subject, row), date) {
            (Some(subject_id), Some(annotation_date)) => annotations.push(Annotation {
                subject_id,
                exam_field: RowReader::text(field, row).unwrap_or_else(|| "Unknown".to_string()),
                value: RowReader::text(value, row).unwrap_or_else(|| "N/A".to_string()),
                laterality: RowReader::text(laterality, row)
                    .unwrap_or_else(|| "Unknown".to_string()),
                annotation_date,
            }),
            _ => unlinkable += 1,
        }
    }

    if unlinkable > 0 {
        log::warn!(
            "Skipped {unlinkable} annotations without subject id or date in {}",
            table.path().display()
        );
    }
    Ok(annotations)
}

/// Read and parse the crosswalk source
pub fn load_crosswalk(path: &Path, dates: &DateFormatConfig) -> Result<Vec<CrosswalkRow>> {
    crosswalk_rows(&TextTable::read(path, "crosswalk")?, dates)
}

/// Read and parse the diagnosis source
pub fn load_diagnoses(path: &Path, dates: &DateFormatConfig) -> Result<Vec<DiagnosisRow>> {
    diagnosis_rows(&TextTable::read(path, "diagnosis")?, dates)
}

/// Read and parse the notes source
pub fn load_notes(path: &Path, dates: &DateFormatConfig, note_type: Option<&str>) -> Result<Vec<Note>> {
    note_rows(&TextTable::read(path, "clinical notes")?, dates, note_type)
}

/// Read and parse the annotation source
pub fn load_annotations(path: &Path, dates: &DateFormatConfig) -> Result<Vec<Annotation>> {
    annotation_rows(&TextTable::read(path, "exam annotations")?, dates)
}
