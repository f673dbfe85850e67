//! Temporal linking of exams to clinical notes and exam annotations.
//!
//! Given a subject key and an exam date, the linker returns the temporally
//! closest linked items inside a bounded day window. Notes and annotations use
//! separate windows; notes additionally bracket the exam with the nearest
//! note on each side when both sides have candidates.

pub mod index;

pub use index::{DateIndex, Dated};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::LinkageWindows;
use crate::dataset::{Annotation, Note, ReferenceSources};

/// Where a linked note lies relative to the exam
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotePosition {
    Before,
    After,
    SameDay,
}

impl NotePosition {
    /// Classify a signed day offset (item date minus exam date)
    #[must_use]
    pub fn from_days_diff(days_diff: i64) -> Self {
        match days_diff.signum() {
            -1 => Self::Before,
            1 => Self::After,
            _ => Self::SameDay,
        }
    }
}

/// A note linked to an exam
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedNote {
    pub note_id: Option<String>,
    pub note_date: NaiveDate,
    pub text: String,
    /// Signed offset: note date minus exam date
    pub days_diff: i64,
    pub position: NotePosition,
}

impl LinkedNote {
    fn new(note: &Note, exam_date: NaiveDate) -> Self {
        let days_diff = days_between(exam_date, note.note_date);
        Self {
            note_id: note.note_id.clone(),
            note_date: note.note_date,
            text: note.text.clone(),
            days_diff,
            position: NotePosition::from_days_diff(days_diff),
        }
    }
}

/// An exam annotation linked to an exam
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedAnnotation {
    pub exam_field: String,
    pub value: String,
    pub laterality: String,
    pub annotation_date: NaiveDate,
    /// Signed offset: annotation date minus exam date
    pub days_diff: i64,
}

impl LinkedAnnotation {
    fn new(annotation: &Annotation, exam_date: NaiveDate) -> Self {
        Self {
            exam_field: annotation.exam_field.clone(),
            value: annotation.value.clone(),
            laterality: annotation.laterality.clone(),
            annotation_date: annotation.annotation_date,
            days_diff: days_between(exam_date, annotation.annotation_date),
        }
    }
}

/// Signed day offset from `reference` to `date`
#[must_use]
pub fn days_between(reference: NaiveDate, date: NaiveDate) -> i64 {
    (date - reference).num_days()
}

/// Nearest notes to an exam among the window candidates.
///
/// With candidates strictly before and strictly after the exam, exactly the
/// nearest on each side is returned. Otherwise every candidate tied at the
/// minimum absolute offset is returned.
#[must_use]
pub fn closest_notes(candidates: &[Note], exam_date: NaiveDate) -> Vec<LinkedNote> {
    if candidates.is_empty() {
        return Vec::new();
    }

    // Candidates are date-sorted: the nearest "before" is the latest date < exam,
    // the nearest "after" is the earliest date > exam.
    let nearest_before_date = candidates
        .iter()
        .map(Dated::date)
        .filter(|d| *d < exam_date)
        .max();
    let nearest_after = candidates.iter().find(|n| n.note_date > exam_date);

    if let (Some(before_date), Some(after)) = (nearest_before_date, nearest_after) {
        let before = candidates
            .iter()
            .find(|n| n.note_date == before_date)
            .map(|n| LinkedNote::new(n, exam_date));
        return before
            .into_iter()
            .chain(std::iter::once(LinkedNote::new(after, exam_date)))
            .collect();
    }

    all_tied_at_minimum(candidates, exam_date)
        .map(|n| LinkedNote::new(n, exam_date))
        .collect()
}

/// Every annotation tied at the minimum absolute offset. No bracketing and no
/// deduplication across exam fields.
#[must_use]
pub fn closest_annotations(candidates: &[Annotation], exam_date: NaiveDate) -> Vec<LinkedAnnotation> {
    all_tied_at_minimum(candidates, exam_date)
        .map(|a| LinkedAnnotation::new(a, exam_date))
        .collect()
}

fn all_tied_at_minimum<T: Dated>(
    candidates: &[T],
    exam_date: NaiveDate,
) -> impl Iterator<Item = &T> {
    let min_abs = candidates
        .iter()
        .map(|c| days_between(exam_date, c.date()).abs())
        .min();
    candidates
        .iter()
        .filter(move |c| Some(days_between(exam_date, c.date()).abs()) == min_abs)
}

/// Group linked annotations by laterality, preserving first-seen order
#[must_use]
pub fn group_by_laterality(annotations: &[LinkedAnnotation]) -> Vec<(String, Vec<&LinkedAnnotation>)> {
    let mut groups: Vec<(String, Vec<&LinkedAnnotation>)> = Vec::new();
    for annotation in annotations {
        match groups.iter_mut().find(|(lat, _)| *lat == annotation.laterality) {
            Some((_, members)) => members.push(annotation),
            None => groups.push((annotation.laterality.clone(), vec![annotation])),
        }
    }
    groups
}

/// Window-bounded nearest-match lookups over notes and annotations
#[derive(Debug, Clone, Default)]
pub struct TemporalLinker {
    notes: DateIndex<Note>,
    annotations: DateIndex<Annotation>,
    windows: LinkageWindows,
}

impl TemporalLinker {
    /// Index notes by patient and annotations by subject
    #[must_use]
    pub fn new(notes: Vec<Note>, annotations: Vec<Annotation>, windows: LinkageWindows) -> Self {
        let linker = Self {
            notes: DateIndex::new(notes),
            annotations: DateIndex::new(annotations),
            windows,
        };
        log::debug!(
            "Indexed {} notes for {} patients and {} annotations for {} subjects",
            linker.notes.len(),
            linker.notes.subject_count(),
            linker.annotations.len(),
            linker.annotations.subject_count()
        );
        linker
    }

    /// Build a linker from loaded reference sources
    #[must_use]
    pub fn from_sources(sources: ReferenceSources, windows: LinkageWindows) -> Self {
        Self::new(sources.notes, sources.annotations, windows)
    }

    /// The day windows in use
    #[must_use]
    pub fn windows(&self) -> LinkageWindows {
        self.windows
    }

    /// Nearest notes for a patient around an exam date
    #[must_use]
    pub fn notes_for(&self, patient_id: &str, exam_date: NaiveDate) -> Vec<LinkedNote> {
        closest_notes(
            self.notes.window(patient_id, exam_date, self.windows.notes_days),
            exam_date,
        )
    }

    /// Nearest annotations for a subject around an exam date
    #[must_use]
    pub fn annotations_for(&self, subject_id: &str, exam_date: NaiveDate) -> Vec<LinkedAnnotation> {
        closest_annotations(
            self.annotations
                .window(subject_id, exam_date, self.windows.annotations_days),
            exam_date,
        )
    }

    /// Number of notes within the note window (existence check for linkage flags)
    #[must_use]
    pub fn count_notes(&self, patient_id: &str, exam_date: NaiveDate) -> usize {
        self.notes
            .count_within(patient_id, exam_date, self.windows.notes_days)
    }

    /// Number of annotations within the annotation window
    #[must_use]
    pub fn count_annotations(&self, subject_id: &str, exam_date: NaiveDate) -> usize {
        self.annotations
            .count_within(subject_id, exam_date, self.windows.annotations_days)
    }

    /// The note index
    #[must_use]
    pub fn note_index(&self) -> &DateIndex<Note> {
        &self.notes
    }

    /// The annotation index
    #[must_use]
    pub fn annotation_index(&self) -> &DateIndex<Annotation> {
        &self.annotations
    }
}
