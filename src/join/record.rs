//! The joined image/exam record.

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

/// One row of the joined dataset: a crosswalk image row enriched with its
/// diagnosis record and linkage flags.
///
/// Records carry no persistent index; a record's index is its position in the
/// current filtered view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "maskedid")]
    pub masked_id: Option<String>,
    #[serde(rename = "maskedid_studyid")]
    pub study_id: Option<String>,
    pub proc_name: Option<String>,
    pub photo_name: Option<String>,
    #[serde(rename = "pat_mrn")]
    pub patient_id: Option<String>,
    pub exam_date: Option<NaiveDate>,
    pub laterality: Option<String>,
    pub main_diagnosis: Option<String>,
    pub order_diagnosis: Option<String>,
    pub has_notes: bool,
    pub notes_count: u32,
    pub has_annotations: bool,
    pub annotations_count: u32,
}

impl Record {
    /// Location of the image: `base / maskedid / maskedid_studyid / proc_name / photo_name`
    #[must_use]
    pub fn image_path(&self, base: &Path) -> PathBuf {
        let mut path = base.to_path_buf();
        for part in [&self.masked_id, &self.study_id, &self.proc_name, &self.photo_name] {
            path.push(part.as_deref().unwrap_or_default());
        }
        path
    }

    /// Set the note linkage flag from a match count
    pub fn set_notes_count(&mut self, count: usize) {
        self.notes_count = u32::try_from(count).unwrap_or(u32::MAX);
        self.has_notes = count > 0;
    }

    /// Set the annotation linkage flag from a match count
    pub fn set_annotations_count(&mut self, count: usize) {
        self.annotations_count = u32::try_from(count).unwrap_or(u32::MAX);
        self.has_annotations = count > 0;
    }
}

/// Deterministic fingerprint of a joined dataset.
///
/// Two loads of the same sources produce the same version, so label indices
/// assigned in one session remain meaningful in the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetVersion(pub u64);

impl DatasetVersion {
    /// Fingerprint record identities and order
    #[must_use]
    pub fn of(records: &[Record]) -> Self {
        let mut hasher = FxHasher::default();
        records.len().hash(&mut hasher);
        for record in records {
            record.masked_id.hash(&mut hasher);
            record.study_id.hash(&mut hasher);
            record.proc_name.hash(&mut hasher);
            record.photo_name.hash(&mut hasher);
            record.exam_date.hash(&mut hasher);
        }
        Self(hasher.finish())
    }
}

impl std::fmt::Display for DatasetVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
