//! Configuration for the labeling core.
//!
//! Read once at startup; nothing in the core re-reads it mid-session.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::DateFormatConfig;
use crate::error::util::safe_open_file;
use crate::error::{Error, Result};
use crate::filter::FilterMode;

/// Default maximum distance in days between an exam and a linked clinical note
pub const DEFAULT_MAX_NOTE_DAYS: i64 = 365;

/// Default maximum distance in days between an exam and a linked exam annotation
pub const DEFAULT_MAX_ANNOTATION_DAYS: i64 = 7;

/// Timestamp format of summaries, label files and the credential store
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Note category kept when the notes source carries a note-type column
pub const DEFAULT_NOTE_TYPE: &str = "Progress Notes";

/// Maximum day distances used by the temporal linker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkageWindows {
    /// Window for clinical notes (inclusive)
    pub notes_days: i64,
    /// Window for structured exam annotations (inclusive)
    pub annotations_days: i64,
}

impl Default for LinkageWindows {
    fn default() -> Self {
        Self {
            notes_days: DEFAULT_MAX_NOTE_DAYS,
            annotations_days: DEFAULT_MAX_ANNOTATION_DAYS,
        }
    }
}

/// Configuration for the labeling core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelerConfig {
    /// Diagnosis records (study id, patient id, exam date, diagnoses)
    pub diagnosis_path: PathBuf,
    /// Free-text clinical notes
    pub notes_path: PathBuf,
    /// Image crosswalk (one row per photo)
    pub crosswalk_path: PathBuf,
    /// Structured exam annotations
    pub annotations_path: PathBuf,
    /// Root directory holding the image tree
    pub image_base_path: PathBuf,
    /// Precomputed join cache; `None` disables it
    pub cache_path: Option<PathBuf>,
    /// Whether to load the join cache when it exists
    pub use_cache: bool,
    /// Directory with one label file per user
    pub labels_dir: PathBuf,
    /// Credential store file
    pub users_file: PathBuf,
    /// Inclusive note window in days
    pub max_note_days_difference: i64,
    /// Inclusive annotation window in days
    pub max_annotation_days_difference: i64,
    /// Filter applied when a session starts
    pub default_filter: FilterMode,
    /// Pre-fill unsaved labels from the latest label of the same study
    pub auto_fill_same_study: bool,
    /// Restrict notes to this category when the column exists
    pub note_type: Option<String>,
    /// Accepted date formats for all date columns
    pub date_format: DateFormatConfig,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            diagnosis_path: PathBuf::from("data/sources/diagnosis.csv"),
            notes_path: PathBuf::from("data/sources/notes.parquet"),
            crosswalk_path: PathBuf::from("data/sources/crosswalk.csv"),
            annotations_path: PathBuf::from("data/sources/annotations.csv"),
            image_base_path: PathBuf::from("images"),
            cache_path: Some(PathBuf::from("data/preprocessed_dataset.parquet")),
            use_cache: true,
            labels_dir: PathBuf::from("data/labels"),
            users_file: PathBuf::from("data/users/users.json"),
            max_note_days_difference: DEFAULT_MAX_NOTE_DAYS,
            max_annotation_days_difference: DEFAULT_MAX_ANNOTATION_DAYS,
            default_filter: FilterMode::NotesAndAnnotations,
            auto_fill_same_study: true,
            note_type: Some(DEFAULT_NOTE_TYPE.to_string()),
            date_format: DateFormatConfig::default(),
        }
    }
}

impl LabelerConfig {
    /// Load a configuration from a JSON file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = safe_open_file(path, "configuration")?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| Error::source_unreadable(path, e))?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// The two independent day windows
    #[must_use]
    pub fn windows(&self) -> LinkageWindows {
        LinkageWindows {
            notes_days: self.max_note_days_difference,
            annotations_days: self.max_annotation_days_difference,
        }
    }

    /// The four raw source paths, in loader order
    #[must_use]
    pub fn source_paths(&self) -> [&Path; 4] {
        [
            self.crosswalk_path.as_path(),
            self.diagnosis_path.as_path(),
            self.notes_path.as_path(),
            self.annotations_path.as_path(),
        ]
    }

    /// The join cache path, if enabled
    #[must_use]
    pub fn active_cache_path(&self) -> Option<&Path> {
        if self.use_cache {
            self.cache_path.as_deref()
        } else {
            None
        }
    }
}
