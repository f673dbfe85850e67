//! Dataset filter.
//!
//! Selects the records whose linkage flags satisfy a [`FilterMode`] and
//! renumbers them contiguously from zero. Because indices are positions in
//! the filtered view, every view is tagged with the [`IndexSpace`] it defines.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::join::{DatasetVersion, JoinedDataset, Record};
use crate::linker::TemporalLinker;

/// Which records a session works on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterMode {
    /// Every joined record
    All,
    /// Records with at least one note in the note window
    Notes,
    /// Records with at least one annotation in the annotation window
    Annotations,
    /// Records with both
    #[default]
    NotesAndAnnotations,
}

impl FilterMode {
    pub const ALL_MODES: [Self; 4] = [
        Self::All,
        Self::Notes,
        Self::Annotations,
        Self::NotesAndAnnotations,
    ];

    /// Configuration name of the mode
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Notes => "NOTES",
            Self::Annotations => "ANNOTATIONS",
            Self::NotesAndAnnotations => "NOTES_AND_ANNOTATIONS",
        }
    }

    /// Short description for listings
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::All => "All images",
            Self::Notes => "Images with clinical notes",
            Self::Annotations => "Images with exam annotations",
            Self::NotesAndAnnotations => "Images with notes and annotations",
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_ascii_uppercase();
        Self::ALL_MODES
            .into_iter()
            .find(|mode| mode.as_str() == wanted)
            .ok_or_else(|| format!("unknown filter mode '{s}'"))
    }
}

/// Anything that decides whether a record belongs to a view
pub trait RecordFilter: fmt::Debug {
    /// Whether the record is kept
    fn matches(&self, record: &Record) -> bool;
}

impl RecordFilter for FilterMode {
    fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::Notes => record.has_notes,
            Self::Annotations => record.has_annotations,
            Self::NotesAndAnnotations => record.has_notes && record.has_annotations,
        }
    }
}

/// Records kept by `filter`, in their original order
#[must_use]
pub fn apply_filter<F: RecordFilter + ?Sized>(records: &[Record], filter: &F) -> Vec<Record> {
    records
        .iter()
        .filter(|record| filter.matches(record))
        .cloned()
        .collect()
}

/// The numbering a record index belongs to: which records, under which filter.
///
/// Labels and route positions are only meaningful within one index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpace {
    pub version: DatasetVersion,
    pub filter: FilterMode,
}

impl fmt::Display for IndexSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.filter, self.version)
    }
}

/// A filtered, contiguously indexed view of the joined dataset
#[derive(Debug, Clone)]
pub struct FilteredDataset {
    records: Vec<Record>,
    space: IndexSpace,
    unfiltered_len: usize,
}

impl FilteredDataset {
    /// Filter a joined dataset. Linkage flags are computed inline first when
    /// the mode needs them and the dataset does not carry them yet.
    #[must_use]
    pub fn new(joined: &mut JoinedDataset, mode: FilterMode, linker: &TemporalLinker) -> Self {
        if mode != FilterMode::All {
            joined.ensure_flags(linker);
        }
        let records = apply_filter(joined.records(), &mode);
        Self::from_records(records, mode, joined.len())
    }

    /// Wrap records that are already filtered by `mode`
    #[must_use]
    pub fn from_records(records: Vec<Record>, mode: FilterMode, unfiltered_len: usize) -> Self {
        let space = IndexSpace {
            version: DatasetVersion::of(&records),
            filter: mode,
        };
        log::info!(
            "Filter {}: {} of {} images ({})",
            mode,
            records.len(),
            unfiltered_len,
            space
        );
        Self {
            records,
            space,
            unfiltered_len,
        }
    }

    /// Record at a filtered index
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Size of the dataset before filtering
    #[must_use]
    pub fn unfiltered_len(&self) -> usize {
        self.unfiltered_len
    }

    #[must_use]
    pub fn mode(&self) -> FilterMode {
        self.space.filter
    }

    #[must_use]
    pub fn index_space(&self) -> IndexSpace {
        self.space
    }
}
