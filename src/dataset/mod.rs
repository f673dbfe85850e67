//! Dataset loading.
//!
//! Loads the four raw sources (image crosswalk, diagnosis records, clinical
//! notes, structured exam annotations), normalizes their join keys and parses
//! their dates. Loading is all-or-nothing: the first unreadable source aborts
//! the load and no partial dataset is returned.

pub mod date;
pub mod keys;
pub mod sources;
pub mod table;

pub use date::{DateFormatConfig, parse_date_string};
pub use keys::normalize_key;
pub use sources::{Annotation, CrosswalkRow, DiagnosisRow, Note};
pub use table::{SourceFormat, TextTable};

use std::time::Instant;

use crate::config::LabelerConfig;
use crate::error::Result;

/// All four sources, parsed and normalized
#[derive(Debug, Clone, Default)]
pub struct RawSources {
    pub crosswalk: Vec<CrosswalkRow>,
    pub diagnoses: Vec<DiagnosisRow>,
    pub notes: Vec<Note>,
    pub annotations: Vec<Annotation>,
}

/// Notes and annotations only, for runtime lookups when the joined table
/// comes from the cache
#[derive(Debug, Clone, Default)]
pub struct ReferenceSources {
    pub notes: Vec<Note>,
    pub annotations: Vec<Annotation>,
}

/// Load every source named in the configuration
pub fn load_sources(config: &LabelerConfig) -> Result<RawSources> {
    let start = Instant::now();
    log::info!("Loading datasets...");

    let crosswalk = sources::load_crosswalk(&config.crosswalk_path, &config.date_format)?;
    let diagnoses = sources::load_diagnoses(&config.diagnosis_path, &config.date_format)?;
    let ReferenceSources { notes, annotations } = load_reference_sources(config)?;

    log::info!(
        "All datasets loaded in {:?}: {} crosswalk rows, {} diagnoses, {} notes, {} annotations",
        start.elapsed(),
        crosswalk.len(),
        diagnoses.len(),
        notes.len(),
        annotations.len()
    );

    Ok(RawSources {
        crosswalk,
        diagnoses,
        notes,
        annotations,
    })
}

/// Load only the notes and annotations sources
pub fn load_reference_sources(config: &LabelerConfig) -> Result<ReferenceSources> {
    let notes = sources::load_notes(
        &config.notes_path,
        &config.date_format,
        config.note_type.as_deref(),
    )?;
    let annotations = sources::load_annotations(&config.annotations_path, &config.date_format)?;
    Ok(ReferenceSources { notes, annotations })
}
