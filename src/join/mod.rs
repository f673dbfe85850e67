//! Preprocessor and join cache.
//!
//! Builds the base join (crosswalk left-joined with diagnoses on study id),
//! attaches per-record linkage flags, and persists the result so a session
//! can start from one deserialization instead of a full linkage scan. When
//! the cache cannot be used the same join is computed at session start.

pub mod cache;
pub mod record;

pub use cache::{CacheStatus, CacheSummary, read_cache, summary_path, write_cache};
pub use record::{DatasetVersion, Record};

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::config::LabelerConfig;
use crate::dataset::{self, CrosswalkRow, DiagnosisRow, RawSources};
use crate::error::Result;
use crate::filter::FilterMode;
use crate::linker::TemporalLinker;
use crate::utils::logging::{
    create_main_progress_bar, create_spinner, finish_progress_bar, log_cache_fallback,
};

/// Left join of crosswalk rows with diagnosis rows on study id.
///
/// Every crosswalk row survives. A study with several diagnosis rows yields
/// one record per diagnosis row. Crosswalk values win; blanks are filled from
/// the diagnosis row.
#[must_use]
pub fn merge_base(crosswalk: &[CrosswalkRow], diagnoses: &[DiagnosisRow]) -> Vec<Record> {
    let mut by_study: FxHashMap<&str, Vec<&DiagnosisRow>> = FxHashMap::default();
    for dx in diagnoses {
        if let Some(study) = dx.study_id.as_deref() {
            by_study.entry(study).or_default().push(dx);
        }
    }

    let mut records = Vec::with_capacity(crosswalk.len());
    for cw in crosswalk {
        match cw.study_id.as_deref().and_then(|s| by_study.get(s)) {
            Some(matches) => records.extend(matches.iter().map(|dx| combine(cw, Some(dx)))),
            None => records.push(combine(cw, None)),
        }
    }
    records
}

fn combine(cw: &CrosswalkRow, dx: Option<&DiagnosisRow>) -> Record {
    let fill = |own: &Option<String>, other: Option<&Option<String>>| {
        own.clone().or_else(|| other.and_then(Clone::clone))
    };
    Record {
        masked_id: cw.masked_id.clone(),
        study_id: cw.study_id.clone(),
        proc_name: cw.proc_name.clone(),
        photo_name: cw.photo_name.clone(),
        patient_id: fill(&cw.patient_id, dx.map(|d| &d.patient_id)),
        exam_date: cw.exam_date.or_else(|| dx.and_then(|d| d.exam_date)),
        laterality: fill(&cw.laterality, dx.map(|d| &d.laterality)),
        main_diagnosis: fill(&cw.main_diagnosis, dx.map(|d| &d.main_diagnosis)),
        order_diagnosis: fill(&cw.order_diagnosis, dx.map(|d| &d.order_diagnosis)),
        ..Record::default()
    }
}

/// Attach `has_notes`/`notes_count` and `has_annotations`/`annotations_count`
/// to every record.
///
/// A record without an exam date, or without the relevant key, has no
/// linkage. Counts are window-existence counts, not bracketed matches.
pub fn attach_linkage_flags(records: &mut [Record], linker: &TemporalLinker, show_progress: bool) {
    let start = Instant::now();
    let pb = create_main_progress_bar(
        records.len() as u64,
        Some("Computing linkage flags"),
        show_progress,
    );

    records.par_iter_mut().for_each(|record| {
        let (notes, annotations) = match record.exam_date {
            Some(exam) => (
                record
                    .patient_id
                    .as_deref()
                    .map_or(0, |p| linker.count_notes(p, exam)),
                record
                    .masked_id
                    .as_deref()
                    .map_or(0, |m| linker.count_annotations(m, exam)),
            ),
            None => (0, 0),
        };
        record.set_notes_count(notes);
        record.set_annotations_count(annotations);
        pb.inc(1);
    });

    finish_progress_bar(&pb, Some("Linkage flags computed"));
    log::info!(
        "Linkage flags for {} records: {} with notes, {} with annotations ({:?})",
        records.len(),
        records.iter().filter(|r| r.has_notes).count(),
        records.iter().filter(|r| r.has_annotations).count(),
        start.elapsed()
    );
}

/// Where a joined dataset came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetOrigin {
    /// Deserialized from the preprocessed join cache
    Cache(PathBuf),
    /// Joined from the raw sources at session start
    LiveJoin,
}

/// The joined records a session works from
#[derive(Debug, Clone)]
pub struct JoinedDataset {
    records: Vec<Record>,
    flags_computed: bool,
    origin: DatasetOrigin,
}

impl JoinedDataset {
    /// Wrap joined records; `flags_computed` says whether linkage flags are meaningful
    #[must_use]
    pub fn new(records: Vec<Record>, flags_computed: bool, origin: DatasetOrigin) -> Self {
        Self {
            records,
            flags_computed,
            origin,
        }
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

    /// Whether `has_notes`/`has_annotations` reflect the linkage windows
    #[must_use]
    pub fn flags_computed(&self) -> bool {
        self.flags_computed
    }

    #[must_use]
    pub fn origin(&self) -> &DatasetOrigin {
        &self.origin
    }

    /// Compute linkage flags if they are not present yet
    pub fn ensure_flags(&mut self, linker: &TemporalLinker) {
        if !self.flags_computed {
            log::warn!(
                "Computing linkage flags inline for {} records; this is much slower than using the join cache",
                self.records.len()
            );
            attach_linkage_flags(&mut self.records, linker, false);
            self.flags_computed = true;
        }
    }
}

/// Load the joined dataset and the linker for a session.
///
/// Uses the join cache when it is enabled, present, newer than every source
/// and readable. Otherwise the base join is computed from the raw sources,
/// with linkage flags computed inline when `filter` is not `All`.
pub fn prepare_dataset(
    config: &LabelerConfig,
    filter: FilterMode,
) -> Result<(JoinedDataset, TemporalLinker)> {
    let status = CacheStatus::check(config.active_cache_path(), &config.source_paths());

    if let CacheStatus::Fresh(path) = &status {
        match read_cache(path) {
            Ok(records) => {
                let reference = dataset::load_reference_sources(config)?;
                let linker = TemporalLinker::from_sources(reference, config.windows());
                let joined = JoinedDataset::new(records, true, DatasetOrigin::Cache(path.clone()));
                return Ok((joined, linker));
            }
            Err(e) => log_cache_fallback(&e.to_string()),
        }
    } else if let Some(reason) = status.fallback_reason() {
        log_cache_fallback(&reason);
    }

    let RawSources {
        crosswalk,
        diagnoses,
        notes,
        annotations,
    } = dataset::load_sources(config)?;
    let linker = TemporalLinker::new(notes, annotations, config.windows());
    let records = merge_base(&crosswalk, &diagnoses);
    log::info!("Base join produced {} records", records.len());

    let mut joined = JoinedDataset::new(records, false, DatasetOrigin::LiveJoin);
    if filter != FilterMode::All {
        joined.ensure_flags(&linker);
    }
    Ok((joined, linker))
}

/// Offline preprocessing: full join, linkage flags, cache and summary written
/// to `output`.
pub fn run_preprocessing(config: &LabelerConfig, output: &Path) -> Result<CacheSummary> {
    let start = Instant::now();
    log::info!("Creating preprocessed dataset at {}", output.display());

    let spinner = create_spinner(Some("Loading sources"));
    let loaded = dataset::load_sources(config);
    finish_progress_bar(&spinner, Some("Sources loaded"));
    let RawSources {
        crosswalk,
        diagnoses,
        notes,
        annotations,
    } = loaded?;
    let linker = TemporalLinker::new(notes, annotations, config.windows());

    let mut records = merge_base(&crosswalk, &diagnoses);
    attach_linkage_flags(&mut records, &linker, true);
    let summary = write_cache(output, &records)?;

    log::info!(
        "Preprocessing finished in {:?}: {} images, {} with notes, {} with annotations, {} with both",
        start.elapsed(),
        summary.total_images,
        summary.with_notes,
        summary.with_annotations,
        summary.with_both
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkageWindows;
    use crate::dataset::{Annotation, Note};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn crosswalk(masked: &str, study: &str, photo: &str) -> CrosswalkRow {
        CrosswalkRow {
            masked_id: Some(masked.to_string()),
            study_id: Some(study.to_string()),
            proc_name: Some("SLIT LAMP".to_string()),
            photo_name: Some(photo.to_string()),
            patient_id: None,
            exam_date: None,
            laterality: Some("OD".to_string()),
            main_diagnosis: None,
            order_diagnosis: None,
        }
    }

    fn diagnosis(study: &str, patient: &str, exam: NaiveDate) -> DiagnosisRow {
        DiagnosisRow {
            study_id: Some(study.to_string()),
            patient_id: Some(patient.to_string()),
            exam_date: Some(exam),
            laterality: Some("OS".to_string()),
            main_diagnosis: Some("Cataract".to_string()),
            order_diagnosis: None,
        }
    }

    #[test]
    fn test_merge_base_is_left_join_with_blank_fill() {
        let cw = vec![crosswalk("1", "1_a", "p1.jpg"), crosswalk("2", "2_a", "p2.jpg")];
        let dx = vec![diagnosis("1_a", "100", date(2020, 1, 5))];
        let records = merge_base(&cw, &dx);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].patient_id.as_deref(), Some("100"));
        assert_eq!(records[0].exam_date, Some(date(2020, 1, 5)));
        // crosswalk value kept over the diagnosis value
        assert_eq!(records[0].laterality.as_deref(), Some("OD"));
        assert_eq!(records[0].main_diagnosis.as_deref(), Some("Cataract"));
        assert_eq!(records[1].patient_id, None);
        assert_eq!(records[1].exam_date, None);
    }

    #[test]
    fn test_linkage_flags_use_both_windows() {
        let cw = vec![crosswalk("1", "1_a", "p1.jpg"), crosswalk("2", "2_a", "p2.jpg")];
        let exam = date(2020, 1, 5);
        let dx = vec![diagnosis("1_a", "100", exam), diagnosis("2_a", "200", exam)];
        let mut records = merge_base(&cw, &dx);

        let notes = vec![
            Note {
                note_id: None,
                patient_id: "100".to_string(),
                note_date: date(2020, 1, 1),
                text: String::new(),
                note_type: None,
            },
            Note {
                note_id: None,
                patient_id: "100".to_string(),
                note_date: date(2020, 3, 1),
                text: String::new(),
                note_type: None,
            },
        ];
        let annotations = vec![Annotation {
            subject_id: "2".to_string(),
            exam_field: "Cornea".to_string(),
            value: "clear".to_string(),
            laterality: "OD".to_string(),
            annotation_date: date(2020, 1, 12),
        }];
        let linker = TemporalLinker::new(
            notes,
            annotations,
            LinkageWindows { notes_days: 30, annotations_days: 7 },
        );
        attach_linkage_flags(&mut records, &linker, false);

        assert!(records[0].has_notes);
        assert_eq!(records[0].notes_count, 1);
        assert!(!records[0].has_annotations);
        assert!(!records[1].has_notes);
        assert!(records[1].has_annotations);
        assert_eq!(records[1].annotations_count, 1);
    }
}
