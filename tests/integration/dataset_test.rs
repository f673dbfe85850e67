use std::fs;

use chrono::NaiveDate;
use slitlamp_labeler::dataset::load_reference_sources;
use slitlamp_labeler::{Error, load_sources};

use crate::utils::{ANNOTATIONS, CROSSWALK, DIAGNOSIS, Fixture, NOTES};

#[test]
fn test_keys_normalized_across_sources() {
    let fixture = Fixture::new();
    let sources = load_sources(&fixture.config).unwrap();

    assert_eq!(sources.crosswalk.len(), 4);
    assert_eq!(sources.crosswalk[1].masked_id.as_deref(), Some("1002"));
    assert_eq!(sources.diagnoses[0].patient_id.as_deref(), Some("500"));
    assert_eq!(
        sources.diagnoses[0].exam_date,
        NaiveDate::from_ymd_opt(2021, 3, 1)
    );

    let patients: Vec<&str> = sources.notes.iter().map(|n| n.patient_id.as_str()).collect();
    assert_eq!(patients, ["500", "500", "501", "502"]);

    let subjects: Vec<&str> = sources
        .annotations
        .iter()
        .map(|a| a.subject_id.as_str())
        .collect();
    assert_eq!(subjects, ["1001", "1001", "1003", "1002"]);
}

#[test]
fn test_note_type_filter_only_when_column_present() {
    let without_type = "\
pat_mrn,note_date,note_text
500,2021-02-15,a
501,2021-03-10,b
";
    let fixture = Fixture::with_sources(CROSSWALK, DIAGNOSIS, without_type, ANNOTATIONS);
    let reference = load_reference_sources(&fixture.config).unwrap();
    assert_eq!(reference.notes.len(), 2);

    let fixture = Fixture::new();
    let reference = load_reference_sources(&fixture.config).unwrap();
    assert!(reference.notes.iter().all(|n| n.note_type.as_deref() == Some("Progress Notes")));
}

#[test]
fn test_missing_source_aborts_load() {
    let fixture = Fixture::new();
    fs::remove_file(&fixture.config.notes_path).unwrap();

    let err = load_sources(&fixture.config).unwrap_err();
    assert!(matches!(err, Error::SourceUnreadable { ref path, .. } if *path == fixture.config.notes_path));
}

#[test]
fn test_missing_join_column_is_reported() {
    let crosswalk = "\
maskedid,maskedid_studyid,proc_name
1001,1001_1,SLIT LAMP
";
    let fixture = Fixture::with_sources(crosswalk, DIAGNOSIS, NOTES, ANNOTATIONS);
    match load_sources(&fixture.config) {
        Err(Error::MissingColumn { column, .. }) => assert_eq!(column, "photo_name"),
        other => panic!("expected a missing column error, got {other:?}"),
    }
}

#[test]
fn test_garbage_date_makes_source_unreadable() {
    let diagnosis = "\
maskedid_studyid,pat_mrn,exam_date
1001_1,500,not a date
";
    let fixture = Fixture::with_sources(CROSSWALK, diagnosis, NOTES, ANNOTATIONS);
    let err = load_sources(&fixture.config).unwrap_err();
    assert!(err.to_string().contains("invalid date"));
}
