use chrono::NaiveDate;
use slitlamp_labeler::labels::{Condition, DryEye, Laterality, Quality, Severity};
use slitlamp_labeler::linker::NotePosition;
use slitlamp_labeler::{
    Error, FilterMode, LabelInput, LabelStore, RouteStrategy, Session, run_preprocessing,
};

use crate::utils::{ANNOTATIONS, DIAGNOSIS, Fixture, NOTES};

fn dry_eye(laterality: Laterality) -> LabelInput {
    LabelInput::new(laterality, Quality::Usable).with_condition(Condition::DryEye(DryEye {
        severity: Some(Severity::Mild),
        ..DryEye::default()
    }))
}

#[test]
fn test_image_data_links_notes_and_annotations() {
    let fixture = Fixture::new();
    let session = Session::start(fixture.config.clone(), "alice", RouteStrategy::Forward).unwrap();
    assert_eq!(session.get_total_images(), 4);

    let image = session.get_image_data(0).unwrap();
    assert_eq!(image.record.masked_id.as_deref(), Some("1001"));
    assert_eq!(
        image.image_path,
        fixture
            .dir
            .path()
            .join("images")
            .join("1001")
            .join("1001_1")
            .join("SLIT LAMP")
            .join("a.jpg")
    );

    // One nearest note on each side of the exam
    let positions: Vec<NotePosition> = image.notes.iter().map(|n| n.position).collect();
    assert_eq!(positions, [NotePosition::Before, NotePosition::After]);
    assert_eq!(image.notes[0].days_diff, -14);
    assert_eq!(image.notes[1].days_diff, 4);

    assert_eq!(image.annotations.len(), 2);
    let groups = image.annotations_by_laterality();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].0, "OD");

    // No diagnosis row: no exam date, nothing linked
    let unlinked = session.get_image_data(3).unwrap();
    assert!(unlinked.notes.is_empty());
    assert!(unlinked.annotations.is_empty());

    assert!(session.get_image_data(4).is_none());
}

#[test]
fn test_save_advances_and_persists() {
    let fixture = Fixture::new();
    let mut session =
        Session::start(fixture.config.clone(), "alice", RouteStrategy::Forward).unwrap();
    let space = session.index_space();

    assert_eq!(session.save_label(space, dry_eye(Laterality::Left), false).unwrap(), 1);
    assert_eq!(session.save_label(space, dry_eye(Laterality::Right), true).unwrap(), 2);
    assert_eq!(session.progress().labeled, 2);

    let store = LabelStore::open(&fixture.config.labels_dir, "alice").unwrap();
    let label = store.get_label(0).unwrap();
    assert_eq!(label.current.metadata.study_id.as_deref(), Some("1001_1"));
    assert_eq!(label.current.metadata.patient_id.as_deref(), Some("500"));
    assert_eq!(
        label.current.metadata.exam_date,
        NaiveDate::from_ymd_opt(2021, 3, 1)
    );
    assert!(label.current.image_path.as_deref().is_some_and(|p| p.ends_with("a.jpg")));
    assert!(store.is_in_review_queue(1));
    assert_eq!(store.index_space(), Some(space));
}

#[test]
fn test_invalid_label_does_not_move_or_persist() {
    let fixture = Fixture::new();
    let mut session =
        Session::start(fixture.config.clone(), "bob", RouteStrategy::Forward).unwrap();
    let space = session.index_space();

    let err = session
        .save_label(space, LabelInput::new(Laterality::Left, Quality::Usable), false)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(session.position(), 0);
    assert!(!session.label_store().path().exists());
}

#[test]
fn test_filter_change_rejects_stale_save() {
    let fixture = Fixture::new();
    let mut session =
        Session::start(fixture.config.clone(), "carol", RouteStrategy::Forward).unwrap();
    let before = session.index_space();
    session.next().unwrap();

    session.set_filter_mode(FilterMode::Annotations);
    assert_eq!(session.get_total_images(), 2);
    assert_eq!(session.unfiltered_total(), 4);
    assert_eq!(session.position(), 0);
    assert_ne!(session.index_space(), before);

    let err = session
        .save_label(before, dry_eye(Laterality::Left), false)
        .unwrap_err();
    assert!(matches!(err, Error::StaleIndexSpace { .. }));
    assert_eq!(session.label_store().get_labeled_count(), 0);

    let current = session.index_space();
    session.save_label(current, dry_eye(Laterality::Left), false).unwrap();
    assert_eq!(session.label_store().get_labeled_count(), 1);
}

#[test]
fn test_label_not_shown_on_other_filter_numbering() {
    let fixture = Fixture::new();
    {
        let mut session =
            Session::start(fixture.config.clone(), "erin", RouteStrategy::Forward).unwrap();
        let space = session.index_space();
        session.goto(1).unwrap();
        session.save_label(space, dry_eye(Laterality::Left), false).unwrap();

        // index 1 is 1002 under All and 1003 under Annotations
        session.set_filter_mode(FilterMode::Annotations);
        session.goto(1).unwrap();
        let image = session.current_image().unwrap();
        assert_eq!(image.record.masked_id.as_deref(), Some("1003"));
        assert!(session.current_label().is_none());
        assert_eq!(session.progress().labeled, 0);
        assert_eq!(session.label_store().get_labeled_count(), 0);
    }

    let annotations = Session::start(
        fixture.config_with(FilterMode::Annotations),
        "erin",
        RouteStrategy::Forward,
    )
    .unwrap();
    assert_eq!(annotations.progress().labeled, 0);
    assert_eq!(annotations.position(), 0);

    let all = Session::start(fixture.config.clone(), "erin", RouteStrategy::Forward).unwrap();
    let label = all.label_store().get_label(1).unwrap();
    assert_eq!(label.current.metadata.study_id.as_deref(), Some("1002_1"));
    assert_eq!(all.progress().labeled, 1);
}

#[test]
fn test_resume_after_last_labeled_position() {
    let fixture = Fixture::new();
    {
        let mut session =
            Session::start(fixture.config.clone(), "dana", RouteStrategy::Forward).unwrap();
        let space = session.index_space();
        session.goto(2).unwrap();
        session.save_label(space, dry_eye(Laterality::Left), false).unwrap();
    }

    let session = Session::start(fixture.config.clone(), "dana", RouteStrategy::Forward).unwrap();
    assert_eq!(session.position(), 3);

    let backward =
        Session::start(fixture.config.clone(), "dana", RouteStrategy::Backward).unwrap();
    // Route [3, 2, 1, 0]: the labeled index 2 sits at position 1
    assert_eq!(backward.position(), 2);
}

#[test]
fn test_middle_out_route_over_view() {
    let fixture = Fixture::new();
    let mut session =
        Session::start(fixture.config.clone(), "erin", RouteStrategy::MiddleOut).unwrap();
    assert_eq!(session.get_route_indices(), [2, 1, 3, 0]);
    assert_eq!(session.current_index(), Some(2));

    session.set_strategy(RouteStrategy::Random);
    let mut sorted = session.get_route_indices().to_vec();
    sorted.sort_unstable();
    assert_eq!(sorted, [0, 1, 2, 3]);
}

#[test]
fn test_navigation_bounds() {
    let fixture = Fixture::new();
    let mut session =
        Session::start(fixture.config.clone(), "finn", RouteStrategy::Forward).unwrap();
    assert_eq!(session.previous().unwrap(), 0);
    session.goto(3).unwrap();
    assert_eq!(session.next().unwrap(), 3);
    assert!(matches!(
        session.goto(4),
        Err(Error::IndexOutOfRange { index: 4, len: 4 })
    ));
    assert_eq!(session.position(), 3);
}

#[test]
fn test_same_study_draft_is_not_saved() {
    let crosswalk = "\
maskedid,maskedid_studyid,proc_name,photo_name
1001,1001_1,SLIT LAMP,a.jpg
1001,1001_1,SLIT LAMP,a2.jpg
1002,1002_1,SLIT LAMP,b.jpg
";
    let fixture = Fixture::with_sources(crosswalk, DIAGNOSIS, NOTES, ANNOTATIONS);
    let mut session =
        Session::start(fixture.config.clone(), "gail", RouteStrategy::Forward).unwrap();
    let space = session.index_space();

    let saved = dry_eye(Laterality::Right);
    session.save_label(space, saved.clone(), false).unwrap();
    assert_eq!(session.current_index(), Some(1));

    let draft = session.draft().unwrap();
    assert_eq!(draft.index, 1);
    assert_eq!(draft.input.laterality, Laterality::Right);
    assert_eq!(draft.input.conditions, saved.conditions);
    assert!(session.form_defaults().is_some());

    assert!(!session.label_store().is_labeled(1));
    assert_eq!(session.label_store().get_labeled_count(), 1);

    // Different study: no suggestion
    session.next().unwrap();
    assert!(session.draft().is_none());
}

#[test]
fn test_session_from_cache_matches_live_session() {
    let fixture = Fixture::new();
    let live = Session::start(
        fixture.config_with(FilterMode::NotesAndAnnotations),
        "hana",
        RouteStrategy::Forward,
    )
    .unwrap();

    run_preprocessing(&fixture.config, &fixture.cache_path()).unwrap();
    let cached = Session::start(
        fixture.config_with(FilterMode::NotesAndAnnotations),
        "hana",
        RouteStrategy::Forward,
    )
    .unwrap();

    assert_eq!(cached.get_total_images(), 1);
    assert_eq!(cached.index_space(), live.index_space());
    assert_eq!(cached.get_image_data(0), live.get_image_data(0));
}

#[test]
fn test_label_store_location() {
    let fixture = Fixture::new();
    let session = Session::start(fixture.config.clone(), "ivan", RouteStrategy::Forward).unwrap();
    assert_eq!(
        session.label_store().path(),
        fixture.config.labels_dir.join("ivan_labels.json")
    );
}
