use std::fs;

use slitlamp_labeler::auth::{DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME};
use slitlamp_labeler::labels::{
    Cataract, CataractType, Condition, Conditions, DryEye, Hemorrhage, HemorrhageExtent,
    LabelFile, Laterality, Presence, Quality, Severity, all_user_statistics, merge_statistics,
};
use slitlamp_labeler::{
    CredentialError, CredentialStore, Error, LabelInput, LabelStore, Role, RouteStrategy,
};

fn dry_eye(signs: &[&str]) -> LabelInput {
    LabelInput::new(Laterality::Left, Quality::Usable).with_condition(Condition::DryEye(DryEye {
        severity: Some(Severity::Moderate),
        signs: signs.iter().map(ToString::to_string).collect(),
        comments: None,
    }))
}

#[test]
fn test_statistics_across_user_files() {
    let dir = tempfile::tempdir().unwrap();

    let mut alice = LabelStore::open(dir.path(), "alice").unwrap();
    alice.add_label(0, dry_eye(&["MGD", "Filaments"])).unwrap();
    alice.add_label(1, dry_eye(&["MGD"])).unwrap();
    alice
        .add_label(2, LabelInput::new(Laterality::Right, Quality::NotUsable))
        .unwrap();

    let mut bob = LabelStore::open(dir.path(), "bob").unwrap();
    let both = LabelInput::new(Laterality::Right, Quality::Usable)
        .with_condition(Condition::Cataract(Cataract {
            cataract_type: Some(CataractType::Cortical),
            severity: Some(Severity::Severe),
            ..Cataract::default()
        }))
        .with_condition(Condition::Hemorrhage(Hemorrhage {
            presence: Some(Presence::Present),
            extent: Some(HemorrhageExtent::Focal),
            ..Hemorrhage::default()
        }));
    bob.add_label(0, both.clone()).unwrap();
    bob.add_label(0, both).unwrap();

    // Non-label files are ignored
    fs::write(dir.path().join("notes.txt"), "x").unwrap();

    let users = all_user_statistics(dir.path()).unwrap();
    let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, ["alice", "bob"]);
    assert_eq!(users[0].statistics.total, 3);
    assert_eq!(users[1].statistics.edited, 1);

    let (overall, detailed) = merge_statistics(&users);
    assert_eq!(overall.total, 4);
    assert_eq!(overall.by_quality.get("Usable"), Some(&3));
    assert_eq!(overall.by_quality.get("Not Usable"), Some(&1));
    assert_eq!(overall.by_condition.get("Dry Eye Disease"), Some(&2));
    assert_eq!(overall.by_condition.get("Cataract"), Some(&1));
    assert_eq!(overall.by_condition.get("Subconjunctival Hemorrhage"), Some(&1));

    let signs = detailed.field("Dry Eye Disease", "signs").unwrap();
    assert_eq!(signs.get("MGD"), Some(&2));
    assert_eq!(signs.get("Filaments"), Some(&1));
}

#[test]
fn test_label_file_layout() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = LabelStore::open(dir.path(), "carol").unwrap();
    store.add_label(7, dry_eye(&["MGD"])).unwrap();
    store.add_to_review_queue(7).unwrap();

    let json: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("carol_labels.json")).unwrap()).unwrap();
    assert_eq!(json["user"], "carol");
    assert_eq!(json["review_queue"][0], "7");
    let label = &json["labels"]["7"];
    assert_eq!(label["quality"], "Usable");
    assert_eq!(label["labeled_by"], "carol");
    assert_eq!(label["is_edit"], false);
    assert_eq!(label["conditions"]["Dry Eye Disease"]["severity"], "Moderate");
    assert!(label.get("edit_history").is_none());

    let file = LabelFile::read(store.path()).unwrap();
    assert_eq!(file.labels.len(), 1);
}

#[test]
fn test_unknown_condition_category_rejected_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dan_labels.json");
    fs::write(
        &path,
        r#"{
  "user": "dan",
  "created_at": "2024-01-01 10:00:00",
  "last_modified": "2024-01-01 10:00:00",
  "labels": {
    "0": {
      "image_path": null,
      "laterality": "Left",
      "quality": "Usable",
      "conditions": {"Glaucoma": {}},
      "metadata": {},
      "labeled_by": "dan",
      "labeled_at": "2024-01-01 10:00:00",
      "is_edit": false,
      "edit_history": []
    }
  },
  "review_queue": []
}"#,
    )
    .unwrap();

    assert!(LabelStore::open(dir.path(), "dan").is_err());
}

#[test]
fn test_not_usable_label_keeps_no_conditions() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = LabelStore::open(dir.path(), "erin").unwrap();
    let input = LabelInput {
        conditions: Conditions::new().with(Condition::DryEye(DryEye::default())),
        ..LabelInput::new(Laterality::Indeterminate, Quality::NotUsable)
    };
    let saved = store.add_label(0, input).unwrap();
    assert!(saved.current.conditions.is_empty());
}

#[test]
fn test_credentials_and_route_preference() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");

    let mut store = CredentialStore::open(&path).unwrap();
    assert_eq!(
        store
            .authenticate(DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD)
            .unwrap(),
        Role::Admin
    );
    store
        .create_user("frank", "secret", Role::Labeler, RouteStrategy::MiddleOut)
        .unwrap();
    assert!(matches!(
        store.create_user("frank", "other", Role::Admin, RouteStrategy::Forward),
        Err(Error::Credential(CredentialError::UserExists))
    ));

    let mut reopened = CredentialStore::open(&path).unwrap();
    assert_eq!(reopened.authenticate("frank", "secret").unwrap(), Role::Labeler);
    assert!(matches!(
        reopened.authenticate("frank", "wrong"),
        Err(Error::Credential(CredentialError::IncorrectPassword))
    ));
    assert_eq!(reopened.route_strategy("frank"), RouteStrategy::MiddleOut);

    reopened
        .set_route_strategy("frank", RouteStrategy::Random)
        .unwrap();
    let again = CredentialStore::open(&path).unwrap();
    assert_eq!(again.route_strategy("frank"), RouteStrategy::Random);
    assert_eq!(again.list_users().len(), 2);
}
