use std::fs::{self, File};
use std::time::{Duration, SystemTime};

use slitlamp_labeler::join::{CacheStatus, DatasetOrigin, summary_path};
use slitlamp_labeler::{FilterMode, FilteredDataset, LabelerConfig, prepare_dataset, run_preprocessing};

use crate::utils::Fixture;

fn masked_ids(view: &FilteredDataset) -> Vec<&str> {
    view.records()
        .iter()
        .filter_map(|r| r.masked_id.as_deref())
        .collect()
}

#[test]
fn test_preprocessing_writes_cache_and_summary() {
    let fixture = Fixture::new();
    let summary = run_preprocessing(&fixture.config, &fixture.cache_path()).unwrap();

    assert_eq!(summary.total_images, 4);
    assert_eq!(summary.with_notes, 2);
    assert_eq!(summary.with_annotations, 2);
    assert_eq!(summary.with_both, 1);
    assert!(fixture.cache_path().exists());
    assert!(summary_path(&fixture.cache_path()).exists());
}

#[test]
fn test_cache_and_live_join_agree() {
    let fixture = Fixture::new();
    run_preprocessing(&fixture.config, &fixture.cache_path()).unwrap();

    let (cached, _) = prepare_dataset(&fixture.config, FilterMode::All).unwrap();
    assert_eq!(cached.origin(), &DatasetOrigin::Cache(fixture.cache_path()));
    assert!(cached.flags_computed());

    let live_config = LabelerConfig {
        use_cache: false,
        ..fixture.config.clone()
    };
    let (live, _) = prepare_dataset(&live_config, FilterMode::Notes).unwrap();
    assert_eq!(live.origin(), &DatasetOrigin::LiveJoin);
    assert!(live.flags_computed());
    assert_eq!(cached.records(), live.records());
}

#[test]
fn test_live_join_with_all_filter_skips_flags() {
    let fixture = Fixture::new();
    let (joined, _) = prepare_dataset(&fixture.config, FilterMode::All).unwrap();
    assert_eq!(joined.origin(), &DatasetOrigin::LiveJoin);
    assert!(!joined.flags_computed());
    assert_eq!(joined.len(), 4);
}

#[test]
fn test_filters_over_joined_dataset() {
    let fixture = Fixture::new();
    let (mut joined, linker) = prepare_dataset(&fixture.config, FilterMode::All).unwrap();

    let both = FilteredDataset::new(&mut joined, FilterMode::NotesAndAnnotations, &linker);
    assert_eq!(masked_ids(&both), ["1001"]);

    let notes = FilteredDataset::new(&mut joined, FilterMode::Notes, &linker);
    assert_eq!(masked_ids(&notes), ["1001", "1002"]);

    let annotations = FilteredDataset::new(&mut joined, FilterMode::Annotations, &linker);
    assert_eq!(masked_ids(&annotations), ["1001", "1003"]);

    let all = FilteredDataset::new(&mut joined, FilterMode::All, &linker);
    assert_eq!(all.len(), 4);
    assert_eq!(all.unfiltered_len(), 4);
}

#[test]
fn test_index_space_independent_of_load_path() {
    let fixture = Fixture::new();
    let (mut live, linker) = prepare_dataset(&fixture.config, FilterMode::Notes).unwrap();
    let live_space = FilteredDataset::new(&mut live, FilterMode::Notes, &linker).index_space();

    run_preprocessing(&fixture.config, &fixture.cache_path()).unwrap();
    let (mut cached, linker) = prepare_dataset(&fixture.config, FilterMode::Notes).unwrap();
    let cached_space = FilteredDataset::new(&mut cached, FilterMode::Notes, &linker).index_space();

    assert_eq!(live_space, cached_space);

    let other = FilteredDataset::new(&mut cached, FilterMode::Annotations, &linker).index_space();
    assert_ne!(live_space, other);
}

#[test]
fn test_corrupt_cache_falls_back_to_live_join() {
    let fixture = Fixture::new();
    fs::write(fixture.cache_path(), b"definitely not parquet").unwrap();

    let (joined, _) = prepare_dataset(&fixture.config, FilterMode::Annotations).unwrap();
    assert_eq!(joined.origin(), &DatasetOrigin::LiveJoin);
    assert!(joined.flags_computed());
}

#[test]
fn test_stale_cache_detected_by_source_mtime() {
    let fixture = Fixture::new();
    run_preprocessing(&fixture.config, &fixture.cache_path()).unwrap();
    let cache = fixture.cache_path();
    assert_eq!(
        CacheStatus::check(Some(&cache), &fixture.config.source_paths()),
        CacheStatus::Fresh(cache.clone())
    );

    File::options()
        .write(true)
        .open(&fixture.config.notes_path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(3600))
        .unwrap();

    let status = CacheStatus::check(Some(&cache), &fixture.config.source_paths());
    assert_eq!(
        status,
        CacheStatus::Stale {
            path: cache.clone(),
            newer_source: fixture.config.notes_path.clone(),
        }
    );

    let (joined, _) = prepare_dataset(&fixture.config, FilterMode::All).unwrap();
    assert_eq!(joined.origin(), &DatasetOrigin::LiveJoin);
}
