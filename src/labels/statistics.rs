//! Aggregate label statistics, per user and across users.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use itertools::Itertools;
use rayon::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::labels::model::{Label, Quality};
use crate::labels::store::{LABEL_FILE_SUFFIX, LabelFile};

/// Counts over a set of labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelStatistics {
    pub total: usize,
    pub by_laterality: BTreeMap<String, usize>,
    pub by_quality: BTreeMap<String, usize>,
    /// Usable labels only
    pub by_condition: BTreeMap<String, usize>,
    pub edited: usize,
}

impl LabelStatistics {
    /// Tally a set of labels
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a Label>) -> Self {
        let mut stats = Self::default();
        for label in labels {
            let current = &label.current;
            stats.total += 1;
            *stats
                .by_laterality
                .entry(current.laterality.to_string())
                .or_default() += 1;
            *stats
                .by_quality
                .entry(current.quality.to_string())
                .or_default() += 1;
            if current.quality == Quality::Usable {
                for name in current.conditions.names() {
                    *stats.by_condition.entry(name.to_string()).or_default() += 1;
                }
            }
            if current.is_edit {
                stats.edited += 1;
            }
        }
        stats
    }

    /// Add another set of counts into this one
    pub fn merge(&mut self, other: &Self) {
        self.total += other.total;
        self.edited += other.edited;
        merge_counts(&mut self.by_laterality, &other.by_laterality);
        merge_counts(&mut self.by_quality, &other.by_quality);
        merge_counts(&mut self.by_condition, &other.by_condition);
    }
}

fn merge_counts(into: &mut BTreeMap<String, usize>, from: &BTreeMap<String, usize>) {
    for (key, count) in from {
        *into.entry(key.clone()).or_default() += count;
    }
}

/// Per category, per sub-field, per value counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DetailedStatistics(BTreeMap<String, BTreeMap<String, BTreeMap<String, usize>>>);

impl DetailedStatistics {
    /// Tally every sub-field value of every attached condition
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a Label>) -> Self {
        let mut detailed = Self::default();
        for label in labels {
            for condition in label.current.conditions.iter() {
                let fields = detailed
                    .0
                    .entry(condition.category().to_string())
                    .or_default();
                for (field, value) in condition.tallies() {
                    *fields
                        .entry(field.to_string())
                        .or_default()
                        .entry(value.to_string())
                        .or_default() += 1;
                }
            }
        }
        detailed
    }

    /// Value counts of one sub-field of one category
    #[must_use]
    pub fn field(&self, category: &str, field: &str) -> Option<&BTreeMap<String, usize>> {
        self.0.get(category).and_then(|fields| fields.get(field))
    }

    #[must_use]
    pub fn categories(&self) -> &BTreeMap<String, BTreeMap<String, BTreeMap<String, usize>>> {
        &self.0
    }

    pub fn merge(&mut self, other: &Self) {
        for (category, fields) in &other.0 {
            let into = self.0.entry(category.clone()).or_default();
            for (field, counts) in fields {
                merge_counts(into.entry(field.clone()).or_default(), counts);
            }
        }
    }
}

/// Statistics of one user's label file
#[derive(Debug, Clone, Serialize)]
pub struct UserStatistics {
    pub username: String,
    pub created_at: NaiveDateTime,
    pub last_modified: NaiveDateTime,
    pub review_queue: usize,
    pub statistics: LabelStatistics,
    pub detailed: DetailedStatistics,
}

impl UserStatistics {
    #[must_use]
    pub fn from_file(file: &LabelFile) -> Self {
        Self {
            username: file.user.clone(),
            created_at: file.created_at,
            last_modified: file.last_modified,
            review_queue: file.review_queue_len(),
            statistics: LabelStatistics::from_labels(file.all_labels()),
            detailed: DetailedStatistics::from_labels(file.all_labels()),
        }
    }
}

/// Label files in a directory, sorted by name
pub fn label_files(labels_dir: &Path) -> Result<Vec<PathBuf>> {
    if !labels_dir.exists() {
        return Ok(Vec::new());
    }
    let files = std::fs::read_dir(labels_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(LABEL_FILE_SUFFIX))
        })
        .sorted()
        .collect_vec();
    Ok(files)
}

/// Statistics for every user with a readable label file.
///
/// Unreadable or corrupt files are skipped with a warning.
pub fn all_user_statistics(labels_dir: &Path) -> Result<Vec<UserStatistics>> {
    let users = label_files(labels_dir)?
        .par_iter()
        .filter_map(|path| match LabelFile::read(path) {
            Ok(file) => Some(UserStatistics::from_file(&file)),
            Err(e) => {
                log::warn!("Skipping labels of {}: {}", user_of(path), e);
                None
            }
        })
        .collect();
    Ok(users)
}

/// Username a label file belongs to, from its file name
fn user_of(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(LABEL_FILE_SUFFIX))
        .unwrap_or_default()
}

/// Merge per-user statistics into one overview
#[must_use]
pub fn merge_statistics(users: &[UserStatistics]) -> (LabelStatistics, DetailedStatistics) {
    let mut statistics = LabelStatistics::default();
    let mut detailed = DetailedStatistics::default();
    for user in users {
        statistics.merge(&user.statistics);
        detailed.merge(&user.detailed);
    }
    (statistics, detailed)
}
