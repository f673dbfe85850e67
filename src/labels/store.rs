//! Per-user label store.
//!
//! One JSON file per user holding the current label for each record index,
//! each label's edit history, and the user's review queue. Record indices
//! only mean something inside one [`IndexSpace`]: the top-level labels belong
//! to the recorded space, labels of other spaces are kept aside under
//! `other_spaces` and swapped in when a session enters their space. Every
//! mutation rewrites the whole file atomically; a failed write leaves both
//! the file and the in-memory store unchanged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_arrow::schema::{SchemaLike, TracingOptions};

use crate::error::util::{safe_open_file, write_atomically};
use crate::error::{Error, Result};
use crate::filter::IndexSpace;
use crate::labels::model::{HistoryEntry, Label, LabelInput, LabelSnapshot, timestamp};
use crate::labels::statistics::{DetailedStatistics, LabelStatistics};

/// File name suffix of per-user label files
pub const LABEL_FILE_SUFFIX: &str = "_labels.json";

/// On-disk form of a user's labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelFile {
    pub user: String,
    #[serde(with = "timestamp")]
    pub created_at: NaiveDateTime,
    #[serde(with = "timestamp")]
    pub last_modified: NaiveDateTime,
    /// Keyed by record index in string form
    #[serde(default)]
    pub labels: BTreeMap<String, Label>,
    #[serde(default)]
    pub review_queue: Vec<String>,
    /// Index space the indices were assigned in, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_space: Option<IndexSpace>,
    /// Labels saved in other index spaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_spaces: Vec<ScopedLabels>,
}

/// Labels and review queue of an index space that is not active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedLabels {
    pub index_space: IndexSpace,
    #[serde(default)]
    pub labels: BTreeMap<String, Label>,
    #[serde(default)]
    pub review_queue: Vec<String>,
}

impl LabelFile {
    /// Empty store for a new user
    #[must_use]
    pub fn new(user: &str) -> Self {
        let now = now();
        Self {
            user: user.to_string(),
            created_at: now,
            last_modified: now,
            labels: BTreeMap::new(),
            review_queue: Vec::new(),
            index_space: None,
            other_spaces: Vec::new(),
        }
    }

    /// Labels of every index space in the file
    pub fn all_labels(&self) -> impl Iterator<Item = &Label> {
        self.labels
            .values()
            .chain(self.other_spaces.iter().flat_map(|scoped| scoped.labels.values()))
    }

    /// Review queue length summed over every index space
    #[must_use]
    pub fn review_queue_len(&self) -> usize {
        self.review_queue.len()
            + self
                .other_spaces
                .iter()
                .map(|scoped| scoped.review_queue.len())
                .sum::<usize>()
    }

    /// Make `space` the active space, setting the current labels aside.
    /// Returns the space that was left, if any.
    fn enter(&mut self, space: IndexSpace) -> Option<IndexSpace> {
        let recorded = match self.index_space {
            Some(recorded) if recorded == space => return None,
            Some(recorded) => recorded,
            None => {
                self.index_space = Some(space);
                return None;
            }
        };
        let (labels, review_queue) = match self
            .other_spaces
            .iter()
            .position(|scoped| scoped.index_space == space)
        {
            Some(at) => {
                let scoped = self.other_spaces.remove(at);
                (scoped.labels, scoped.review_queue)
            }
            None => (BTreeMap::new(), Vec::new()),
        };
        let previous = ScopedLabels {
            index_space: recorded,
            labels: std::mem::replace(&mut self.labels, labels),
            review_queue: std::mem::replace(&mut self.review_queue, review_queue),
        };
        if !previous.labels.is_empty() || !previous.review_queue.is_empty() {
            self.other_spaces.push(previous);
        }
        self.index_space = Some(space);
        Some(recorded)
    }

    /// Read a label file
    pub fn read(path: &Path) -> Result<Self> {
        let file = safe_open_file(path, "label file")?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| Error::source_unreadable(path, e))
    }
}

/// Current local time at the second precision timestamps are stored with
pub(crate) fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Path of a user's label file
#[must_use]
pub fn label_file_path(labels_dir: &Path, username: &str) -> PathBuf {
    labels_dir.join(format!("{username}{LABEL_FILE_SUFFIX}"))
}

/// One exported label row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub index: u64,
    pub study_id: Option<String>,
    pub patient_id: Option<String>,
    pub laterality: String,
    pub quality: String,
    pub conditions: String,
    pub labeled_by: String,
    pub labeled_at: String,
    pub is_edit: bool,
    pub edits: u32,
    pub in_review: bool,
    pub index_space: Option<String>,
}

/// A user's labels, loaded once per session and written on every change
#[derive(Debug, Clone)]
pub struct LabelStore {
    path: PathBuf,
    file: LabelFile,
}

impl LabelStore {
    /// Open the store for `username`, starting empty if no file exists yet
    pub fn open(labels_dir: &Path, username: &str) -> Result<Self> {
        let path = label_file_path(labels_dir, username);
        let file = if path.exists() {
            let file = LabelFile::read(&path)?;
            log::info!(
                "Loaded {} labels for {} from {}",
                file.labels.len(),
                username,
                path.display()
            );
            file
        } else {
            LabelFile::new(username)
        };
        Ok(Self { path, file })
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.file.user
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn file(&self) -> &LabelFile {
        &self.file
    }

    fn commit(&mut self, mut next: LabelFile) -> Result<()> {
        next.last_modified = now();
        let json = serde_json::to_vec_pretty(&next)?;
        write_atomically(&self.path, &json)?;
        self.file = next;
        Ok(())
    }

    /// Save a label for `index`.
    ///
    /// An existing label is pushed onto the edit history and the new version
    /// is marked as an edit. Invalid labels are rejected before anything is
    /// written.
    pub fn add_label(&mut self, index: usize, input: LabelInput) -> Result<&Label> {
        self.save(index, input, false)
    }

    /// Save a label for `index` and queue it for review in the same write
    pub fn add_label_for_review(&mut self, index: usize, input: LabelInput) -> Result<&Label> {
        self.save(index, input, true)
    }

    fn save(&mut self, index: usize, input: LabelInput, review: bool) -> Result<&Label> {
        input.validate()?;
        let input = input.normalized();
        let key = index.to_string();
        let stamped = now();

        let mut next = self.file.clone();
        let previous = next.labels.remove(&key);
        let snapshot = LabelSnapshot {
            image_path: input.image_path,
            laterality: input.laterality,
            quality: input.quality,
            conditions: input.conditions,
            metadata: input.metadata,
            labeled_by: self.file.user.clone(),
            labeled_at: stamped,
            is_edit: previous.is_some(),
        };
        let edit_history = match previous {
            Some(Label {
                current,
                mut edit_history,
            }) => {
                edit_history.push(HistoryEntry {
                    snapshot: current,
                    edited_at: stamped,
                });
                edit_history
            }
            None => Vec::new(),
        };
        next.labels.insert(
            key.clone(),
            Label {
                current: snapshot,
                edit_history,
            },
        );
        if review && !next.review_queue.contains(&key) {
            next.review_queue.push(key.clone());
        }

        self.commit(next)?;
        log::debug!("Saved label {} for {}", key, self.file.user);
        self.file
            .labels
            .get(&key)
            .ok_or(Error::IndexOutOfRange { index, len: self.file.labels.len() })
    }

    #[must_use]
    pub fn get_label(&self, index: usize) -> Option<&Label> {
        self.file.labels.get(&index.to_string())
    }

    #[must_use]
    pub fn is_labeled(&self, index: usize) -> bool {
        self.file.labels.contains_key(&index.to_string())
    }

    #[must_use]
    pub fn get_labeled_count(&self) -> usize {
        self.file.labels.len()
    }

    /// Most recent label of another image from the same study.
    ///
    /// Latest `labeled_at` wins; equal timestamps go to the higher index.
    #[must_use]
    pub fn get_last_label_for_studyid(&self, study_id: &str) -> Option<&Label> {
        self.file
            .labels
            .iter()
            .filter(|(_, label)| label.current.metadata.study_id.as_deref() == Some(study_id))
            .max_by_key(|(key, label)| (label.current.labeled_at, key.parse::<usize>().ok()))
            .map(|(_, label)| label)
    }

    /// Position of the last labeled entry of `route`
    #[must_use]
    pub fn get_last_labeled_index(&self, route: &[usize]) -> Option<usize> {
        route.iter().rposition(|&index| self.is_labeled(index))
    }

    /// First position at or after `from` whose index is unlabeled
    #[must_use]
    pub fn get_next_unlabeled_index(&self, route: &[usize], from: usize) -> Option<usize> {
        route
            .iter()
            .enumerate()
            .skip(from)
            .find(|&(_, &index)| !self.is_labeled(index))
            .map(|(position, _)| position)
    }

    /// Mark an index for follow-up. Returns false if it was already queued.
    pub fn add_to_review_queue(&mut self, index: usize) -> Result<bool> {
        let key = index.to_string();
        if self.file.review_queue.contains(&key) {
            return Ok(false);
        }
        let mut next = self.file.clone();
        next.review_queue.push(key);
        self.commit(next)?;
        Ok(true)
    }

    /// Remove an index from the review queue. Returns false if it was not queued.
    pub fn remove_from_review_queue(&mut self, index: usize) -> Result<bool> {
        let key = index.to_string();
        if !self.file.review_queue.contains(&key) {
            return Ok(false);
        }
        let mut next = self.file.clone();
        next.review_queue.retain(|queued| *queued != key);
        self.commit(next)?;
        Ok(true)
    }

    #[must_use]
    pub fn get_review_queue(&self) -> &[String] {
        &self.file.review_queue
    }

    #[must_use]
    pub fn is_in_review_queue(&self, index: usize) -> bool {
        self.file.review_queue.contains(&index.to_string())
    }

    /// Index space recorded with the labels, if any
    #[must_use]
    pub fn index_space(&self) -> Option<IndexSpace> {
        self.file.index_space
    }

    /// Switch the store to the labels of `space`.
    ///
    /// Labels of the previously active space are set aside and come back
    /// when that space is entered again; nothing is read or written across
    /// spaces. A store without a recorded space adopts `space`. The switch
    /// is persisted with the next write.
    pub fn enter_index_space(&mut self, space: IndexSpace) {
        if let Some(previous) = self.file.enter(space) {
            log::info!(
                "Labels of {} in {} set aside; {} labels in {}",
                self.file.user,
                previous,
                self.file.labels.len(),
                space
            );
        }
    }

    /// Counts over the labels of every index space
    #[must_use]
    pub fn statistics(&self) -> LabelStatistics {
        LabelStatistics::from_labels(self.file.all_labels())
    }

    #[must_use]
    pub fn detailed_statistics(&self) -> DetailedStatistics {
        DetailedStatistics::from_labels(self.file.all_labels())
    }

    /// Labels of every index space flattened to one row each, active space
    /// first, in index order within a space
    #[must_use]
    pub fn export_rows(&self) -> Vec<ExportRow> {
        let mut rows = export_space(
            self.file.index_space,
            &self.file.labels,
            &self.file.review_queue,
        );
        for scoped in &self.file.other_spaces {
            rows.extend(export_space(
                Some(scoped.index_space),
                &scoped.labels,
                &scoped.review_queue,
            ));
        }
        rows
    }

    /// Write the export rows as CSV
    pub fn export_csv(&self, path: &Path) -> Result<usize> {
        let rows = self.export_rows();
        let fields = Vec::<arrow::datatypes::FieldRef>::from_type::<ExportRow>(
            TracingOptions::default().allow_null_fields(true),
        )?;
        let batch = serde_arrow::to_record_batch(&fields, &rows)?;

        let file = std::fs::File::create(path)?;
        let mut writer = arrow::csv::WriterBuilder::new().with_header(true).build(file);
        writer.write(&batch)?;
        log::info!("Exported {} labels to {}", rows.len(), path.display());
        Ok(rows.len())
    }
}

fn export_space(
    space: Option<IndexSpace>,
    labels: &BTreeMap<String, Label>,
    review_queue: &[String],
) -> Vec<ExportRow> {
    let space = space.map(|s| s.to_string());
    let mut rows: Vec<ExportRow> = labels
        .iter()
        .filter_map(|(key, label)| {
            let index = key.parse::<u64>().ok()?;
            let current = &label.current;
            Some(ExportRow {
                index,
                study_id: current.metadata.study_id.clone(),
                patient_id: current.metadata.patient_id.clone(),
                laterality: current.laterality.to_string(),
                quality: current.quality.to_string(),
                conditions: current.conditions.names().collect::<Vec<_>>().join("; "),
                labeled_by: current.labeled_by.clone(),
                labeled_at: current
                    .labeled_at
                    .format(crate::config::DATETIME_FORMAT)
                    .to_string(),
                is_edit: current.is_edit,
                edits: u32::try_from(label.edit_history.len()).unwrap_or(u32::MAX),
                in_review: review_queue.contains(key),
                index_space: space.clone(),
            })
        })
        .collect();
    rows.sort_by_key(|row| row.index);
    rows
}
