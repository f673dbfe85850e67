//! Labeling session.
//!
//! The session owns everything one reviewer works with: the joined dataset
//! and its filtered view, the temporal linker, the reviewer's label store,
//! the route with the current position, and an unsaved draft. Positions,
//! drafts and the labels in use belong to the view's [`IndexSpace`];
//! changing the filter discards the first two and switches the label store
//! to the new space.

use std::path::PathBuf;

use crate::config::LabelerConfig;
use crate::error::{Error, Result};
use crate::filter::{FilterMode, FilteredDataset, IndexSpace};
use crate::join::{self, JoinedDataset, Record};
use crate::labels::{Label, LabelInput, LabelMetadata, LabelStore};
use crate::linker::{LinkedAnnotation, LinkedNote, TemporalLinker, group_by_laterality};
use crate::route::{RouteStrategy, plan_route};

/// Everything shown for one record
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub index: usize,
    /// Index space `index` belongs to
    pub space: IndexSpace,
    pub record: Record,
    pub image_path: PathBuf,
    pub notes: Vec<LinkedNote>,
    pub annotations: Vec<LinkedAnnotation>,
}

impl ImageData {
    /// Linked annotations grouped by laterality for display
    #[must_use]
    pub fn annotations_by_laterality(&self) -> Vec<(String, Vec<&LinkedAnnotation>)> {
        group_by_laterality(&self.annotations)
    }

    /// Label metadata captured from the record
    #[must_use]
    pub fn metadata(&self) -> LabelMetadata {
        LabelMetadata {
            study_id: self.record.study_id.clone(),
            exam_date: self.record.exam_date,
            patient_id: self.record.patient_id.clone(),
        }
    }
}

/// Unsaved label suggestion for the viewed record, copied from the latest
/// label of the same study. Never persisted until saved explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub index: usize,
    pub input: LabelInput,
}

/// Labeled count against route length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub labeled: usize,
    pub total: usize,
}

impl Progress {
    #[must_use]
    pub fn fraction(self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.labeled as f64 / self.total as f64
        }
    }
}

/// One reviewer's working context
#[derive(Debug)]
pub struct Session {
    config: LabelerConfig,
    joined: JoinedDataset,
    view: FilteredDataset,
    linker: TemporalLinker,
    labels: LabelStore,
    strategy: RouteStrategy,
    route: Vec<usize>,
    position: usize,
    draft: Option<Draft>,
}

impl Session {
    /// Load the dataset per the configuration and open `username`'s labels
    pub fn start(config: LabelerConfig, username: &str, strategy: RouteStrategy) -> Result<Self> {
        let (joined, linker) = join::prepare_dataset(&config, config.default_filter)?;
        let labels = LabelStore::open(&config.labels_dir, username)?;
        let filter = config.default_filter;
        Ok(Self::new(config, joined, linker, labels, strategy, filter))
    }

    /// Assemble a session from already loaded parts
    #[must_use]
    pub fn new(
        config: LabelerConfig,
        mut joined: JoinedDataset,
        linker: TemporalLinker,
        labels: LabelStore,
        strategy: RouteStrategy,
        filter: FilterMode,
    ) -> Self {
        let view = FilteredDataset::new(&mut joined, filter, &linker);
        let mut session = Self {
            config,
            joined,
            view,
            linker,
            labels,
            strategy,
            route: Vec::new(),
            position: 0,
            draft: None,
        };
        session.reset_route();
        session
    }

    fn reset_route(&mut self) {
        self.labels.enter_index_space(self.view.index_space());
        self.route = plan_route(self.view.len(), self.strategy, self.labels.username());
        self.position = self.resume_position();
        self.draft = None;
        self.refresh_draft();
    }

    /// Next unlabeled position after the last labeled one, wrapping to the
    /// first unlabeled position; 0 when the route is fully labeled or empty
    fn resume_position(&self) -> usize {
        let after_last = self
            .labels
            .get_last_labeled_index(&self.route)
            .map_or(0, |last| last + 1);
        self.labels
            .get_next_unlabeled_index(&self.route, after_last)
            .or_else(|| self.labels.get_next_unlabeled_index(&self.route, 0))
            .unwrap_or(0)
    }

    #[must_use]
    pub fn config(&self) -> &LabelerConfig {
        &self.config
    }

    #[must_use]
    pub fn linker(&self) -> &TemporalLinker {
        &self.linker
    }

    #[must_use]
    pub fn label_store(&self) -> &LabelStore {
        &self.labels
    }

    /// Mutable access for review queue edits
    pub fn label_store_mut(&mut self) -> &mut LabelStore {
        &mut self.labels
    }

    /// Number of records in the current view
    #[must_use]
    pub fn get_total_images(&self) -> usize {
        self.view.len()
    }

    /// Number of joined records before filtering
    #[must_use]
    pub fn unfiltered_total(&self) -> usize {
        self.view.unfiltered_len()
    }

    #[must_use]
    pub fn filter_mode(&self) -> FilterMode {
        self.view.mode()
    }

    #[must_use]
    pub fn index_space(&self) -> IndexSpace {
        self.view.index_space()
    }

    #[must_use]
    pub fn strategy(&self) -> RouteStrategy {
        self.strategy
    }

    #[must_use]
    pub fn get_route_indices(&self) -> &[usize] {
        &self.route
    }

    /// Record, image path, nearest notes and nearest annotations for a
    /// filtered index. `None` when the index is outside the view.
    #[must_use]
    pub fn get_image_data(&self, index: usize) -> Option<ImageData> {
        let Some(record) = self.view.get(index) else {
            log::debug!("Index {} not in view of {} records", index, self.view.len());
            return None;
        };
        let (notes, annotations) = match record.exam_date {
            Some(exam) => (
                record
                    .patient_id
                    .as_deref()
                    .map(|p| self.linker.notes_for(p, exam))
                    .unwrap_or_default(),
                record
                    .masked_id
                    .as_deref()
                    .map(|m| self.linker.annotations_for(m, exam))
                    .unwrap_or_default(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        Some(ImageData {
            index,
            space: self.view.index_space(),
            record: record.clone(),
            image_path: record.image_path(&self.config.image_base_path),
            notes,
            annotations,
        })
    }

    /// Switch the view to another filter. Route, position and draft are
    /// discarded and rebuilt for the new index space.
    pub fn set_filter_mode(&mut self, mode: FilterMode) {
        if mode == self.view.mode() {
            return;
        }
        log::info!("Changing filter from {} to {}", self.view.mode(), mode);
        self.view = FilteredDataset::new(&mut self.joined, mode, &self.linker);
        self.reset_route();
    }

    /// Switch to another route strategy, resuming on the new route
    pub fn set_strategy(&mut self, strategy: RouteStrategy) {
        if strategy != self.strategy {
            self.strategy = strategy;
            self.reset_route();
        }
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Record index at the current route position
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.route.get(self.position).copied()
    }

    #[must_use]
    pub fn current_image(&self) -> Option<ImageData> {
        self.current_index().and_then(|index| self.get_image_data(index))
    }

    /// Move to a route position
    pub fn goto(&mut self, position: usize) -> Result<usize> {
        if position >= self.route.len() {
            return Err(Error::IndexOutOfRange {
                index: position,
                len: self.route.len(),
            });
        }
        if position != self.position {
            self.position = position;
            self.draft = None;
            self.refresh_draft();
        }
        Ok(position)
    }

    pub fn first(&mut self) -> Result<usize> {
        self.goto(0)
    }

    /// Step back one position; stays put at the start
    pub fn previous(&mut self) -> Result<usize> {
        self.goto(self.position.saturating_sub(1))
    }

    /// Step forward one position; stays put at the end
    pub fn next(&mut self) -> Result<usize> {
        let last = self.route.len().saturating_sub(1);
        self.goto((self.position + 1).min(last))
    }

    /// Jump to the next unlabeled position after the current one
    pub fn next_unlabeled(&mut self) -> Result<Option<usize>> {
        match self
            .labels
            .get_next_unlabeled_index(&self.route, self.position + 1)
        {
            Some(position) => self.goto(position).map(Some),
            None => Ok(None),
        }
    }

    /// Saved label of the viewed record
    #[must_use]
    pub fn current_label(&self) -> Option<&Label> {
        self.current_index().and_then(|index| self.labels.get_label(index))
    }

    /// Unsaved suggestion for the viewed record, if any
    #[must_use]
    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    /// Values to pre-populate the form with: the saved label, else the draft
    #[must_use]
    pub fn form_defaults(&self) -> Option<LabelInput> {
        self.current_label()
            .map(|label| label.current.to_input())
            .or_else(|| self.draft.as_ref().map(|draft| draft.input.clone()))
    }

    fn refresh_draft(&mut self) {
        if !self.config.auto_fill_same_study {
            return;
        }
        let Some(index) = self.current_index() else {
            return;
        };
        if self.labels.is_labeled(index) {
            return;
        }
        let Some(study_id) = self.view.get(index).and_then(|r| r.study_id.as_deref()) else {
            return;
        };
        if let Some(label) = self.labels.get_last_label_for_studyid(study_id) {
            log::debug!("Auto-filling index {index} from study {study_id}");
            self.draft = Some(Draft {
                index,
                input: label.current.to_input(),
            });
        }
    }

    /// Save a label for the viewed record and advance.
    ///
    /// `space` is the index space the label was entered against; a label
    /// entered before a filter change is rejected. Metadata and image path
    /// are captured from the record. Returns the new position.
    pub fn save_label(
        &mut self,
        space: IndexSpace,
        mut input: LabelInput,
        mark_for_review: bool,
    ) -> Result<usize> {
        let current = self.view.index_space();
        if space != current {
            return Err(Error::StaleIndexSpace {
                expected: space,
                actual: current,
            });
        }
        let index = self.current_index().ok_or(Error::IndexOutOfRange {
            index: self.position,
            len: self.route.len(),
        })?;
        let image = self.get_image_data(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.view.len(),
        })?;

        input.metadata = image.metadata();
        if input.image_path.is_none() {
            input.image_path = Some(image.image_path.to_string_lossy().into_owned());
        }
        if mark_for_review {
            self.labels.add_label_for_review(index, input)?;
        } else {
            self.labels.add_label(index, input)?;
        }
        self.draft = None;

        let next = self
            .labels
            .get_next_unlabeled_index(&self.route, self.position + 1)
            .or_else(|| (self.position + 1 < self.route.len()).then_some(self.position + 1));
        match next {
            Some(position) => self.goto(position),
            None => Ok(self.position),
        }
    }

    /// Labeled count against the route length
    #[must_use]
    pub fn progress(&self) -> Progress {
        Progress {
            labeled: self
                .route
                .iter()
                .filter(|&&index| self.labels.is_labeled(index))
                .count(),
            total: self.route.len(),
        }
    }
}
