//! Per-key, date-sorted index used for window lookups.

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::dataset::{Annotation, Note};

/// Anything that is keyed by a subject and carries a date
pub trait Dated {
    /// Subject key this item links through (patient id, study id, ...)
    fn subject(&self) -> &str;
    /// The item's date
    fn date(&self) -> NaiveDate;
}

impl Dated for Note {
    fn subject(&self) -> &str {
        &self.patient_id
    }

    fn date(&self) -> NaiveDate {
        self.note_date
    }
}

impl Dated for Annotation {
    fn subject(&self) -> &str {
        &self.subject_id
    }

    fn date(&self) -> NaiveDate {
        self.annotation_date
    }
}

/// Items grouped by subject, each group sorted by date.
///
/// Sorting is stable so items sharing a date keep their source order.
#[derive(Debug, Clone)]
pub struct DateIndex<T> {
    groups: FxHashMap<String, Vec<T>>,
    len: usize,
}

impl<T> Default for DateIndex<T> {
    fn default() -> Self {
        Self {
            groups: FxHashMap::default(),
            len: 0,
        }
    }
}

impl<T: Dated> DateIndex<T> {
    /// Group and sort items
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        let len = items.len();
        let mut groups: FxHashMap<String, Vec<T>> = FxHashMap::default();
        for item in items {
            groups.entry(item.subject().to_string()).or_default().push(item);
        }
        for group in groups.values_mut() {
            group.sort_by_key(|item| item.date());
        }
        Self { groups, len }
    }

    /// All items of one subject in date order
    #[must_use]
    pub fn subject(&self, key: &str) -> &[T] {
        self.groups.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Items of `key` whose date lies within `days` of `center` (inclusive)
    #[must_use]
    pub fn window(&self, key: &str, center: NaiveDate, days: i64) -> &[T] {
        let items = self.subject(key);
        if days < 0 {
            return &[];
        }
        let (Some(low), Some(high)) = (
            center.checked_sub_signed(chrono::Duration::days(days)),
            center.checked_add_signed(chrono::Duration::days(days)),
        ) else {
            return items;
        };

        let start = items.partition_point(|item| item.date() < low);
        let end = items.partition_point(|item| item.date() <= high);
        &items[start..end]
    }

    /// Number of items of `key` within `days` of `center`
    #[must_use]
    pub fn count_within(&self, key: &str, center: NaiveDate, days: i64) -> usize {
        self.window(key, center, days).len()
    }

    /// Number of distinct subjects
    #[must_use]
    pub fn subject_count(&self) -> usize {
        self.groups.len()
    }

    /// Total number of indexed items
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the index holds no items
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the subject has any item at all
    #[must_use]
    pub fn contains_subject(&self, key: &str) -> bool {
        self.groups.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(patient: &str, date: NaiveDate, id: &str) -> Note {
        Note {
            note_id: Some(id.to_string()),
            patient_id: patient.to_string(),
            note_date: date,
            text: String::new(),
            note_type: None,
        }
    }

    #[test]
    fn test_window_is_inclusive_and_sorted() {
        let exam = NaiveDate::from_ymd_opt(2022, 6, 1).unwrap();
        let d = |offset: i64| exam + chrono::Duration::days(offset);
        let index = DateIndex::new(vec![
            note("p1", d(11), "far"),
            note("p1", d(10), "edge_after"),
            note("p1", d(-10), "edge_before"),
            note("p1", d(-11), "too_early"),
            note("p2", d(0), "other_patient"),
        ]);

        let ids: Vec<_> = index
            .window("p1", exam, 10)
            .iter()
            .map(|n| n.note_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["edge_before", "edge_after"]);
        assert_eq!(index.count_within("p2", exam, 0), 1);
        assert_eq!(index.count_within("missing", exam, 100), 0);
        assert_eq!(index.subject_count(), 2);
        assert_eq!(index.len(), 5);
    }
}
