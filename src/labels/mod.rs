//! Label store: typed hierarchical labels, validation, versioned per-user
//! persistence and statistics.

pub mod model;
pub mod statistics;
pub mod store;
pub mod validation;

pub use model::{
    Cataract, CataractType, Condition, ConditionCategory, Conditions, DryEye, Etiology,
    Hemorrhage, HemorrhageExtent, HistoryEntry, Infectious, InfectiousType, Label, LabelInput,
    LabelMetadata, LabelSnapshot, Laterality, LesionSize, Malignancy, Presence, Quality, Severity,
    Tumor, TumorLocation, TumorType,
};
pub use statistics::{
    DetailedStatistics, LabelStatistics, UserStatistics, all_user_statistics, merge_statistics,
};
pub use store::{ExportRow, LabelFile, LabelStore, label_file_path};
pub use validation::ValidationError;
