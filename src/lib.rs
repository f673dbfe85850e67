//! Record-linkage, routing and label persistence core for annotating
//! slit-lamp image datasets.
//!
//! Four tabular sources (image crosswalk, diagnosis records, clinical notes,
//! exam annotations) are joined and temporally linked, filtered into a
//! contiguously indexed view, traversed along a per-user route, and labeled
//! into a versioned per-user store.

pub mod auth;
pub mod config;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod join;
pub mod labels;
pub mod linker;
pub mod route;
pub mod session;
pub mod utils;

// Core types
pub use config::{LabelerConfig, LinkageWindows};
pub use error::{Error, Result};

// Loading and linkage
pub use dataset::{Annotation, Note, RawSources, load_sources};
pub use join::{CacheSummary, JoinedDataset, Record, prepare_dataset, run_preprocessing};
pub use linker::{LinkedAnnotation, LinkedNote, NotePosition, TemporalLinker};

// Views and routes
pub use filter::{FilterMode, FilteredDataset, IndexSpace};
pub use route::{RouteStrategy, plan_route};

// Labels, accounts and sessions
pub use auth::{CredentialError, CredentialStore, Role};
pub use labels::{Label, LabelInput, LabelStore, ValidationError};
pub use session::{ImageData, Session};
