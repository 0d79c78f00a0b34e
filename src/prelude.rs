//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use recycle_keeper::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, RkError};

// Index
pub use crate::index::batches::{Batch, ListOptions, list_batches};
pub use crate::index::entry::{CleanupRecord, LogEntry, MaintainRecord, RestoreRecord};
pub use crate::index::log::IndexLog;

// Recycle
pub use crate::recycle::classify::{ErrorType, classify_error_message};
pub use crate::recycle::maintain::{
    MaintainOptions, MaintenanceOutcome, MaintenanceStatus, maintain_recycle_bin,
};
pub use crate::recycle::quarantine::{QuarantineOptions, QuarantineOutcome, quarantine_paths};
pub use crate::recycle::restore::{
    ConflictPolicy, RestoreOptions, RestoreOutcome, RestoreStatus, restore_batch,
};
pub use crate::recycle::retention::{
    RetentionPolicy, RetentionPolicyInput, SelectedBy, Selection, select_candidates,
};
pub use crate::recycle::safety::{PathRejection, ValidatedBatch, validate_batch};
pub use crate::recycle::stats::{RecycleStats, StatsOptions, collect_recycle_stats};
