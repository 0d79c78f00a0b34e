//! Restore a quarantined batch back to its original locations.
//!
//! The batch is located through the same aggregation the maintainer uses and
//! must pass the same path safety gate before anything moves. Each entry gets
//! one `restore` line in the index.

#![allow(missing_docs)]

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, RkError};
use crate::index::batches::{ListOptions, list_batches};
use crate::index::entry::{
    LogEntry, RestoreRecord, STATUS_FAILED, STATUS_SKIPPED, STATUS_SUCCESS, now_millis,
};
use crate::index::log::IndexLog;
use crate::recycle::classify::{ErrorType, classify_io_error};
use crate::recycle::safety::validate_batch;
use crate::recycle::transfer::{exists_no_follow, move_path, remove_path, unique_restore_path};

/// What to do when the original location is occupied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Restore next to the occupant as `name.restored-N`.
    #[default]
    Rename,
    /// Replace the occupant.
    Overwrite,
    /// Leave the entry in quarantine.
    Skip,
}

impl ConflictPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rename => "rename",
            Self::Overwrite => "overwrite",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = RkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rename" => Ok(Self::Rename),
            "overwrite" => Ok(Self::Overwrite),
            "skip" => Ok(Self::Skip),
            other => Err(RkError::InvalidConfig {
                details: format!("unknown conflict policy {other:?} (rename|overwrite|skip)"),
            }),
        }
    }
}

/// Terminal state of one restore invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStatus {
    Success,
    PartialFailed,
    /// Every entry was left in place by the conflict policy.
    Skipped,
    /// No live batch with that id.
    NotFound,
    /// The batch failed path validation; nothing moved.
    Rejected,
    DryRun,
}

/// Per-entry restore result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreEntryOutcome {
    pub source_path: PathBuf,
    pub recycle_path: PathBuf,
    pub restored_path: Option<PathBuf>,
    pub status: String,
    pub error: Option<String>,
    pub error_type: Option<ErrorType>,
}

/// Result of [`restore_batch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    pub status: RestoreStatus,
    pub batch_id: String,
    pub restored: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rejection: Option<String>,
    pub entries: Vec<RestoreEntryOutcome>,
}

/// Inputs for [`restore_batch`].
#[derive(Debug, Clone)]
pub struct RestoreOptions<'a> {
    pub index_path: &'a Path,
    pub recycle_root: &'a Path,
    pub batch_id: &'a str,
    pub conflict: ConflictPolicy,
    pub dry_run: bool,
    pub fsync_on_append: bool,
}

/// Move every entry of `batch_id` back to its source path.
pub fn restore_batch(options: &RestoreOptions<'_>) -> Result<RestoreOutcome> {
    let batches = list_batches(
        options.index_path,
        ListOptions {
            recycle_root: Some(options.recycle_root),
        },
    )?;
    let mut outcome = RestoreOutcome {
        status: RestoreStatus::NotFound,
        batch_id: options.batch_id.to_string(),
        restored: 0,
        skipped: 0,
        failed: 0,
        rejection: None,
        entries: Vec::new(),
    };
    let Some(batch) = batches.into_iter().find(|b| b.batch_id == options.batch_id) else {
        return Ok(outcome);
    };

    let index = IndexLog::new(options.index_path).with_fsync(options.fsync_on_append);
    let validated = match validate_batch(options.recycle_root, &batch) {
        Ok(v) => v,
        Err(reason) => {
            outcome.status = RestoreStatus::Rejected;
            outcome.rejection = Some(reason.as_str().to_string());
            outcome.failed = batch.entries.len();
            for entry in &batch.entries {
                let result = RestoreEntryOutcome {
                    source_path: entry.source_path.clone(),
                    recycle_path: entry.recycle_path.clone(),
                    restored_path: None,
                    status: STATUS_FAILED.to_string(),
                    error: Some(reason.as_str().to_string()),
                    error_type: Some(ErrorType::PathValidationFailed),
                };
                if !options.dry_run {
                    index.append(&restore_line(&batch.batch_id, options.conflict, &result))?;
                }
                outcome.entries.push(result);
            }
            return Ok(outcome);
        }
    };

    for (entry, resolved) in batch.entries.iter().zip(&validated.entry_paths) {
        let result = restore_entry(
            &entry.source_path,
            &entry.recycle_path,
            resolved,
            options.conflict,
            options.dry_run,
        );
        match result.status.as_str() {
            STATUS_SUCCESS => outcome.restored += 1,
            STATUS_SKIPPED => outcome.skipped += 1,
            _ => outcome.failed += 1,
        }
        if !options.dry_run {
            index.append(&restore_line(&batch.batch_id, options.conflict, &result))?;
        }
        outcome.entries.push(result);
    }

    if !options.dry_run {
        // Only succeeds once the batch directory is empty.
        let _ = fs::remove_dir(&validated.batch_root);
    }

    outcome.status = if options.dry_run {
        RestoreStatus::DryRun
    } else if outcome.failed > 0 {
        RestoreStatus::PartialFailed
    } else if outcome.restored == 0 {
        RestoreStatus::Skipped
    } else {
        RestoreStatus::Success
    };
    Ok(outcome)
}

fn restore_entry(
    source_path: &Path,
    recycle_path: &Path,
    resolved: &Path,
    conflict: ConflictPolicy,
    dry_run: bool,
) -> RestoreEntryOutcome {
    let mut result = RestoreEntryOutcome {
        source_path: source_path.to_path_buf(),
        recycle_path: recycle_path.to_path_buf(),
        restored_path: None,
        status: STATUS_FAILED.to_string(),
        error: None,
        error_type: None,
    };

    if !exists_no_follow(resolved) {
        result.error = Some(format!("quarantined copy missing: {}", resolved.display()));
        result.error_type = Some(ErrorType::NotFound);
        return result;
    }

    let mut target = source_path.to_path_buf();
    if exists_no_follow(&target) {
        match conflict {
            ConflictPolicy::Skip => {
                result.status = STATUS_SKIPPED.to_string();
                return result;
            }
            ConflictPolicy::Rename => target = unique_restore_path(&target),
            ConflictPolicy::Overwrite => {
                if !dry_run && let Err(e) = remove_path(&target) {
                    result.error = Some(format!("remove {}: {e}", target.display()));
                    result.error_type = Some(classify_io_error(&e));
                    return result;
                }
            }
        }
    }

    if !dry_run {
        let moved = target
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| move_path(resolved, &target));
        if let Err(e) = moved {
            result.error = Some(format!("{} -> {}: {e}", resolved.display(), target.display()));
            result.error_type = Some(classify_io_error(&e));
            return result;
        }
    }

    result.status = STATUS_SUCCESS.to_string();
    result.restored_path = Some(target);
    result
}

fn restore_line(batch_id: &str, conflict: ConflictPolicy, result: &RestoreEntryOutcome) -> LogEntry {
    LogEntry::Restore(RestoreRecord {
        status: result.status.clone(),
        batch_id: batch_id.to_string(),
        source_path: result.source_path.clone(),
        recycle_path: result.recycle_path.clone(),
        restored_path: result.restored_path.clone(),
        conflict,
        time: now_millis(),
        error: result.error.clone(),
        error_type: result.error_type,
    })
}
