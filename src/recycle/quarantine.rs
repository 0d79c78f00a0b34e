//! Move paths into a fresh batch under the recycle root.
//!
//! This is the producer side of the index: each source gets exactly one
//! `cleanup` line, whether the move worked or not.

#![allow(missing_docs)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use serde::Serialize;

use crate::core::errors::{Result, RkError};
use crate::core::paths::{resolve_absolute_path, resolve_entry_path};
use crate::index::entry::{CleanupRecord, LogEntry, STATUS_FAILED, STATUS_SUCCESS, now_millis};
use crate::index::log::IndexLog;
use crate::recycle::classify::{ErrorType, classify_io_error};
use crate::recycle::stats::dir_size;
use crate::recycle::transfer::{exists_no_follow, move_path, unique_child};

const BATCH_DIR_ATTEMPTS: usize = 8;

/// Inputs for [`quarantine_paths`].
#[derive(Debug, Clone)]
pub struct QuarantineOptions<'a> {
    pub index_path: &'a Path,
    pub recycle_root: &'a Path,
    /// Free-form tag recorded on every line of the batch.
    pub scope: &'a str,
    pub sources: &'a [PathBuf],
    pub fsync_on_append: bool,
    /// Clock override, epoch milliseconds.
    pub now: Option<i64>,
}

/// One source that could not be quarantined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantineFailure {
    pub source_path: PathBuf,
    pub message: String,
    pub error_type: ErrorType,
}

/// Result of [`quarantine_paths`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantineOutcome {
    pub batch_id: String,
    pub batch_root: PathBuf,
    pub moved: usize,
    pub moved_bytes: u64,
    pub failures: Vec<QuarantineFailure>,
}

/// `YYYYMMDD-HHMMSS-xxxxxx` in UTC with a random hex suffix.
pub fn new_batch_id(now_ms: i64) -> String {
    let stamp = DateTime::from_timestamp_millis(now_ms)
        .map(|t| t.format("%Y%m%d-%H%M%S").to_string())
        .unwrap_or_else(|| "00000000-000000".to_string());
    format!("{stamp}-{:06x}", rand::random::<u32>() & 0x00ff_ffff)
}

/// Move every source into one new batch directory.
pub fn quarantine_paths(options: &QuarantineOptions<'_>) -> Result<QuarantineOutcome> {
    if options.sources.is_empty() {
        return Err(RkError::InvalidConfig {
            details: "quarantine needs at least one path".to_string(),
        });
    }
    let now = options.now.unwrap_or_else(now_millis);
    fs::create_dir_all(options.recycle_root).map_err(|e| RkError::io(options.recycle_root, e))?;
    let root = resolve_absolute_path(options.recycle_root);
    let (batch_id, batch_root) = create_batch_dir(&root, now)?;
    let index = IndexLog::new(options.index_path).with_fsync(options.fsync_on_append);

    let mut outcome = QuarantineOutcome {
        batch_id,
        batch_root,
        moved: 0,
        moved_bytes: 0,
        failures: Vec::new(),
    };

    for source in options.sources {
        let mut record = CleanupRecord {
            status: STATUS_FAILED.to_string(),
            batch_id: outcome.batch_id.clone(),
            scope: options.scope.to_string(),
            source_path: source.clone(),
            recycle_path: PathBuf::new(),
            size_bytes: 0,
            time: now,
            error: None,
            error_type: None,
        };

        match quarantine_one(&root, &outcome.batch_root, source) {
            Ok((resolved, dest, size)) => {
                record.status = STATUS_SUCCESS.to_string();
                record.source_path = resolved;
                record.recycle_path = dest;
                record.size_bytes = size;
                outcome.moved += 1;
                outcome.moved_bytes = outcome.moved_bytes.saturating_add(size);
            }
            Err((message, error_type, dest)) => {
                record.recycle_path = dest;
                record.error = Some(message.clone());
                record.error_type = Some(error_type);
                outcome.failures.push(QuarantineFailure {
                    source_path: source.clone(),
                    message,
                    error_type,
                });
            }
        }
        index.append(&LogEntry::Cleanup(record))?;
    }

    if outcome.moved == 0 {
        let _ = fs::remove_dir(&outcome.batch_root);
    }
    Ok(outcome)
}

type Failure = (String, ErrorType, PathBuf);

fn quarantine_one(
    root: &Path,
    batch_root: &Path,
    source: &Path,
) -> std::result::Result<(PathBuf, PathBuf, u64), Failure> {
    let Some(resolved) = resolve_entry_path(source) else {
        return Err((
            format!("invalid path: {}", source.display()),
            ErrorType::PathValidationFailed,
            PathBuf::new(),
        ));
    };
    if resolved.starts_with(root) || root.starts_with(&resolved) {
        return Err((
            format!("{} overlaps the recycle root", resolved.display()),
            ErrorType::PathValidationFailed,
            PathBuf::new(),
        ));
    }
    if !exists_no_follow(&resolved) {
        return Err((
            format!("not found: {}", resolved.display()),
            ErrorType::NotFound,
            PathBuf::new(),
        ));
    }

    let name = resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dest = unique_child(batch_root, &name);
    let size = dir_size(&resolved);
    match move_path(&resolved, &dest) {
        Ok(()) => Ok((resolved, dest, size)),
        Err(e) => Err((
            format!("{} -> {}: {e}", resolved.display(), dest.display()),
            classify_io_error(&e),
            dest,
        )),
    }
}

fn create_batch_dir(root: &Path, now: i64) -> Result<(String, PathBuf)> {
    let mut last = None;
    for _ in 0..BATCH_DIR_ATTEMPTS {
        let id = new_batch_id(now);
        let dir = root.join(&id);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok((id, dir)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => last = Some(dir),
            Err(e) => return Err(RkError::io(&dir, e)),
        }
    }
    Err(RkError::Runtime {
        details: format!(
            "could not allocate a batch directory under {} (last tried {})",
            root.display(),
            last.unwrap_or_default().display()
        ),
    })
}
