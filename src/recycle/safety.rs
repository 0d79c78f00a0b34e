//! Path safety gate for every destructive filesystem operation.
//!
//! Index contents are treated as untrusted: paths may be stale, relative,
//! malformed, or crafted to escape the recycle root. A batch is only ever
//! handed to a delete or move call after [`validate_batch`] returns
//! [`ValidatedBatch`]; a rejection is reported and the batch is skipped.
//!
//! Checks, in order:
//! 1. The batch has at least one entry.
//! 2. Every `recyclePath` resolves to a usable absolute path.
//! 3. Every resolved path is strictly inside the recycle root.
//! 4. Every entry's parent (the batch root) is strictly inside the root and
//!    is not the root itself.
//! 5. All entries share one batch root.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::paths::{is_strict_descendant, resolve_absolute_path, resolve_entry_path};
use crate::index::batches::Batch;

/// Why a batch failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRejection {
    EmptyBatchEntries,
    InvalidRecyclePath,
    RecyclePathOutsideRecycleRoot,
    BatchRootOutsideRecycleRoot,
    BatchRootIsRecycleRoot,
    InconsistentBatchRoots,
}

impl PathRejection {
    /// Stable reason code, as written to the index.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmptyBatchEntries => "empty_batch_entries",
            Self::InvalidRecyclePath => "invalid_recycle_path",
            Self::RecyclePathOutsideRecycleRoot => "recycle_path_outside_recycle_root",
            Self::BatchRootOutsideRecycleRoot => "batch_root_outside_recycle_root",
            Self::BatchRootIsRecycleRoot => "batch_root_is_recycle_root",
            Self::InconsistentBatchRoots => "inconsistent_batch_roots",
        }
    }
}

impl fmt::Display for PathRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A batch that passed every check, with its single resolved batch root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedBatch {
    pub batch_root: PathBuf,
    /// Resolved `recyclePath` of each entry, in entry order.
    pub entry_paths: Vec<PathBuf>,
}

/// Validate every entry of `batch` against `recycle_root`.
pub fn validate_batch(
    recycle_root: &Path,
    batch: &Batch,
) -> Result<ValidatedBatch, PathRejection> {
    if batch.entries.is_empty() {
        return Err(PathRejection::EmptyBatchEntries);
    }

    let root = resolve_absolute_path(recycle_root);
    let mut batch_root: Option<PathBuf> = None;
    let mut entry_paths = Vec::with_capacity(batch.entries.len());

    for entry in &batch.entries {
        let (resolved, parent) = validate_entry_path(&root, &entry.recycle_path)?;
        match &batch_root {
            None => batch_root = Some(parent),
            Some(existing) if *existing != parent => {
                return Err(PathRejection::InconsistentBatchRoots);
            }
            Some(_) => {}
        }
        entry_paths.push(resolved);
    }

    let batch_root = batch_root.ok_or(PathRejection::EmptyBatchEntries)?;
    Ok(ValidatedBatch {
        batch_root,
        entry_paths,
    })
}

/// Validate one `recyclePath` against an already-resolved root.
///
/// Returns the resolved path and its batch root.
pub fn validate_entry_path(
    resolved_root: &Path,
    recycle_path: &Path,
) -> Result<(PathBuf, PathBuf), PathRejection> {
    let resolved = resolve_entry_path(recycle_path).ok_or(PathRejection::InvalidRecyclePath)?;
    if !is_strict_descendant(&resolved, resolved_root) {
        return Err(PathRejection::RecyclePathOutsideRecycleRoot);
    }

    let parent = resolved
        .parent()
        .map(Path::to_path_buf)
        .ok_or(PathRejection::InvalidRecyclePath)?;
    if parent == resolved_root {
        return Err(PathRejection::BatchRootIsRecycleRoot);
    }
    if !is_strict_descendant(&parent, resolved_root) {
        return Err(PathRejection::BatchRootOutsideRecycleRoot);
    }
    Ok((resolved, parent))
}
