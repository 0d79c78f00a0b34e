//! Recycle-root summary: logged batches plus actual on-disk usage.
//!
//! `indexed_bytes` comes from the index and `total_bytes` from walking the
//! disk. They diverge when files are removed out-of-band; both are reported
//! and neither is corrected.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::errors::{Result, RkError};
use crate::core::pool::map_bounded;
use crate::index::batches::{Batch, ListOptions, list_batches};

/// Default number of threads sizing top-level recycle entries.
pub const DEFAULT_SIZE_CONCURRENCY: usize = 4;

/// Snapshot of the recycle root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecycleStats {
    pub batches: Vec<Batch>,
    pub total_batches: usize,
    /// Bytes actually on disk under the recycle root (symlinks not followed).
    pub total_bytes: u64,
    /// Sum of logged batch sizes.
    pub indexed_bytes: u64,
    pub oldest_time: Option<i64>,
}

/// Inputs for [`collect_recycle_stats`].
#[derive(Debug, Clone)]
pub struct StatsOptions<'a> {
    pub index_path: &'a Path,
    pub recycle_root: &'a Path,
    /// When false and the root is absent, return zeroed stats and create nothing.
    pub create_if_missing: bool,
    pub size_concurrency: usize,
}

impl<'a> StatsOptions<'a> {
    pub fn new(index_path: &'a Path, recycle_root: &'a Path) -> Self {
        Self {
            index_path,
            recycle_root,
            create_if_missing: false,
            size_concurrency: DEFAULT_SIZE_CONCURRENCY,
        }
    }
}

/// Summarize the recycle root.
pub fn collect_recycle_stats(options: &StatsOptions<'_>) -> Result<RecycleStats> {
    collect_excluding(options, &HashSet::new())
}

/// Like [`collect_recycle_stats`], treating `excluded` batch ids as gone.
pub(crate) fn collect_excluding(
    options: &StatsOptions<'_>,
    excluded: &HashSet<String>,
) -> Result<RecycleStats> {
    let root = options.recycle_root;
    if !root.is_dir() {
        if !options.create_if_missing {
            return Ok(RecycleStats::default());
        }
        fs::create_dir_all(root).map_err(|e| RkError::io(root, e))?;
    }

    let mut batches = match list_batches(
        options.index_path,
        ListOptions {
            recycle_root: Some(root),
        },
    ) {
        Ok(batches) => batches,
        Err(e) => {
            eprintln!("[RK-STATS] index unreadable, treating as empty: {e}");
            Vec::new()
        }
    };
    batches.retain(|b| !excluded.contains(&b.batch_id));

    let indexed_bytes = batches
        .iter()
        .fold(0_u64, |acc, b| acc.saturating_add(b.total_bytes));
    let oldest_time = batches.iter().map(|b| b.first_time).min();
    let total_bytes = disk_usage(root, options.size_concurrency);

    Ok(RecycleStats {
        total_batches: batches.len(),
        batches,
        total_bytes,
        indexed_bytes,
        oldest_time,
    })
}

/// On-disk bytes under `root`, sizing its top-level entries concurrently.
pub fn disk_usage(root: &Path, concurrency: usize) -> u64 {
    let Ok(entries) = fs::read_dir(root) else {
        return 0;
    };
    let children: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    map_bounded(children, concurrency, |path| dir_size(&path))
        .into_iter()
        .fold(0_u64, u64::saturating_add)
}

/// Recursive size of `path`. Symlinks count as zero and are never followed;
/// unreadable entries are skipped.
pub fn dir_size(path: &Path) -> u64 {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return 0;
    };
    let ft = meta.file_type();
    if ft.is_symlink() {
        return 0;
    }
    if !ft.is_dir() {
        return meta.len();
    }

    let mut total = 0_u64;
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(ft) = entry.file_type() else {
                continue;
            };
            if ft.is_symlink() {
                continue;
            }
            if ft.is_dir() {
                stack.push(entry.path());
            } else if let Ok(meta) = entry.metadata() {
                total = total.saturating_add(meta.len());
            }
        }
    }
    total
}
