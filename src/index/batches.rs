//! Batch aggregation: fold the flat index into per-`batchId` views.
//!
//! Aggregation is a pure function of the log content. Batches are never
//! stored; they are recomputed on every read.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::errors::Result;
use crate::index::entry::{CleanupRecord, LogEntry, STATUS_SUCCESS};
use crate::index::log::IndexLog;

/// All successfully quarantined entries sharing one `batchId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub batch_id: String,
    pub entries: Vec<CleanupRecord>,
    /// Earliest entry time (epoch ms).
    pub first_time: i64,
    /// Sum of logged entry sizes.
    pub total_bytes: u64,
}

impl Batch {
    /// Scope of the first entry, if any entry recorded one.
    pub fn scope(&self) -> Option<&str> {
        self.entries
            .iter()
            .map(|e| e.scope.as_str())
            .find(|s| !s.is_empty())
    }
}

/// Options for [`list_batches`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions<'a> {
    /// Relative `recyclePath` values are interpreted against this root.
    pub recycle_root: Option<&'a Path>,
}

/// Read the index at `index_path` and aggregate it into batches.
///
/// Batches come back newest first (`firstTime` descending, ties by id).
pub fn list_batches(index_path: &Path, options: ListOptions<'_>) -> Result<Vec<Batch>> {
    let entries = IndexLog::new(index_path).read_all()?;
    Ok(aggregate(entries, options))
}

/// Group `cleanup`/`success` entries by `batchId`.
///
/// Batches purged by an earlier real maintenance run are dropped, as are
/// entries already restored. A batch left with no entries never appears.
pub fn aggregate<I>(entries: I, options: ListOptions<'_>) -> Vec<Batch>
where
    I: IntoIterator<Item = LogEntry>,
{
    let mut cleanups: Vec<CleanupRecord> = Vec::new();
    let mut purged: HashSet<String> = HashSet::new();
    let mut restored: HashSet<(String, PathBuf)> = HashSet::new();

    for entry in entries {
        match entry {
            LogEntry::Cleanup(mut record) if record.is_success() => {
                if let Some(root) = options.recycle_root
                    && record.recycle_path.is_relative()
                {
                    record.recycle_path = root.join(&record.recycle_path);
                }
                cleanups.push(record);
            }
            LogEntry::Cleanup(_) => {}
            LogEntry::RecycleMaintain(summary) => {
                if !summary.dry_run {
                    purged.extend(summary.purged_batch_ids);
                }
            }
            LogEntry::Restore(record) => {
                if record.status == STATUS_SUCCESS {
                    restored.insert((record.batch_id, record.recycle_path));
                }
            }
        }
    }

    let mut grouped: BTreeMap<String, Batch> = BTreeMap::new();
    for record in cleanups {
        if purged.contains(&record.batch_id) {
            continue;
        }
        if restored.contains(&(record.batch_id.clone(), record.recycle_path.clone())) {
            continue;
        }
        let batch = grouped
            .entry(record.batch_id.clone())
            .or_insert_with(|| Batch {
                batch_id: record.batch_id.clone(),
                entries: Vec::new(),
                first_time: record.time,
                total_bytes: 0,
            });
        batch.first_time = batch.first_time.min(record.time);
        batch.total_bytes = batch.total_bytes.saturating_add(record.size_bytes);
        batch.entries.push(record);
    }

    let mut batches: Vec<Batch> = grouped.into_values().collect();
    sort_newest_first(&mut batches);
    batches
}

/// Sort by `firstTime` descending; ties broken by id so the order is total.
pub fn sort_newest_first(batches: &mut [Batch]) {
    batches.sort_by(|a, b| {
        b.first_time
            .cmp(&a.first_time)
            .then_with(|| a.batch_id.cmp(&b.batch_id))
    });
}
