//! Maintenance orchestrator: stats -> select -> validate -> delete -> audit.
//!
//! Candidates are processed strictly sequentially, newest first, so the error
//! list, the progress callbacks, and the audit line all match the exact order
//! of filesystem effects. One batch failing never stops the others; the run
//! ends `partial_failed` instead. Every invocation, including the skipped
//! ones, appends exactly one `recycle_maintain` line to the index.
//!
//! There is no retry loop and no cancellation. A killed run leaves the index
//! consistent up to its last full line and the recycle root consistent up to
//! the last fully processed batch; a single batch removal is not atomic.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::Result;
use crate::index::batches::Batch;
use crate::index::entry::{LogEntry, MaintainRecord, now_millis};
use crate::index::log::IndexLog;
use crate::recycle::classify::{ErrorType, classify_io_error, summarize_error_types};
use crate::recycle::retention::{
    RetentionPolicy, RetentionPolicyInput, SelectedBy, Selection, select_candidates,
};
use crate::recycle::safety::validate_batch;
use crate::recycle::stats::{
    DEFAULT_SIZE_CONCURRENCY, RecycleStats, StatsOptions, collect_excluding,
};

// ──────────────────── outcome types ────────────────────

/// Terminal state of one maintenance invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStatus {
    SkippedDisabled,
    SkippedNoCandidate,
    DryRun,
    Success,
    PartialFailed,
}

impl MaintenanceStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SkippedDisabled => "skipped_disabled",
            Self::SkippedNoCandidate => "skipped_no_candidate",
            Self::DryRun => "dry_run",
            Self::Success => "success",
            Self::PartialFailed => "partial_failed",
        }
    }
}

/// One candidate that was not deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub batch_id: String,
    pub message: String,
    pub error_type: ErrorType,
}

/// Compact view of a [`RecycleStats`] snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_batches: usize,
    pub total_bytes: u64,
    pub indexed_bytes: u64,
    pub oldest_time: Option<i64>,
}

impl From<&RecycleStats> for StatsSummary {
    fn from(stats: &RecycleStats) -> Self {
        Self {
            total_batches: stats.total_batches,
            total_bytes: stats.total_bytes,
            indexed_bytes: stats.indexed_bytes,
            oldest_time: stats.oldest_time,
        }
    }
}

/// A selected batch as reported in the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSummary {
    pub batch_id: String,
    pub selected_by: SelectedBy,
    pub first_time: i64,
    pub total_bytes: u64,
}

/// Result of [`maintain_recycle_bin`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceOutcome {
    pub status: MaintenanceStatus,
    pub dry_run: bool,
    pub ran_at: i64,
    pub policy: RetentionPolicy,
    pub threshold_bytes: u64,
    pub estimated_after_bytes: u64,
    pub candidates: Vec<CandidateSummary>,
    pub selected_by_age: usize,
    pub selected_by_size: usize,
    pub deleted_batches: usize,
    pub deleted_bytes: u64,
    pub fail_batches: usize,
    pub errors: Vec<BatchFailure>,
    pub before: StatsSummary,
    pub after: StatsSummary,
}

// ──────────────────── options ────────────────────

/// Inputs for one maintenance run.
#[derive(Debug, Clone)]
pub struct MaintainOptions<'a> {
    pub index_path: &'a Path,
    pub recycle_root: &'a Path,
    /// Raw policy; normalized against `fallback` before use.
    pub policy: RetentionPolicyInput,
    pub fallback: RetentionPolicy,
    pub dry_run: bool,
    /// Clock override (epoch ms); `None` reads the system clock.
    pub now: Option<i64>,
    pub size_concurrency: usize,
    pub fsync_on_append: bool,
    /// Recorded verbatim in the audit line.
    pub config_hash: Option<String>,
}

impl<'a> MaintainOptions<'a> {
    pub fn new(index_path: &'a Path, recycle_root: &'a Path, policy: &RetentionPolicy) -> Self {
        Self {
            index_path,
            recycle_root,
            policy: RetentionPolicyInput::from(policy),
            fallback: RetentionPolicy::default(),
            dry_run: false,
            now: None,
            size_concurrency: DEFAULT_SIZE_CONCURRENCY,
            fsync_on_append: true,
            config_hash: None,
        }
    }

    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn at(mut self, now: i64) -> Self {
        self.now = Some(now);
        self
    }
}

// ──────────────────── run loop ────────────────────

/// Run one maintenance pass over the recycle root.
///
/// `on_progress` is called as `(index, total)` (1-based) before each
/// candidate is processed. Per-batch failures land in the outcome; `Err` is
/// only returned when the run itself cannot proceed (recycle root cannot be
/// created, audit line cannot be appended).
pub fn maintain_recycle_bin(
    options: &MaintainOptions<'_>,
    mut on_progress: Option<&mut dyn FnMut(usize, usize)>,
) -> Result<MaintenanceOutcome> {
    let now = options.now.unwrap_or_else(now_millis);
    let policy = RetentionPolicy::normalize(&options.policy, &options.fallback);
    let index = IndexLog::new(options.index_path).with_fsync(options.fsync_on_append);

    let stats_options = StatsOptions {
        index_path: options.index_path,
        recycle_root: options.recycle_root,
        create_if_missing: policy.enabled && !options.dry_run,
        size_concurrency: options.size_concurrency,
    };
    let before = collect_excluding(&stats_options, &HashSet::new())?;
    let selection = select_candidates(&before.batches, &policy, now, before.total_bytes);

    let mut run = RunState::new(options.dry_run);

    let status = if !policy.enabled {
        MaintenanceStatus::SkippedDisabled
    } else if selection.candidates.is_empty() {
        MaintenanceStatus::SkippedNoCandidate
    } else {
        let total = selection.candidates.len();
        for (i, candidate) in selection.candidates.iter().enumerate() {
            if let Some(progress) = on_progress.as_mut() {
                progress(i + 1, total);
            }
            run.process(options.recycle_root, &candidate.batch);
        }

        if options.dry_run {
            MaintenanceStatus::DryRun
        } else if run.errors.is_empty() {
            MaintenanceStatus::Success
        } else {
            MaintenanceStatus::PartialFailed
        }
    };

    let touched_disk = matches!(
        status,
        MaintenanceStatus::Success | MaintenanceStatus::PartialFailed
    );
    let after = if touched_disk {
        let purged: HashSet<String> = run.purged.iter().cloned().collect();
        let after_options = StatsOptions {
            create_if_missing: false,
            ..stats_options
        };
        collect_excluding(&after_options, &purged)?
    } else {
        before.clone()
    };

    let record = audit_record(
        now,
        status,
        options,
        &policy,
        &selection,
        &before,
        &after,
        &run,
    );
    index.append(&LogEntry::RecycleMaintain(record))?;

    Ok(MaintenanceOutcome {
        status,
        dry_run: options.dry_run,
        ran_at: now,
        policy,
        threshold_bytes: selection.threshold_bytes,
        estimated_after_bytes: selection.estimated_after_bytes,
        candidates: selection
            .candidates
            .iter()
            .map(|c| CandidateSummary {
                batch_id: c.batch.batch_id.clone(),
                selected_by: c.selected_by,
                first_time: c.batch.first_time,
                total_bytes: c.batch.total_bytes,
            })
            .collect(),
        selected_by_age: selection.count_by(SelectedBy::Age),
        selected_by_size: selection.count_by(SelectedBy::Size),
        deleted_batches: run.deleted_batches,
        deleted_bytes: run.deleted_bytes,
        fail_batches: run.errors.len(),
        errors: run.errors,
        before: StatsSummary::from(&before),
        after: StatsSummary::from(&after),
    })
}

/// Counters accumulated while walking the candidate list.
struct RunState {
    dry_run: bool,
    deleted_batches: usize,
    deleted_bytes: u64,
    errors: Vec<BatchFailure>,
    purged: Vec<String>,
}

impl RunState {
    const fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            deleted_batches: 0,
            deleted_bytes: 0,
            errors: Vec::new(),
            purged: Vec::new(),
        }
    }

    fn process(&mut self, recycle_root: &Path, batch: &Batch) {
        let validated = match validate_batch(recycle_root, batch) {
            Ok(v) => v,
            Err(reason) => {
                self.errors.push(BatchFailure {
                    batch_id: batch.batch_id.clone(),
                    message: reason.as_str().to_string(),
                    error_type: ErrorType::PathValidationFailed,
                });
                return;
            }
        };

        if self.dry_run {
            self.record_deleted(batch);
            return;
        }

        match remove_batch_root(&validated.batch_root) {
            Ok(()) => {
                self.record_deleted(batch);
                self.purged.push(batch.batch_id.clone());
            }
            Err(e) => {
                let error_type = classify_io_error(&e);
                if error_type == ErrorType::NotFound {
                    self.purged.push(batch.batch_id.clone());
                }
                self.errors.push(BatchFailure {
                    batch_id: batch.batch_id.clone(),
                    message: format!("{}: {e}", validated.batch_root.display()),
                    error_type,
                });
            }
        }
    }

    fn record_deleted(&mut self, batch: &Batch) {
        self.deleted_batches += 1;
        self.deleted_bytes = self.deleted_bytes.saturating_add(batch.total_bytes);
    }
}

/// Recursively remove a validated batch root and verify it is gone.
fn remove_batch_root(batch_root: &Path) -> io::Result<()> {
    fs::remove_dir_all(batch_root)?;
    if fs::symlink_metadata(batch_root).is_ok() {
        return Err(io::Error::other(format!(
            "path still exists after deletion: {}",
            batch_root.display()
        )));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn audit_record(
    now: i64,
    status: MaintenanceStatus,
    options: &MaintainOptions<'_>,
    policy: &RetentionPolicy,
    selection: &Selection,
    before: &RecycleStats,
    after: &RecycleStats,
    run: &RunState,
) -> MaintainRecord {
    MaintainRecord {
        time: now,
        status,
        dry_run: options.dry_run,
        recycle_root: options.recycle_root.to_path_buf(),
        policy: *policy,
        threshold_bytes: selection.threshold_bytes,
        over_threshold: before.total_bytes > selection.threshold_bytes,
        before_batches: before.total_batches,
        before_bytes: before.total_bytes,
        deleted_batches: run.deleted_batches,
        deleted_bytes: run.deleted_bytes,
        failed_batches: run.errors.len(),
        selected_by_age: selection.count_by(SelectedBy::Age),
        selected_by_size: selection.count_by(SelectedBy::Size),
        remaining_batches: after.total_batches,
        remaining_bytes: after.total_bytes,
        error_type: summarize_error_types(run.errors.iter().map(|e| e.error_type)),
        config_hash: options.config_hash.clone(),
        purged_batch_ids: if options.dry_run {
            Vec::new()
        } else {
            run.purged.clone()
        },
        errors: run.errors.clone(),
    }
}

// ──────────────────── tests ────────────────────
