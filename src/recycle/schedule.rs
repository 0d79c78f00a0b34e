//! Persistent `last_run_at` for automatic maintenance runs.

#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, RkError};
use crate::recycle::maintain::MaintenanceOutcome;
use crate::recycle::retention::RetentionPolicy;

/// Contents of the state file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScheduleState {
    /// Epoch ms of the last completed non-dry-run maintenance.
    pub last_run_at: i64,
    pub last_status: Option<String>,
    pub last_deleted_batches: usize,
}

impl ScheduleState {
    /// Record a finished run. Dry runs leave the state untouched.
    pub fn record(&mut self, outcome: &MaintenanceOutcome) {
        if outcome.dry_run {
            return;
        }
        self.last_run_at = outcome.ran_at;
        self.last_status = Some(outcome.status.as_str().to_string());
        self.last_deleted_batches = outcome.deleted_batches;
    }

    /// `policy` with `last_run_at` advanced to this state's value when newer.
    pub fn apply_to(&self, policy: &RetentionPolicy) -> RetentionPolicy {
        RetentionPolicy {
            last_run_at: policy.last_run_at.max(self.last_run_at),
            ..*policy
        }
    }
}

/// Read the state file. Missing or corrupt files read as a fresh state.
pub fn read_state(path: &Path) -> ScheduleState {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return ScheduleState::default(),
        Err(e) => {
            eprintln!("[RK-STATE] WARNING: cannot read {}: {e}", path.display());
            return ScheduleState::default();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        eprintln!("[RK-STATE] WARNING: ignoring invalid {}: {e}", path.display());
        ScheduleState::default()
    })
}

/// Write the state file atomically: write to `.tmp`, sync, then rename.
pub fn write_state(path: &Path, state: &ScheduleState) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RkError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(state)?;

    let result = (|| {
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(RkError::io(path, e));
    }
    Ok(())
}
