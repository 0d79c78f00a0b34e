//! Record shapes stored in the append-only index, one JSON object per line.
//!
//! Records are tagged by `action`. Unknown fields are ignored on read so older
//! binaries can still aggregate logs written by newer ones; a line whose
//! `action` is unknown or whose required fields are missing fails to parse and
//! is skipped by the reader.

#![allow(missing_docs)]

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::recycle::classify::ErrorType;
use crate::recycle::maintain::{BatchFailure, MaintenanceStatus};
use crate::recycle::restore::ConflictPolicy;
use crate::recycle::retention::RetentionPolicy;

/// Status written for a move that completed.
pub const STATUS_SUCCESS: &str = "success";
/// Status written for a move that failed.
pub const STATUS_FAILED: &str = "failed";
/// Status written for a restore entry left in quarantine by the conflict policy.
pub const STATUS_SKIPPED: &str = "skipped";

/// One immutable line of the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LogEntry {
    /// A file or directory moved into quarantine.
    Cleanup(CleanupRecord),
    /// Summary of one maintenance run.
    RecycleMaintain(MaintainRecord),
    /// A quarantined entry moved back (or not) to its source location.
    Restore(RestoreRecord),
}

impl LogEntry {
    /// Epoch-millisecond timestamp of the record.
    pub const fn time(&self) -> i64 {
        match self {
            Self::Cleanup(r) => r.time,
            Self::RecycleMaintain(r) => r.time,
            Self::Restore(r) => r.time,
        }
    }

    /// Wire name of the record's action.
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Cleanup(_) => "cleanup",
            Self::RecycleMaintain(_) => "recycle_maintain",
            Self::Restore(_) => "restore",
        }
    }
}

/// `cleanup` line: one quarantined path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRecord {
    pub status: String,
    pub batch_id: String,
    #[serde(default)]
    pub scope: String,
    pub source_path: PathBuf,
    pub recycle_path: PathBuf,
    #[serde(default)]
    pub size_bytes: u64,
    pub time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
}

impl CleanupRecord {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// `recycle_maintain` line: the audit summary of one maintenance run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintainRecord {
    pub time: i64,
    pub status: MaintenanceStatus,
    #[serde(rename = "dryRun")]
    pub dry_run: bool,
    pub recycle_root: PathBuf,
    pub policy: RetentionPolicy,
    pub threshold_bytes: u64,
    pub over_threshold: bool,
    pub before_batches: usize,
    pub before_bytes: u64,
    pub deleted_batches: usize,
    pub deleted_bytes: u64,
    pub failed_batches: usize,
    pub selected_by_age: usize,
    pub selected_by_size: usize,
    pub remaining_batches: usize,
    pub remaining_bytes: u64,
    pub error_type: Option<String>,
    /// `Config::stable_hash` of the config that drove the run.
    #[serde(default)]
    pub config_hash: Option<String>,
    /// Batches this run removed or found already gone; excluded from later
    /// aggregation. Always empty for dry runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub purged_batch_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BatchFailure>,
}

/// `restore` line: outcome for one entry of a restored batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRecord {
    pub status: String,
    pub batch_id: String,
    pub source_path: PathBuf,
    pub recycle_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_path: Option<PathBuf>,
    pub conflict: ConflictPolicy,
    pub time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
}

/// Current UTC time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_line_uses_camel_case_fields() {
        let entry = LogEntry::Cleanup(CleanupRecord {
            status: STATUS_SUCCESS.to_string(),
            batch_id: "b1".to_string(),
            scope: "downloads".to_string(),
            source_path: PathBuf::from("/home/u/a.txt"),
            recycle_path: PathBuf::from("/r/b1/a.txt"),
            size_bytes: 12,
            time: 1_700_000_000_000,
            error: None,
            error_type: None,
        });
        let json: serde_json::Value = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["action"], "cleanup");
        assert_eq!(json["batchId"], "b1");
        assert_eq!(json["recyclePath"], "/r/b1/a.txt");
        assert_eq!(json["sizeBytes"], 12);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let line = r#"{"action":"cleanup","status":"success","batchId":"b","sourcePath":"/s","recyclePath":"/r/b/s","sizeBytes":3,"time":5,"accountId":"x"}"#;
        let entry: LogEntry = serde_json::from_str(line).unwrap();
        assert_eq!(entry.action(), "cleanup");
        assert_eq!(entry.time(), 5);
    }

    #[test]
    fn unknown_action_does_not_parse() {
        let line = r#"{"action":"compact","time":1}"#;
        assert!(serde_json::from_str::<LogEntry>(line).is_err());
    }

    #[test]
    fn cleanup_missing_required_field_does_not_parse() {
        let line = r#"{"action":"cleanup","status":"success","sourcePath":"/s","recyclePath":"/r","time":1}"#;
        assert!(serde_json::from_str::<LogEntry>(line).is_err());
    }
}
