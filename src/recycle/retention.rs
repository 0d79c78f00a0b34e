//! Retention policy and the pure eviction selector.
//!
//! Selection never touches the filesystem. Given the current batches, the
//! policy, the wall clock, and the bytes currently held, it decides which
//! batches a maintenance run should evict:
//!
//! 1. Newest `min_keep_batches` batches are protected unconditionally.
//! 2. Remaining batches at least `max_age_days` whole days old are selected
//!    by age.
//! 3. While the estimated remainder stays above the size threshold, the
//!    oldest remaining batches are selected by size.
//!
//! A batch is selected for at most one reason; age wins over size.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::index::batches::{Batch, sort_newest_first};

/// Milliseconds in one day.
pub const DAY_MS: i64 = 86_400_000;
/// Bytes in one GiB.
pub const GIB: u64 = 1 << 30;

const MAX_AGE_DAYS_RANGE: (i64, i64) = (1, 36_500);
const MIN_KEEP_BATCHES_RANGE: (i64, i64) = (0, 100_000);
const SIZE_THRESHOLD_GB_RANGE: (i64, i64) = (1, 1_048_576);

/// Fully-specified, validated retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub enabled: bool,
    pub max_age_days: u32,
    pub min_keep_batches: u32,
    #[serde(rename = "sizeThresholdGB")]
    pub size_threshold_gb: u32,
    /// Epoch ms of the last completed maintenance run, 0 if never.
    pub last_run_at: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_days: 30,
            min_keep_batches: 3,
            size_threshold_gb: 20,
            last_run_at: 0,
        }
    }
}

/// Possibly partial, possibly malformed policy input (config file, JSON state).
///
/// Every field accepts any value; [`RetentionPolicy::normalize`] decides what
/// is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RetentionPolicyInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Value>,
    #[serde(alias = "maxAgeDays", skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<Value>,
    #[serde(alias = "minKeepBatches", skip_serializing_if = "Option::is_none")]
    pub min_keep_batches: Option<Value>,
    #[serde(alias = "sizeThresholdGB", skip_serializing_if = "Option::is_none")]
    pub size_threshold_gb: Option<Value>,
    #[serde(alias = "lastRunAt", skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<Value>,
}

impl RetentionPolicy {
    /// Merge `input` over `fallback`, field by field.
    ///
    /// Missing, mistyped, or out-of-range fields take the fallback value.
    /// Never fails.
    pub fn normalize(input: &RetentionPolicyInput, fallback: &Self) -> Self {
        Self {
            enabled: input
                .enabled
                .as_ref()
                .and_then(coerce_bool)
                .unwrap_or(fallback.enabled),
            max_age_days: ranged_u32(
                input.max_age_days.as_ref(),
                MAX_AGE_DAYS_RANGE,
                fallback.max_age_days,
            ),
            min_keep_batches: ranged_u32(
                input.min_keep_batches.as_ref(),
                MIN_KEEP_BATCHES_RANGE,
                fallback.min_keep_batches,
            ),
            size_threshold_gb: ranged_u32(
                input.size_threshold_gb.as_ref(),
                SIZE_THRESHOLD_GB_RANGE,
                fallback.size_threshold_gb,
            ),
            last_run_at: input
                .last_run_at
                .as_ref()
                .and_then(coerce_i64)
                .filter(|v| *v >= 0)
                .unwrap_or(fallback.last_run_at),
        }
    }

    /// Size threshold in bytes, never below 1 GiB.
    pub fn threshold_bytes(&self) -> u64 {
        u64::from(self.size_threshold_gb.max(1)).saturating_mul(GIB)
    }

    /// Whether an automatic run is due at `now` given a minimum interval.
    pub fn is_due(&self, now: i64, interval_ms: i64) -> bool {
        self.enabled
            && (self.last_run_at <= 0 || now.saturating_sub(self.last_run_at) >= interval_ms)
    }
}

impl From<&RetentionPolicy> for RetentionPolicyInput {
    fn from(policy: &RetentionPolicy) -> Self {
        Self {
            enabled: Some(Value::from(policy.enabled)),
            max_age_days: Some(Value::from(policy.max_age_days)),
            min_keep_batches: Some(Value::from(policy.min_keep_batches)),
            size_threshold_gb: Some(Value::from(policy.size_threshold_gb)),
            last_run_at: Some(Value::from(policy.last_run_at)),
        }
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn ranged_u32(value: Option<&Value>, (min, max): (i64, i64), fallback: u32) -> u32 {
    value
        .and_then(coerce_i64)
        .filter(|v| (min..=max).contains(v))
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(fallback)
}

// ──────────────────── selection ────────────────────

/// Why a batch was chosen for eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectedBy {
    Age,
    Size,
}

/// A batch chosen for eviction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(flatten)]
    pub batch: Batch,
    pub selected_by: SelectedBy,
}

/// Selector output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub keep_recent: Vec<Batch>,
    /// Newest first.
    pub candidates: Vec<Candidate>,
    pub total_bytes: u64,
    pub threshold_bytes: u64,
    pub estimated_after_bytes: u64,
}

impl Selection {
    pub fn count_by(&self, reason: SelectedBy) -> usize {
        self.candidates
            .iter()
            .filter(|c| c.selected_by == reason)
            .count()
    }

    pub fn candidate_bytes(&self) -> u64 {
        self.candidates.iter().map(|c| c.batch.total_bytes).sum()
    }
}

/// Whole days elapsed between `first_time` and `now` (floored; negative when
/// `first_time` is in the future).
pub const fn age_days(now: i64, first_time: i64) -> i64 {
    now.saturating_sub(first_time).div_euclid(DAY_MS)
}

/// Decide which batches to evict.
///
/// `total_bytes` is what the recycle root currently holds; the size phase
/// runs while the estimate after age eviction exceeds the policy threshold.
pub fn select_candidates(
    batches: &[Batch],
    policy: &RetentionPolicy,
    now: i64,
    total_bytes: u64,
) -> Selection {
    let threshold_bytes = policy.threshold_bytes();

    let mut ordered = batches.to_vec();
    sort_newest_first(&mut ordered);

    let keep_count = (policy.min_keep_batches as usize).min(ordered.len());
    let rest = ordered.split_off(keep_count);
    let keep_recent = ordered;

    let max_age = i64::from(policy.max_age_days);
    let (aged, mut remaining): (Vec<Batch>, Vec<Batch>) = rest
        .into_iter()
        .partition(|b| age_days(now, b.first_time) >= max_age);

    let age_bytes: u64 = aged.iter().map(|b| b.total_bytes).sum();
    let mut estimate = total_bytes.saturating_sub(age_bytes);

    let mut candidates: Vec<Candidate> = aged
        .into_iter()
        .map(|batch| Candidate {
            batch,
            selected_by: SelectedBy::Age,
        })
        .collect();

    if estimate > threshold_bytes {
        remaining.reverse(); // oldest first
        for batch in remaining {
            if estimate <= threshold_bytes {
                break;
            }
            estimate = estimate.saturating_sub(batch.total_bytes);
            candidates.push(Candidate {
                batch,
                selected_by: SelectedBy::Size,
            });
        }
    }

    candidates.sort_by(|a, b| {
        b.batch
            .first_time
            .cmp(&a.batch.first_time)
            .then_with(|| a.batch.batch_id.cmp(&b.batch.batch_id))
    });

    Selection {
        keep_recent,
        candidates,
        total_bytes,
        threshold_bytes,
        estimated_after_bytes: estimate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_800_000_000_000;

    fn batch(id: &str, age_days: i64, bytes: u64) -> Batch {
        Batch {
            batch_id: id.to_string(),
            entries: Vec::new(),
            first_time: NOW - age_days * DAY_MS,
            total_bytes: bytes,
        }
    }

    fn policy(max_age_days: u32, min_keep: u32, gb: u32) -> RetentionPolicy {
        RetentionPolicy {
            enabled: true,
            max_age_days,
            min_keep_batches: min_keep,
            size_threshold_gb: gb,
            last_run_at: 0,
        }
    }

    fn ids(c: &[Candidate]) -> Vec<&str> {
        c.iter().map(|c| c.batch.batch_id.as_str()).collect()
    }

    #[test]
    fn normalize_takes_valid_fields_and_falls_back_on_the_rest() {
        let input: RetentionPolicyInput = serde_json::from_value(json!({
            "enabled": "false",
            "maxAgeDays": "14",
            "min_keep_batches": -2,
            "sizeThresholdGB": 0,
            "lastRunAt": 12.0,
        }))
        .unwrap();
        let fallback = RetentionPolicy::default();
        let p = RetentionPolicy::normalize(&input, &fallback);
        assert!(!p.enabled);
        assert_eq!(p.max_age_days, 14);
        assert_eq!(p.min_keep_batches, fallback.min_keep_batches);
        assert_eq!(p.size_threshold_gb, fallback.size_threshold_gb);
        assert_eq!(p.last_run_at, 12);
    }

    #[test]
    fn normalize_survives_garbage_types() {
        let input: RetentionPolicyInput = serde_json::from_value(json!({
            "enabled": [1, 2],
            "max_age_days": {"x": 1},
            "size_threshold_gb": 1.5,
            "last_run_at": "yesterday",
        }))
        .unwrap();
        let fallback = policy(7, 2, 5);
        assert_eq!(RetentionPolicy::normalize(&input, &fallback), fallback);
    }

    #[test]
    fn normalize_of_empty_input_is_fallback() {
        let fallback = policy(9, 1, 3);
        assert_eq!(
            RetentionPolicy::normalize(&RetentionPolicyInput::default(), &fallback),
            fallback
        );
    }

    #[test]
    fn policy_round_trips_through_input() {
        let p = policy(45, 0, 100);
        let input = RetentionPolicyInput::from(&p);
        assert_eq!(RetentionPolicy::normalize(&input, &RetentionPolicy::default()), p);
    }

    #[test]
    fn is_due_respects_interval_and_enabled() {
        let mut p = policy(30, 1, 20);
        assert!(p.is_due(NOW, DAY_MS));
        p.last_run_at = NOW - DAY_MS / 2;
        assert!(!p.is_due(NOW, DAY_MS));
        p.last_run_at = NOW - DAY_MS;
        assert!(p.is_due(NOW, DAY_MS));
        p.enabled = false;
        assert!(!p.is_due(NOW, DAY_MS));
    }

    #[test]
    fn age_days_floors() {
        assert_eq!(age_days(NOW, NOW), 0);
        assert_eq!(age_days(NOW, NOW - DAY_MS + 1), 0);
        assert_eq!(age_days(NOW, NOW - DAY_MS), 1);
        assert_eq!(age_days(NOW, NOW + 1), -1);
    }

    #[test]
    fn old_batch_selected_by_age_newest_kept() {
        let batches = vec![batch("New", 1, 2048), batch("Old", 60, 4096)];
        let sel = select_candidates(&batches, &policy(30, 1, 20), NOW, 6144);
        assert_eq!(sel.keep_recent.len(), 1);
        assert_eq!(sel.keep_recent[0].batch_id, "New");
        assert_eq!(ids(&sel.candidates), vec!["Old"]);
        assert_eq!(sel.candidates[0].selected_by, SelectedBy::Age);
        assert_eq!(sel.estimated_after_bytes, 2048);
    }

    #[test]
    fn keep_count_covering_everything_selects_nothing() {
        let batches = vec![batch("a", 100, 1), batch("b", 200, 1)];
        let sel = select_candidates(&batches, &policy(1, 5, 1), NOW, u64::MAX);
        assert!(sel.candidates.is_empty());
        assert_eq!(sel.keep_recent.len(), 2);
    }

    #[test]
    fn size_phase_adds_oldest_after_age_phase() {
        let gb = GIB;
        let batches = vec![
            batch("newer", 0, 9 * gb),
            batch("older", 5, 9 * gb),
            batch("aged", 40, gb),
        ];
        let sel = select_candidates(&batches, &policy(30, 1, 10), NOW, 19 * gb);
        assert_eq!(sel.keep_recent[0].batch_id, "newer");
        assert_eq!(ids(&sel.candidates), vec!["older", "aged"]);
        assert_eq!(sel.candidates[0].selected_by, SelectedBy::Size);
        assert_eq!(sel.candidates[1].selected_by, SelectedBy::Age);
        assert_eq!(sel.estimated_after_bytes, 9 * gb);
        assert_eq!(sel.count_by(SelectedBy::Size), 1);
        assert_eq!(sel.count_by(SelectedBy::Age), 1);
    }

    #[test]
    fn size_phase_keeps_scanning_while_over_threshold() {
        let gb = GIB;
        let batches = vec![
            batch("kept", 0, 9 * gb),
            batch("young", 2, 9 * gb),
            batch("mid", 5, 9 * gb),
        ];
        let sel = select_candidates(&batches, &policy(30, 1, 10), NOW, 27 * gb);
        assert_eq!(ids(&sel.candidates), vec!["young", "mid"]);
        assert!(sel.candidates.iter().all(|c| c.selected_by == SelectedBy::Size));
        assert_eq!(sel.estimated_after_bytes, 9 * gb);
    }

    #[test]
    fn size_phase_stops_at_threshold() {
        let gb = GIB;
        let batches = vec![
            batch("n", 0, gb),
            batch("c", 1, gb),
            batch("b", 2, gb),
            batch("a", 3, gb),
        ];
        let sel = select_candidates(&batches, &policy(30, 1, 2), NOW, 4 * gb);
        assert_eq!(ids(&sel.candidates), vec!["b", "a"]);
        assert_eq!(sel.estimated_after_bytes, 2 * gb);
    }

    #[test]
    fn estimate_floors_at_zero() {
        let batches = vec![batch("a", 90, 500)];
        let sel = select_candidates(&batches, &policy(30, 0, 1), NOW, 100);
        assert_eq!(sel.estimated_after_bytes, 0);
    }

    #[test]
    fn zero_threshold_input_is_clamped_to_one_gib() {
        let mut p = policy(30, 0, 1);
        p.size_threshold_gb = 0;
        assert_eq!(p.threshold_bytes(), GIB);
    }

    #[test]
    fn selection_serializes_candidates_flat() {
        let sel = select_candidates(&[batch("a", 90, 5)], &policy(30, 0, 1), NOW, 5);
        let v = serde_json::to_value(&sel).unwrap();
        assert_eq!(v["candidates"][0]["batchId"], "a");
        assert_eq!(v["candidates"][0]["selectedBy"], "age");
        assert_eq!(v["thresholdBytes"], GIB);
    }
}
