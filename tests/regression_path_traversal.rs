#![allow(missing_docs)]

//! Index entries are untrusted: crafted `recyclePath` values must never turn
//! into a delete or a move outside the recycle root.

mod common;

use std::fs;
use std::path::Path;

use common::{DAY_MS, Fixture, NOW};
use recycle_keeper::core::paths::resolve_absolute_path;
use recycle_keeper::recycle::classify::ErrorType;
use recycle_keeper::recycle::maintain::{MaintainOptions, MaintenanceStatus, maintain_recycle_bin};
use recycle_keeper::recycle::restore::{
    ConflictPolicy, RestoreOptions, RestoreStatus, restore_batch,
};
use recycle_keeper::recycle::retention::RetentionPolicy;

fn evict_everything() -> RetentionPolicy {
    RetentionPolicy {
        enabled: true,
        max_age_days: 1,
        min_keep_batches: 0,
        size_threshold_gb: 20,
        last_run_at: 0,
    }
}

#[test]
fn resolve_absolute_path_normalizes_dotdot_syntactically() {
    // The helper alone does not bound anything; the validator has to.
    let resolved = resolve_absolute_path(Path::new("/nonexistent_root/../etc/passwd"));
    assert_eq!(resolved, Path::new("/etc/passwd"));
}

#[test]
fn dotdot_escape_is_rejected_and_victim_survives() {
    let fx = Fixture::new();
    fs::create_dir_all(&fx.root).expect("create root");
    let victim_dir = fx.dir.path().join("victim");
    fs::create_dir_all(&victim_dir).expect("create victim");
    fs::write(victim_dir.join("precious"), "keep me").expect("write victim");

    let crafted = fx.root.join("evil").join("..").join("..").join("victim").join("precious");
    fx.log_entry("evil", &crafted, 7, NOW - 10 * DAY_MS);

    let outcome = maintain_recycle_bin(
        &MaintainOptions::new(&fx.index, &fx.root, &evict_everything()).at(NOW),
        None,
    )
    .expect("maintenance runs");

    assert_eq!(outcome.status, MaintenanceStatus::PartialFailed);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].error_type, ErrorType::PathValidationFailed);
    assert_eq!(outcome.errors[0].message, "recycle_path_outside_recycle_root");
    assert_eq!(
        fs::read_to_string(victim_dir.join("precious")).expect("victim intact"),
        "keep me"
    );
}

#[test]
fn sibling_with_shared_prefix_is_outside_the_root() {
    let fx = Fixture::new();
    fs::create_dir_all(&fx.root).expect("create root");
    // "<root>-other" shares a string prefix with "<root>" but is not inside it.
    let sibling = fx.dir.path().join("recycle-other").join("batch");
    fs::create_dir_all(&sibling).expect("create sibling");
    fs::write(sibling.join("f"), "x").expect("write sibling file");
    fx.log_entry("prefix", &sibling.join("f"), 1, NOW - 10 * DAY_MS);

    let outcome = maintain_recycle_bin(
        &MaintainOptions::new(&fx.index, &fx.root, &evict_everything()).at(NOW),
        None,
    )
    .expect("maintenance runs");

    assert_eq!(outcome.fail_batches, 1);
    assert!(sibling.join("f").exists());
}

#[test]
fn entry_directly_under_root_would_delete_the_root() {
    let fx = Fixture::new();
    fs::create_dir_all(&fx.root).expect("create root");
    fs::write(fx.root.join("loose"), "x").expect("write loose file");
    fx.add_batch("innocent", &[("a", 1)], NOW - 10 * DAY_MS);
    fx.log_entry("flat", &fx.root.join("loose"), 1, NOW - 10 * DAY_MS);

    let outcome = maintain_recycle_bin(
        &MaintainOptions::new(&fx.index, &fx.root, &evict_everything()).at(NOW),
        None,
    )
    .expect("maintenance runs");

    let failure = outcome
        .errors
        .iter()
        .find(|e| e.batch_id == "flat")
        .expect("flat batch rejected");
    assert_eq!(failure.message, "batch_root_is_recycle_root");
    assert!(fx.root.is_dir());
    assert!(fx.root.join("loose").exists());
    assert!(!fx.root.join("innocent").exists());
}

#[test]
#[cfg(unix)]
fn symlinked_batch_dir_pointing_outside_is_rejected() {
    let fx = Fixture::new();
    fs::create_dir_all(&fx.root).expect("create root");
    let outside = fx.dir.path().join("outside");
    fs::create_dir_all(&outside).expect("create outside");
    fs::write(outside.join("f"), "x").expect("write outside file");
    std::os::unix::fs::symlink(&outside, fx.root.join("linked")).expect("symlink");
    fx.log_entry("linked", &fx.root.join("linked").join("f"), 1, NOW - 10 * DAY_MS);

    let outcome = maintain_recycle_bin(
        &MaintainOptions::new(&fx.index, &fx.root, &evict_everything()).at(NOW),
        None,
    )
    .expect("maintenance runs");

    assert_eq!(outcome.fail_batches, 1);
    assert_eq!(outcome.errors[0].error_type, ErrorType::PathValidationFailed);
    assert!(outside.join("f").exists());
}

#[test]
fn restore_refuses_crafted_batch_before_moving_anything() {
    let fx = Fixture::new();
    let batch_root = fx.add_batch("mixed", &[("good", 4)], NOW - DAY_MS);
    let crafted = fx.root.join("mixed").join("..").join("..").join("etc-copy");
    fx.log_entry("mixed", &crafted, 1, NOW - DAY_MS);

    let outcome = restore_batch(&RestoreOptions {
        index_path: &fx.index,
        recycle_root: &fx.root,
        batch_id: "mixed",
        conflict: ConflictPolicy::Overwrite,
        dry_run: false,
        fsync_on_append: false,
    })
    .expect("restore runs");

    assert_eq!(outcome.status, RestoreStatus::Rejected);
    assert_eq!(
        outcome.rejection.as_deref(),
        Some("recycle_path_outside_recycle_root")
    );
    assert!(batch_root.join("good").exists());
    assert!(!fx.home.join("mixed").exists());
}
