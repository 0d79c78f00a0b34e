//! Recycle-bin operations: quarantine, stats, retention, maintenance, restore.

pub mod classify;
pub mod maintain;
pub mod quarantine;
pub mod restore;
pub mod retention;
pub mod safety;
pub mod schedule;
pub mod stats;
pub mod transfer;
