//! Append-only batch index: record shapes, the JSONL log, and batch aggregation.

pub mod batches;
pub mod entry;
pub mod log;
