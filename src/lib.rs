#![forbid(unsafe_code)]

//! Recycle Keeper (rk): a quarantine bin with retention.
//!
//! Files are moved into per-batch directories under a recycle root and every
//! move is recorded in an append-only JSON Lines index. Maintenance evicts
//! whole batches by age and total size, gated by a path safety check so a
//! corrupted or hostile index can never direct a delete outside the root.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use recycle_keeper::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use recycle_keeper::core::config::Config;
//! use recycle_keeper::recycle::maintain::{MaintainOptions, maintain_recycle_bin};
//! ```

pub mod prelude;

pub mod core;
pub mod index;
pub mod recycle;
