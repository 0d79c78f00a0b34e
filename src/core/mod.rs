//! Core types: errors, configuration, path helpers, bounded worker pool.

pub mod config;
pub mod errors;
pub mod paths;
pub mod pool;
