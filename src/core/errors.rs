//! RK-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, RkError>;

/// Top-level error type for run-level failures.
///
/// Per-batch failures during maintenance or restore are not errors at this
/// level; they are accumulated in the operation outcome.
#[derive(Debug, Error)]
pub enum RkError {
    #[error("[RK-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[RK-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[RK-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[RK-2001] index failure at {path}: {details}")]
    Index { path: PathBuf, details: String },

    #[error("[RK-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[RK-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[RK-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[RK-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl RkError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "RK-1001",
            Self::MissingConfig { .. } => "RK-1002",
            Self::ConfigParse { .. } => "RK-1003",
            Self::Index { .. } => "RK-2001",
            Self::Serialization { .. } => "RK-2101",
            Self::PermissionDenied { .. } => "RK-3001",
            Self::Io { .. } => "RK-3002",
            Self::Runtime { .. } => "RK-3900",
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            return Self::PermissionDenied { path };
        }
        Self::Io { path, source }
    }
}

impl From<serde_json::Error> for RkError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for RkError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
