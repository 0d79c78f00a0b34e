//! Coarse classification of filesystem failure messages.
//!
//! OS error text differs between platforms and libc versions, so the mapping
//! is a pure function from message text to [`ErrorType`], tested against
//! fixed inputs.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Failure category recorded per batch or entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// The path safety gate rejected the batch; the filesystem was not touched.
    PathValidationFailed,
    PermissionDenied,
    NotFound,
    Busy,
    ReadOnly,
    Unknown,
}

impl ErrorType {
    /// Wire name, as written to the index.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PathValidationFailed => "PATH_VALIDATION_FAILED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::Busy => "BUSY",
            Self::ReadOnly => "READ_ONLY",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary label when a run recorded errors of more than one type.
pub const MIXED_ERROR_TYPE: &str = "MIXED";

const PATTERNS: &[(ErrorType, &str)] = &[
    (
        ErrorType::PermissionDenied,
        r"(?i)permission denied|operation not permitted|access is denied|\beacces\b|\beperm\b",
    ),
    (
        ErrorType::NotFound,
        r"(?i)no such file or directory|cannot find the (file|path) specified|not found|\benoent\b",
    ),
    (
        ErrorType::Busy,
        r"(?i)resource busy|device or resource busy|being used by another process|\bebusy\b|directory not empty|\benotempty\b",
    ),
    (
        ErrorType::ReadOnly,
        r"(?i)read-only file system|\berofs\b",
    ),
];

fn compiled() -> &'static [(ErrorType, Regex)] {
    static COMPILED: OnceLock<Vec<(ErrorType, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        PATTERNS
            .iter()
            .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (*kind, re)))
            .collect()
    })
}

/// Map an OS error message onto a coarse category. First match wins.
pub fn classify_error_message(message: &str) -> ErrorType {
    compiled()
        .iter()
        .find(|(_, re)| re.is_match(message))
        .map_or(ErrorType::Unknown, |(kind, _)| *kind)
}

/// Classify an `io::Error`, preferring its kind and falling back to its text.
pub fn classify_io_error(error: &std::io::Error) -> ErrorType {
    use std::io::ErrorKind;
    match error.kind() {
        ErrorKind::PermissionDenied => ErrorType::PermissionDenied,
        ErrorKind::NotFound => ErrorType::NotFound,
        ErrorKind::ResourceBusy | ErrorKind::DirectoryNotEmpty => ErrorType::Busy,
        ErrorKind::ReadOnlyFilesystem => ErrorType::ReadOnly,
        _ => classify_error_message(&error.to_string()),
    }
}

/// Collapse per-failure types into the single `error_type` summary field.
pub fn summarize_error_types<I>(types: I) -> Option<String>
where
    I: IntoIterator<Item = ErrorType>,
{
    let mut iter = types.into_iter();
    let first = iter.next()?;
    if iter.all(|t| t == first) {
        Some(first.as_str().to_string())
    } else {
        Some(MIXED_ERROR_TYPE.to_string())
    }
}
