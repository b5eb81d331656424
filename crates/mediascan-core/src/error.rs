//! Error and warning types for scanning operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors raised synchronously before a scan job starts.
///
/// Everything that goes wrong once the job is running is reported as a
/// [`ScanWarning`] instead.
#[derive(Debug, Error)]
pub enum ScanError {
    /// None of the requested roots exists.
    #[error("No valid root paths to scan ({attempted} requested)")]
    NoValidRoots { attempted: usize },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A scan was requested outside of a Tokio runtime.
    #[error("Scanning requires a running Tokio runtime")]
    NoRuntime,
}

impl ScanError {
    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Errors raised while constructing a record from a loosely-typed source.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The source was neither an object nor a JSON string holding one.
    #[error("Expected an object, found {found}")]
    NotAnObject { found: &'static str },

    /// The source was a string that is not valid JSON.
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field is absent or null.
    #[error("Missing required field `{field}`")]
    MissingField { field: &'static str },

    /// A field has a type or value that cannot be coerced.
    #[error("Invalid field `{field}`: {message}")]
    InvalidField { field: &'static str, message: String },
}

impl RecordError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    /// Access control prevented reading a file or directory.
    PermissionDenied,
    /// A file could not be opened or stat'd.
    Unreadable,
    /// A recognized container has incomplete or corrupt metadata.
    Truncated,
    /// Volume capacity could not be queried.
    VolumeUnavailable,
    /// A symbolic link leads back to one of its own ancestors.
    SymlinkCycle,
}

impl std::fmt::Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::Unreadable => write!(f, "unreadable"),
            Self::Truncated => write!(f, "truncated"),
            Self::VolumeUnavailable => write!(f, "volume unavailable"),
            Self::SymlinkCycle => write!(f, "symlink cycle"),
        }
    }
}

/// Non-fatal warning encountered during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a permission denied warning.
    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Permission denied: {}", path.display()),
            path,
            kind: WarningKind::PermissionDenied,
        }
    }

    /// Create an unreadable warning.
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self {
            path: path.into(),
            message: format!("Unreadable: {reason}"),
            kind: WarningKind::Unreadable,
        }
    }

    /// Classify an I/O error into a warning.
    pub fn from_io(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::unreadable(path, error),
        }
    }

    /// Create a truncated container warning.
    pub fn truncated(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self {
            path: path.into(),
            message: format!("Truncated metadata: {reason}"),
            kind: WarningKind::Truncated,
        }
    }

    /// Create a volume unavailable warning.
    pub fn volume_unavailable(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self {
            path: path.into(),
            message: format!("Volume unavailable: {reason}"),
            kind: WarningKind::VolumeUnavailable,
        }
    }

    /// Create a symlink cycle warning.
    pub fn symlink_cycle(path: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let target = target.into();
        Self {
            message: format!(
                "Symlink cycle: {} -> {}",
                path.display(),
                target.display()
            ),
            path,
            kind: WarningKind::SymlinkCycle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_from_io() {
        let warning = ScanWarning::from_io(
            "/test/path",
            &std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(warning.kind, WarningKind::PermissionDenied);

        let warning = ScanWarning::from_io(
            "/test/path",
            &std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(warning.kind, WarningKind::Unreadable);
        assert!(warning.message.contains("gone"));
    }

    #[test]
    fn test_symlink_cycle_message() {
        let warning = ScanWarning::symlink_cycle("/a/loop", "/a");
        assert_eq!(warning.kind, WarningKind::SymlinkCycle);
        assert!(warning.message.contains("/a/loop -> /a"));
    }
}
