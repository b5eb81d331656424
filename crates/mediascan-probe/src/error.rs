//! Error types for mediascan-probe

use std::path::{Path, PathBuf};

use mediascan_core::{FileInfo, ScanWarning, WarningKind};

/// Errors that can occur while probing a file.
///
/// Every variant except a failed `stat` carries a best-effort record so the
/// caller can still report the file.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Access control prevented opening or stat'ing the file.
    #[error("Permission denied: {path}")]
    PermissionDenied {
        path: PathBuf,
        partial: Option<Box<FileInfo>>,
    },

    /// The file could not be opened or stat'd.
    #[error("Unreadable {path}: {reason}")]
    Unreadable {
        path: PathBuf,
        reason: String,
        partial: Option<Box<FileInfo>>,
    },

    /// A recognized container has incomplete or corrupt metadata.
    #[error("Truncated metadata in {path}: {reason}")]
    Truncated {
        path: PathBuf,
        reason: String,
        partial: Box<FileInfo>,
    },
}

impl ProbeError {
    /// Classify an I/O error with path context.
    pub fn io(
        path: impl Into<PathBuf>,
        source: &std::io::Error,
        partial: Option<FileInfo>,
    ) -> Self {
        let path = path.into();
        let partial = partial.map(Box::new);
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path, partial },
            _ => Self::Unreadable {
                path,
                reason: source.to_string(),
                partial,
            },
        }
    }

    /// Path of the probed file.
    pub fn path(&self) -> &Path {
        match self {
            Self::PermissionDenied { path, .. }
            | Self::Unreadable { path, .. }
            | Self::Truncated { path, .. } => path,
        }
    }

    /// Best-effort record, if the file was at least stat'd.
    pub fn partial(&self) -> Option<&FileInfo> {
        match self {
            Self::PermissionDenied { partial, .. } | Self::Unreadable { partial, .. } => {
                partial.as_deref()
            }
            Self::Truncated { partial, .. } => Some(&**partial),
        }
    }

    /// Take the best-effort record out of the error.
    pub fn into_partial(self) -> Option<FileInfo> {
        match self {
            Self::PermissionDenied { partial, .. } | Self::Unreadable { partial, .. } => {
                partial.map(|p| *p)
            }
            Self::Truncated { partial, .. } => Some(*partial),
        }
    }

    /// Warning kind this error maps to.
    pub fn warning_kind(&self) -> WarningKind {
        match self {
            Self::PermissionDenied { .. } => WarningKind::PermissionDenied,
            Self::Unreadable { .. } => WarningKind::Unreadable,
            Self::Truncated { .. } => WarningKind::Truncated,
        }
    }

    /// Convert to a scan warning.
    pub fn to_warning(&self) -> ScanWarning {
        match self {
            Self::PermissionDenied { path, .. } => ScanWarning::permission_denied(path),
            Self::Unreadable { path, reason, .. } => ScanWarning::unreadable(path, reason),
            Self::Truncated { path, reason, .. } => ScanWarning::truncated(path, reason),
        }
    }
}

/// Failure inside a container parser.
#[derive(Debug)]
pub(crate) enum ContainerError {
    /// Metadata ended early or is structurally inconsistent.
    Truncated(String),
    /// Any other I/O failure.
    Io(std::io::Error),
}

impl ContainerError {
    pub(crate) fn truncated(reason: impl Into<String>) -> Self {
        Self::Truncated(reason.into())
    }
}

impl From<std::io::Error> for ContainerError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::truncated("unexpected end of file"),
            _ => Self::Io(error),
        }
    }
}

pub(crate) type ParseResult<T> = Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_classification() {
        let err = ProbeError::io(
            "/x.mp4",
            &std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            Some(FileInfo::new("/x.mp4", 3)),
        );
        assert_eq!(err.warning_kind(), WarningKind::PermissionDenied);
        assert_eq!(err.partial().map(|p| p.size), Some(3));

        let err = ProbeError::io(
            "/x.mp4",
            &std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            None,
        );
        assert_eq!(err.warning_kind(), WarningKind::Unreadable);
        assert!(err.into_partial().is_none());
    }

    #[test]
    fn test_eof_is_truncation() {
        let err: ContainerError =
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, ContainerError::Truncated(_)));
    }
}
