//! Media probing for mediascan.
//!
//! This crate classifies a file by its content signature and reads the
//! container's index structures to recover format, primary codec,
//! dimensions and duration. No frames are decoded and no external tools
//! are spawned.
//!
//! # Overview
//!
//! - **Signature detection** from the first 64 bytes, never the extension
//! - **Bounded parsers** for MP4/MOV, Matroska/WebM, AVI, WAV, FLAC, Ogg
//!   and MP3 that seek past payload and cap every element read
//! - **Best-effort results**: truncated containers still yield a partial
//!   record through [`ProbeError::partial`]
//!
//! # Example
//!
//! ```rust,no_run
//! use mediascan_probe::probe_file;
//!
//! match probe_file("/media/movies/a.mp4") {
//!     Ok(info) => println!("{} {}x{} {:.1}s", info.codec, info.width, info.height, info.duration),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```

mod container;
mod error;
mod media;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub use container::{Container, SIGNATURE_LEN, detect_container};
pub use error::ProbeError;
pub use media::{MediaDetails, Track, TrackKind};

use container::source::Source;
use error::ContainerError;
use mediascan_core::{FileInfo, normalize_extension};

/// Largest single metadata element a parser will read (16 MiB).
pub const MAX_ELEMENT_SIZE: u64 = 16 * 1024 * 1024;

/// Extensions treated as media by `--media-only` style filters.
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "mp3", "wav", "aac", "flac", "m4a",
    "ogg", "wma", "opus",
];

/// Check an extension against [`MEDIA_EXTENSIONS`], ignoring case and a
/// leading dot.
pub fn is_media_extension(ext: &str) -> bool {
    let ext = normalize_extension(ext);
    MEDIA_EXTENSIONS.contains(&ext.as_str())
}

/// Probe a file with default limits.
pub fn probe_file(path: impl AsRef<Path>) -> Result<FileInfo, ProbeError> {
    Prober::default().probe(path.as_ref())
}

/// Turns a file path into a [`FileInfo`].
///
/// [`Prober`] is the real implementation; scanners accept any
/// implementation so tests can substitute their own.
pub trait MediaProbe: Send + Sync {
    /// Probe a single file.
    fn probe(&self, path: &Path) -> Result<FileInfo, ProbeError>;
}

impl MediaProbe for Prober {
    fn probe(&self, path: &Path) -> Result<FileInfo, ProbeError> {
        Prober::probe(self, path)
    }
}

/// Media prober.
///
/// Stateless apart from its limits; one instance can be shared across
/// threads.
#[derive(Debug, Clone, Copy)]
pub struct Prober {
    max_element_size: u64,
}

impl Default for Prober {
    fn default() -> Self {
        Self {
            max_element_size: MAX_ELEMENT_SIZE,
        }
    }
}

impl Prober {
    /// Create a prober with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the largest metadata element a parser may read.
    pub fn with_max_element_size(mut self, bytes: u64) -> Self {
        self.max_element_size = bytes;
        self
    }

    /// Probe a single file.
    ///
    /// Non-media files succeed with a size-only record.
    pub fn probe(&self, path: &Path) -> Result<FileInfo, ProbeError> {
        let metadata = std::fs::metadata(path).map_err(|e| ProbeError::io(path, &e, None))?;
        if !metadata.is_file() {
            return Err(ProbeError::Unreadable {
                path: path.to_path_buf(),
                reason: "not a regular file".to_string(),
                partial: None,
            });
        }

        let base = FileInfo::new(path, metadata.len());
        let file = File::open(path).map_err(|e| ProbeError::io(path, &e, Some(base.clone())))?;
        let mut reader = BufReader::new(file);

        let container = detect_container(&mut reader)
            .map_err(|e| ProbeError::io(path, &e, Some(base.clone())))?;
        let Some(container) = container else {
            tracing::trace!(path = %path.display(), "no media signature");
            return Ok(base);
        };

        let mut details = MediaDetails::new(container.tag());
        let mut src = Source::new(reader, metadata.len(), self.max_element_size);

        match container::parse(container, &mut src, &mut details) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), format = %details.format, "probed");
                Ok(details.apply(base))
            }
            Err(ContainerError::Truncated(reason)) => {
                tracing::debug!(path = %path.display(), %reason, "truncated container");
                Err(ProbeError::Truncated {
                    path: path.to_path_buf(),
                    reason,
                    partial: Box::new(details.apply(base)),
                })
            }
            Err(ContainerError::Io(e)) => Err(ProbeError::io(path, &e, Some(base))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_extensions() {
        assert!(is_media_extension("MKV"));
        assert!(is_media_extension(".opus"));
        assert!(!is_media_extension("txt"));
        assert!(!is_media_extension(""));
    }

    #[test]
    fn test_probe_classifies_by_content() {
        let dir = tempfile::tempdir().unwrap();
        // A WAV payload behind a misleading extension
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, fixtures::wav(8_000, 1, 16, 16_000)).unwrap();

        let info = Prober::new().probe(&path).unwrap();
        assert_eq!(info.format, "wav");
        assert_eq!(info.codec, "pcm_s16le");
        assert_eq!(info.duration, 1.0);
    }

    #[test]
    fn test_element_cap_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        std::fs::write(&path, fixtures::mp4_video(640, 480, 2.0)).unwrap();

        let err = Prober::new().with_max_element_size(16).probe(&path).unwrap_err();
        assert!(matches!(err, ProbeError::Truncated { .. }));
        assert_eq!(err.partial().map(|p| p.format.as_str()), Some("mp4"));
    }
}
