//! Scan configuration types.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Configuration for a scan job.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct ScanOptions {
    /// Size of the probing worker pool.
    #[builder(default = "default_concurrency()")]
    pub max_concurrency: usize,

    /// Extensions to include (empty = all files).
    #[builder(default)]
    pub include_extensions: BTreeSet<String>,

    /// Extensions to exclude. Takes precedence over the allowlist.
    #[builder(default)]
    pub exclude_extensions: BTreeSet<String>,

    /// Follow symbolic links.
    #[builder(default = "false")]
    pub follow_symlinks: bool,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    pub include_hidden: bool,

    /// Maximum depth to traverse (None = unlimited).
    #[builder(default)]
    pub max_depth: Option<usize>,

    /// Glob patterns matched against entry names; matching directories are pruned.
    #[builder(default)]
    pub ignore_patterns: Vec<String>,

    /// Per-file probe timeout (None = no limit).
    #[builder(default)]
    pub probe_timeout: Option<Duration>,

    /// Capacity of the event channel.
    #[builder(default = "DEFAULT_EVENT_BUFFER")]
    pub event_buffer: usize,
}

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Largest accepted probe worker pool.
pub const MAX_CONCURRENCY: usize = 1024;

/// Largest accepted event channel capacity.
pub const MAX_EVENT_BUFFER: usize = 1 << 20;

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(MAX_CONCURRENCY))
        .unwrap_or(4)
}

fn check_range(field: &str, value: usize, max: usize) -> Result<(), String> {
    if value == 0 {
        return Err(format!("{field} must be greater than zero"));
    }
    if value > max {
        return Err(format!("{field} must be at most {max}, got {value}"));
    }
    Ok(())
}

impl ScanOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(workers) = self.max_concurrency {
            check_range("max_concurrency", workers, MAX_CONCURRENCY)?;
        }
        if let Some(buffer) = self.event_buffer {
            check_range("event_buffer", buffer, MAX_EVENT_BUFFER)?;
        }
        Ok(())
    }
}

impl ScanOptions {
    /// Create a new options builder.
    pub fn builder() -> ScanOptionsBuilder {
        ScanOptionsBuilder::default()
    }

    /// Check invariants that deserialized options may violate.
    pub fn validate(&self) -> Result<(), ScanError> {
        check_range("max_concurrency", self.max_concurrency, MAX_CONCURRENCY)
            .and_then(|()| check_range("event_buffer", self.event_buffer, MAX_EVENT_BUFFER))
            .map_err(ScanError::invalid_config)
    }

    /// Check if a file passes the include/exclude extension filters.
    pub fn accepts_extension(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());

        let listed = |set: &BTreeSet<String>| match &ext {
            Some(ext) => set.iter().any(|e| normalize_extension(e) == *ext),
            None => false,
        };

        if listed(&self.exclude_extensions) {
            return false;
        }
        self.include_extensions.is_empty() || listed(&self.include_extensions)
    }

    /// Check if hidden files should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_concurrency: default_concurrency(),
            include_extensions: BTreeSet::new(),
            exclude_extensions: BTreeSet::new(),
            follow_symlinks: false,
            include_hidden: true,
            max_depth: None,
            ignore_patterns: Vec::new(),
            probe_timeout: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Lowercase an extension and strip a leading dot.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_options_builder() {
        let options = ScanOptions::builder()
            .max_concurrency(8usize)
            .follow_symlinks(true)
            .include_extensions(set(&["mp4", "mkv"]))
            .build()
            .unwrap();

        assert_eq!(options.max_concurrency, 8);
        assert!(options.follow_symlinks);
        assert_eq!(options.include_extensions.len(), 2);
        assert_eq!(options.event_buffer, DEFAULT_EVENT_BUFFER);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = ScanOptions::builder().max_concurrency(0usize).build();
        assert!(result.is_err());

        let options = ScanOptions {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_oversized_limits_rejected() {
        let result = ScanOptions::builder()
            .max_concurrency(MAX_CONCURRENCY + 1)
            .build();
        assert!(result.is_err());
        let result = ScanOptions::builder().event_buffer(usize::MAX).build();
        assert!(result.is_err());

        let options: ScanOptions =
            serde_json::from_str(r#"{"max_concurrency": 9223372036854775807}"#).unwrap();
        assert!(matches!(
            options.validate(),
            Err(ScanError::InvalidConfig { .. })
        ));

        let options = ScanOptions {
            max_concurrency: MAX_CONCURRENCY,
            event_buffer: MAX_EVENT_BUFFER,
            ..Default::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_extension_filters() {
        let options = ScanOptions {
            include_extensions: set(&[".MP4", "mkv"]),
            exclude_extensions: set(&["mkv"]),
            ..Default::default()
        };

        assert!(options.accepts_extension(Path::new("/a/movie.mp4")));
        assert!(options.accepts_extension(Path::new("/a/MOVIE.Mp4")));
        // Exclusion wins over inclusion
        assert!(!options.accepts_extension(Path::new("/a/movie.mkv")));
        assert!(!options.accepts_extension(Path::new("/a/notes.txt")));
        assert!(!options.accepts_extension(Path::new("/a/README")));
    }

    #[test]
    fn test_no_filters_accepts_everything() {
        let options = ScanOptions::default();
        assert!(options.accepts_extension(Path::new("/a/README")));
        assert!(options.accepts_extension(Path::new("/a/b.txt")));
    }

    #[test]
    fn test_deserialize_partial_options() {
        let options: ScanOptions =
            serde_json::from_str(r#"{"max_concurrency": 2, "follow_symlinks": true}"#).unwrap();
        assert_eq!(options.max_concurrency, 2);
        assert!(options.follow_symlinks);
        assert!(options.include_hidden);
        assert!(options.probe_timeout.is_none());
    }

    #[test]
    fn test_should_skip_hidden() {
        let mut options = ScanOptions::default();
        assert!(!options.should_skip_hidden(".git"));

        options.include_hidden = false;
        assert!(options.should_skip_hidden(".git"));
        assert!(!options.should_skip_hidden("src"));
    }
}
