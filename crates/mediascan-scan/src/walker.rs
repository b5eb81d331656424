//! Sequential, sorted directory walker producing candidate files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use mediascan_core::{ScanError, ScanOptions, ScanWarning};
use walkdir::WalkDir;

/// Compile ignore patterns into a matcher.
pub fn compile_ignore_patterns(patterns: &[String]) -> Result<Option<GlobSet>, ScanError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            ScanError::invalid_config(format!("invalid ignore pattern '{pattern}': {e}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| ScanError::invalid_config(format!("invalid ignore patterns: {e}")))
}

/// Lazy enumeration of the regular files under one root.
///
/// Entries are visited in file-name order within each directory. Problems
/// with individual entries are yielded as warnings and the walk goes on.
pub struct Walker {
    root: PathBuf,
    inner: walkdir::IntoIter,
    options: ScanOptions,
    ignore: Option<GlobSet>,
    /// Canonical directories entered so far, when following symlinks.
    visited: HashSet<PathBuf>,
}

impl Walker {
    /// Create a walker for `root`. Fails only on invalid ignore patterns.
    pub fn new(root: impl Into<PathBuf>, options: &ScanOptions) -> Result<Self, ScanError> {
        let ignore = compile_ignore_patterns(&options.ignore_patterns)?;
        Ok(Self::with_ignore(root, options, ignore))
    }

    /// Create a walker with an already compiled ignore matcher.
    pub fn with_ignore(
        root: impl Into<PathBuf>,
        options: &ScanOptions,
        ignore: Option<GlobSet>,
    ) -> Self {
        let root = root.into();
        let mut walk = WalkDir::new(&root)
            .follow_links(options.follow_symlinks)
            .sort_by_file_name();
        if let Some(depth) = options.max_depth {
            walk = walk.max_depth(depth);
        }

        Self {
            root,
            inner: walk.into_iter(),
            options: options.clone(),
            ignore,
            visited: HashSet::new(),
        }
    }

    /// Root this walker enumerates.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.options.should_skip_hidden(name)
            || self.ignore.as_ref().is_some_and(|set| set.is_match(name))
    }

    fn error_warning(&self, err: walkdir::Error) -> ScanWarning {
        let path = err
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        if let Some(ancestor) = err.loop_ancestor() {
            return ScanWarning::symlink_cycle(path, ancestor);
        }
        match err.io_error() {
            Some(io) => ScanWarning::from_io(path, io),
            None => ScanWarning::unreadable(path, &err),
        }
    }

    /// Record a directory's real path. Returns `false` if it was already
    /// entered through another link.
    ///
    /// Links back to an ancestor are reported by walkdir as loops before
    /// they get here, so a repeat is a duplicate, not a cycle.
    fn enter_dir(&mut self, path: &Path) -> Result<bool, ScanWarning> {
        let real = path.canonicalize().map_err(|e| ScanWarning::from_io(path, &e))?;
        if self.visited.contains(&real) {
            tracing::debug!(
                path = %path.display(),
                real = %real.display(),
                "skipping duplicate directory"
            );
            return Ok(false);
        }
        self.visited.insert(real);
        Ok(true)
    }
}

impl Iterator for Walker {
    type Item = Result<PathBuf, ScanWarning>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(self.error_warning(err))),
            };
            let file_type = entry.file_type();

            if entry.depth() > 0 && self.is_ignored(&entry.file_name().to_string_lossy()) {
                if file_type.is_dir() {
                    self.inner.skip_current_dir();
                }
                continue;
            }

            if file_type.is_dir() {
                if self.options.follow_symlinks {
                    match self.enter_dir(entry.path()) {
                        Ok(true) => {}
                        Ok(false) => self.inner.skip_current_dir(),
                        Err(warning) => {
                            self.inner.skip_current_dir();
                            return Some(Err(warning));
                        }
                    }
                }
                continue;
            }

            if file_type.is_symlink() {
                // Only reached when links are not followed
                if let Err(e) = std::fs::metadata(entry.path()) {
                    return Some(Err(ScanWarning::unreadable(
                        entry.path(),
                        format!("broken symlink: {e}"),
                    )));
                }
                continue;
            }

            if file_type.is_file() && self.options.accepts_extension(entry.path()) {
                return Some(Ok(entry.into_path()));
            }
        }
    }
}
