//! Per-job volume and path tracking.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use mediascan_core::MountPoint;
use tokio::sync::OnceCell;

/// Tracks the volumes seen by one scan job.
///
/// Each volume root maps to a cell that is initialized exactly once, so
/// the capacity query and the `MountPointReady` emission happen once per
/// volume even when many workers reach it at the same time. Workers that
/// arrive while the first is still resolving wait for it.
#[derive(Debug, Default)]
pub struct VolumeTracker {
    volumes: DashMap<PathBuf, Arc<OnceCell<MountPoint>>>,
}

impl VolumeTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            volumes: DashMap::new(),
        }
    }

    /// Return the mount for `root`, running `init` if this is the first
    /// request for it.
    pub async fn get_or_resolve<F, Fut>(&self, root: &Path, init: F) -> MountPoint
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MountPoint>,
    {
        // The map guard must be released before awaiting
        let cell = self
            .volumes
            .entry(root.to_path_buf())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();

        cell.get_or_init(init).await.clone()
    }

    /// Mount for `root`, if it has been resolved.
    pub fn get(&self, root: &Path) -> Option<MountPoint> {
        self.volumes.get(root)?.get().cloned()
    }

    /// Number of volume roots seen.
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    /// Check if no volume has been seen.
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

/// Set of file paths already claimed by a worker.
///
/// Overlapping roots can enumerate the same file more than once; only the
/// first claim is probed.
#[derive(Debug, Default)]
pub struct PathTracker {
    seen: DashSet<PathBuf>,
}

impl PathTracker {
    pub fn new() -> Self {
        Self {
            seen: DashSet::new(),
        }
    }

    /// Claim a path. Returns `true` if this is the first time seeing it.
    pub fn claim(&self, path: &Path) -> bool {
        self.seen.insert(path.to_path_buf())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
