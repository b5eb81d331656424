//! Volume resolution and capacity queries.

use std::path::{Path, PathBuf};

use mediascan_core::MountPoint;
use sysinfo::Disks;

/// Mount roots that never hold user media.
const PSEUDO_MOUNTS: &[&str] = &["/proc", "/sys", "/dev", "/run", "/boot", "/System", "/private"];

/// Exceptions under [`PSEUDO_MOUNTS`] that can hold real data.
const REAL_UNDER_PSEUDO: &[&str] = &["/dev/shm", "/run/media"];

/// Errors from volume queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VolumeError {
    /// The volume could not be determined or queried.
    #[error("Volume unavailable for {path}: {reason}")]
    Unavailable { path: PathBuf, reason: String },
}

impl VolumeError {
    pub fn unavailable(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Path the query was made for.
    pub fn path(&self) -> &Path {
        match self {
            Self::Unavailable { path, .. } => path,
        }
    }
}

/// Maps paths to the volume that holds them.
///
/// Implementations must be stateless with respect to a scan: the scanner
/// calls them concurrently from many workers.
pub trait VolumeResolver: Send + Sync {
    /// Root of the mounted volume containing `path`.
    ///
    /// `path` need not exist; its nearest existing ancestor is used.
    fn volume_root(&self, path: &Path) -> Result<PathBuf, VolumeError>;

    /// Capacity snapshot for a volume root.
    fn capacity(&self, root: &Path) -> Result<MountPoint, VolumeError>;

    /// Capacity snapshot for the volume containing `path`.
    fn resolve(&self, path: &Path) -> Result<MountPoint, VolumeError> {
        let root = self.volume_root(path)?;
        self.capacity(&root)
    }
}

/// Volume resolver backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemVolumes;

impl SystemVolumes {
    pub fn new() -> Self {
        Self
    }
}

/// Canonical form of the closest ancestor of `path` that exists.
fn nearest_existing(path: &Path) -> Result<PathBuf, VolumeError> {
    for candidate in path.ancestors() {
        if candidate.as_os_str().is_empty() {
            continue;
        }
        match std::fs::metadata(candidate) {
            Ok(_) => {
                return candidate
                    .canonicalize()
                    .map_err(|e| VolumeError::unavailable(path, e));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(VolumeError::unavailable(path, e)),
        }
    }
    Err(VolumeError::unavailable(path, "no existing ancestor"))
}

#[cfg(unix)]
impl VolumeResolver for SystemVolumes {
    fn volume_root(&self, path: &Path) -> Result<PathBuf, VolumeError> {
        use std::os::unix::fs::MetadataExt;

        let existing = nearest_existing(path)?;
        let device = std::fs::metadata(&existing)
            .map_err(|e| VolumeError::unavailable(path, e))?
            .dev();

        // Climb while the parent is on the same device
        let mut root = existing;
        while let Some(parent) = root.parent() {
            match std::fs::metadata(parent) {
                Ok(m) if m.dev() == device => root = parent.to_path_buf(),
                _ => break,
            }
        }
        Ok(root)
    }

    fn capacity(&self, root: &Path) -> Result<MountPoint, VolumeError> {
        let (total, available) =
            statvfs_capacity(root).map_err(|e| VolumeError::unavailable(root, e))?;
        Ok(MountPoint::new(root, total, available))
    }
}

/// Total and available bytes from `statvfs(3)`.
#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
fn statvfs_capacity(path: &Path) -> std::io::Result<(u64, u64)> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path contains NUL"))?;

    let mut stat = std::mem::MaybeUninit::<libc::statvfs>::uninit();
    // SAFETY: c_path is NUL-terminated and stat is a valid out pointer.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: statvfs returned success, so the struct is initialized.
    let stat = unsafe { stat.assume_init() };

    let fragment = stat.f_frsize as u64;
    Ok((
        (stat.f_blocks as u64).saturating_mul(fragment),
        (stat.f_bavail as u64).saturating_mul(fragment),
    ))
}

#[cfg(not(unix))]
impl VolumeResolver for SystemVolumes {
    fn volume_root(&self, path: &Path) -> Result<PathBuf, VolumeError> {
        let existing = nearest_existing(path)?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .iter()
            .map(|d| d.mount_point())
            .filter(|root| existing.starts_with(root))
            .max_by_key(|root| root.as_os_str().len())
            .map(Path::to_path_buf)
            .ok_or_else(|| VolumeError::unavailable(path, "no mounted volume contains this path"))
    }

    fn capacity(&self, root: &Path) -> Result<MountPoint, VolumeError> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .iter()
            .find(|d| d.mount_point() == root)
            .map(|d| MountPoint::new(root, d.total_space(), d.available_space()))
            .ok_or_else(|| VolumeError::unavailable(root, "not a mounted volume"))
    }
}

/// Whether a mount root is an OS pseudo filesystem.
pub fn is_pseudo_mount(root: &Path) -> bool {
    if REAL_UNDER_PSEUDO.iter().any(|keep| root.starts_with(keep)) {
        return false;
    }
    PSEUDO_MOUNTS.iter().any(|pseudo| root.starts_with(pseudo))
}

/// Every real mounted volume, sorted by path.
///
/// Pseudo filesystems and volumes whose capacity cannot be read are left
/// out.
pub fn list_mounts() -> Vec<MountPoint> {
    let mut roots: Vec<PathBuf> = Disks::new_with_refreshed_list()
        .iter()
        .map(|d| d.mount_point().to_path_buf())
        .filter(|root| !is_pseudo_mount(root))
        .collect();
    roots.sort();
    roots.dedup();

    let resolver = SystemVolumes;
    roots
        .into_iter()
        .filter_map(|root| match resolver.capacity(&root) {
            Ok(mount) => Some(mount),
            Err(e) => {
                tracing::debug!(error = %e, "skipping volume");
                None
            }
        })
        .collect()
}
