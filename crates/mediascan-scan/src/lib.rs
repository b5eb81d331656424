//! Concurrent media scanning engine for mediascan.
//!
//! This crate walks directory trees, probes every candidate file on a
//! bounded pool of workers and attributes each file to the mounted volume
//! that holds it.
//!
//! # Overview
//!
//! `mediascan-scan` is responsible for turning a set of roots into a stream
//! of [`ScanEvent`]s. Key features:
//!
//! - **Bounded concurrency** via a fixed pool of probe workers
//! - **Streaming results** through an mpsc channel with backpressure
//! - **Once-per-volume** capacity queries and `MountPointReady` events
//! - **Cooperative cancellation** via a cancellation token
//!
//! # Example
//!
//! ```rust,no_run
//! use mediascan_scan::{MediaScanner, ScanEvent, ScanOptions};
//!
//! # async fn run() -> Result<(), mediascan_scan::ScanError> {
//! let scanner = MediaScanner::new();
//! let mut handle = scanner.scan(["/srv/media"], &ScanOptions::default())?;
//!
//! while let Some(event) = handle.recv().await {
//!     match event {
//!         ScanEvent::FileInfoReady { file, .. } => println!("{}", file.path.display()),
//!         ScanEvent::Done { summary } => println!("{} files", summary.files),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Cancellation
//!
//! Call [`ScanHandle::cancel`] or drop the handle. Workers stop at their
//! next checkpoint and the stream ends with a `Cancelled` event.

mod coordinator;
mod mount;
mod progress;
mod volumes;
mod walker;

pub use coordinator::{DISPATCH_SLOTS_PER_WORKER, MediaScanner, ScanHandle};
pub use mount::{SystemVolumes, VolumeError, VolumeResolver, is_pseudo_mount, list_mounts};
pub use volumes::{PathTracker, VolumeTracker};
pub use walker::{Walker, compile_ignore_patterns};

// Re-export core types for convenience
pub use mediascan_core::{
    FileInfo, MountPoint, ScanError, ScanEvent, ScanOptions, ScanReport, ScanState, ScanSummary,
    ScanWarning, WarningKind,
};
