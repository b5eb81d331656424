//! Running totals for a scan job.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use mediascan_core::{ScanEvent, ScanState, ScanSummary};

/// What an emitted event adds to the totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tally {
    File { bytes: u64 },
    Mount,
    Warning,
    Terminal,
}

impl Tally {
    pub(crate) fn of(event: &ScanEvent) -> Self {
        match event {
            ScanEvent::FileInfoReady { file, .. } => Self::File { bytes: file.size },
            ScanEvent::MountPointReady { .. } => Self::Mount,
            ScanEvent::Warning { .. } => Self::Warning,
            ScanEvent::Done { .. } | ScanEvent::Cancelled { .. } => Self::Terminal,
        }
    }
}

/// Lock-free counters shared by walkers and workers.
#[derive(Debug)]
pub(crate) struct ScanCounters {
    start_time: Instant,
    files: AtomicU64,
    mounts: AtomicU64,
    warnings: AtomicU64,
    bytes: AtomicU64,
}

impl ScanCounters {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            files: AtomicU64::new(0),
            mounts: AtomicU64::new(0),
            warnings: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    /// Count an event that reached the consumer.
    pub fn record(&self, tally: Tally) {
        match tally {
            Tally::File { bytes } => {
                self.files.fetch_add(1, Ordering::Relaxed);
                self.bytes.fetch_add(bytes, Ordering::Relaxed);
            }
            Tally::Mount => {
                self.mounts.fetch_add(1, Ordering::Relaxed);
            }
            Tally::Warning => {
                self.warnings.fetch_add(1, Ordering::Relaxed);
            }
            Tally::Terminal => {}
        }
    }

    pub fn summary(&self, state: ScanState) -> ScanSummary {
        ScanSummary {
            files: self.files.load(Ordering::Relaxed),
            mounts: self.mounts.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            elapsed: self.start_time.elapsed(),
            state,
        }
    }
}

impl Default for ScanCounters {
    fn default() -> Self {
        Self::new()
    }
}
