//! Events streamed by a scan job and the aggregate report built from them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ScanWarning;
use crate::record::{FileInfo, MountPoint};

/// Lifecycle of a scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScanState {
    /// Created but not started.
    #[default]
    Idle,
    /// Walkers and workers are active.
    Running,
    /// All roots were exhausted and every probe finished.
    Completed,
    /// The job was stopped before finishing.
    Cancelled,
}

impl ScanState {
    /// Whether the job has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Totals reported with the terminal event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Number of `FileInfoReady` events emitted.
    pub files: u64,
    /// Number of `MountPointReady` events emitted.
    pub mounts: u64,
    /// Number of `Warning` events emitted.
    pub warnings: u64,
    /// Total bytes across emitted files.
    pub bytes: u64,
    /// Wall-clock time of the job.
    pub elapsed: Duration,
    /// Terminal state.
    pub state: ScanState,
}

impl ScanSummary {
    /// Calculate the probe rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// One event in a scan's output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    /// A file was probed. `volume` is the mount root it is attributed to.
    FileInfoReady { file: FileInfo, volume: PathBuf },
    /// A volume was seen for the first time in this job.
    MountPointReady { mount: MountPoint },
    /// A non-fatal problem with a file, directory or volume.
    Warning { warning: ScanWarning },
    /// The job finished normally.
    Done { summary: ScanSummary },
    /// The job was cancelled.
    Cancelled { summary: ScanSummary },
}

impl ScanEvent {
    /// Whether this is the last event of the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Cancelled { .. })
    }

    /// Summary carried by a terminal event.
    pub fn summary(&self) -> Option<&ScanSummary> {
        match self {
            Self::Done { summary } | Self::Cancelled { summary } => Some(summary),
            _ => None,
        }
    }
}

/// Everything a scan produced, collected from its event stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    /// Probed files in emission order.
    pub files: Vec<FileInfo>,
    /// Volumes in emission order.
    pub mounts: Vec<MountPoint>,
    /// Warnings in emission order.
    pub warnings: Vec<ScanWarning>,
    /// File path to volume root attribution.
    pub volumes: HashMap<PathBuf, PathBuf>,
    /// Terminal summary, if the stream reached its end.
    pub summary: Option<ScanSummary>,
}

impl ScanReport {
    /// Fold one event into the report.
    pub fn record(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::FileInfoReady { file, volume } => {
                self.volumes.insert(file.path.clone(), volume);
                self.files.push(file);
            }
            ScanEvent::MountPointReady { mount } => self.mounts.push(mount),
            ScanEvent::Warning { warning } => self.warnings.push(warning),
            ScanEvent::Done { summary } | ScanEvent::Cancelled { summary } => {
                self.summary = Some(summary)
            }
        }
    }

    /// Terminal state, or `Running` if the stream ended early.
    pub fn state(&self) -> ScanState {
        self.summary
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(ScanState::Running)
    }

    /// Look up a file record by path.
    pub fn file(&self, path: &Path) -> Option<&FileInfo> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Volume a file was attributed to.
    pub fn mount_for(&self, path: &Path) -> Option<&MountPoint> {
        let root = self.volumes.get(path)?;
        self.mounts.iter().find(|m| &m.path == root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(state: ScanState) -> ScanSummary {
        ScanSummary {
            files: 1,
            mounts: 1,
            warnings: 0,
            bytes: 10,
            elapsed: Duration::from_millis(5),
            state,
        }
    }

    #[test]
    fn test_terminal_events() {
        assert!(ScanEvent::Done { summary: summary(ScanState::Completed) }.is_terminal());
        assert!(ScanEvent::Cancelled { summary: summary(ScanState::Cancelled) }.is_terminal());
        assert!(!ScanEvent::MountPointReady { mount: MountPoint::new("/", 1, 1) }.is_terminal());
    }

    #[test]
    fn test_report_attribution() {
        let mut report = ScanReport::default();
        report.record(ScanEvent::MountPointReady {
            mount: MountPoint::new("/data", 1000, 400),
        });
        report.record(ScanEvent::FileInfoReady {
            file: FileInfo::new("/data/b.txt", 10),
            volume: PathBuf::from("/data"),
        });
        report.record(ScanEvent::Done {
            summary: summary(ScanState::Completed),
        });

        assert_eq!(report.state(), ScanState::Completed);
        let mount = report.mount_for(Path::new("/data/b.txt")).unwrap();
        assert_eq!(mount.used, 600);
        assert!(report.file(Path::new("/data/b.txt")).is_some());
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = ScanEvent::MountPointReady {
            mount: MountPoint::new("/data", 1000, 400),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "mount_point_ready");
        assert_eq!(json["mount"]["used"], 600);
    }
}
