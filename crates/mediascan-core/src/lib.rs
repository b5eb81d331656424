//! Core types for mediascan.
//!
//! This crate provides the data shapes shared by the prober, the scanner
//! and any presentation layer: the `FileInfo` and `MountPoint` records,
//! scan options, the warning taxonomy and the scan event stream.

mod config;
mod error;
mod event;
mod record;

pub use config::{
    DEFAULT_EVENT_BUFFER, MAX_CONCURRENCY, MAX_EVENT_BUFFER, ScanOptions, ScanOptionsBuilder,
    normalize_extension,
};
pub use error::{RecordError, ScanError, ScanWarning, WarningKind};
pub use event::{ScanEvent, ScanReport, ScanState, ScanSummary};
pub use record::{FileInfo, MountPoint};
