//! Stream-level metadata collected by container parsers.

use compact_str::CompactString;
use mediascan_core::FileInfo;

/// Kind of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Other,
}

/// One elementary stream found in a container.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub kind: TrackKind,
    /// Lowercase codec tag (`h264`, `aac`, ...), empty if unknown.
    pub codec: CompactString,
    pub width: u32,
    pub height: u32,
}

impl Track {
    /// Create a video track.
    pub fn video(codec: impl Into<CompactString>, width: u32, height: u32) -> Self {
        Self {
            kind: TrackKind::Video,
            codec: codec.into(),
            width,
            height,
        }
    }

    /// Create an audio track.
    pub fn audio(codec: impl Into<CompactString>) -> Self {
        Self {
            kind: TrackKind::Audio,
            codec: codec.into(),
            width: 0,
            height: 0,
        }
    }
}

/// Everything a parser learned about a container.
///
/// Parsers fill this incrementally so a truncated file still yields what
/// was read before the failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaDetails {
    /// Short container tag.
    pub format: CompactString,
    /// Duration in seconds, 0 if unknown.
    pub duration: f64,
    pub tracks: Vec<Track>,
}

impl MediaDetails {
    pub fn new(format: impl Into<CompactString>) -> Self {
        Self {
            format: format.into(),
            ..Self::default()
        }
    }

    /// The primary stream: first video track, otherwise first audio track.
    pub fn primary(&self) -> Option<&Track> {
        self.tracks
            .iter()
            .find(|t| t.kind == TrackKind::Video)
            .or_else(|| self.tracks.iter().find(|t| t.kind == TrackKind::Audio))
    }

    /// Fill a size-only record with these details.
    pub fn apply(&self, info: FileInfo) -> FileInfo {
        let info = info
            .with_format(self.format.clone())
            .with_duration(self.duration);

        match self.primary() {
            Some(track) if track.kind == TrackKind::Video => info
                .with_codec(track.codec.clone())
                .with_dimensions(track.width, track.height),
            Some(track) => info.with_codec(track.codec.clone()),
            None => info,
        }
    }
}
