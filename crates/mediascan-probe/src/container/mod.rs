//! Container detection and per-format metadata parsers.
//!
//! Detection looks only at content signatures. Each parser reads index and
//! header structures through a [`source::Source`], seeking past payload.

mod flac;
mod mkv;
mod mp3;
mod mp4;
mod ogg;
mod riff;
pub(crate) mod source;

use std::io::{self, Read, Seek, SeekFrom};

use crate::error::ParseResult;
use crate::media::MediaDetails;
use source::Source;

/// Number of leading bytes inspected to classify a file.
pub const SIGNATURE_LEN: usize = 64;

/// Upper bound on children visited inside one box, element or chunk list.
pub(crate) const MAX_CHILDREN: usize = 4096;

/// Recognized container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    Mp4,
    Mov,
    Matroska,
    WebM,
    Avi,
    Wav,
    Flac,
    Ogg,
    Mp3,
}

impl Container {
    /// Short format tag reported in `FileInfo::format`.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Matroska => "matroska",
            Self::WebM => "webm",
            Self::Avi => "avi",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Ogg => "ogg",
            Self::Mp3 => "mp3",
        }
    }

    /// Classify a file from its leading bytes.
    ///
    /// MPEG audio without an ID3 tag is not recognized here since it needs
    /// the following frame header; see [`detect_container`].
    pub fn from_signature(head: &[u8]) -> Option<Self> {
        if head.len() >= 12 && &head[4..8] == b"ftyp" {
            return Some(if &head[8..12] == b"qt  " {
                Self::Mov
            } else {
                Self::Mp4
            });
        }
        if head.len() >= 8 && is_bare_iso_box(head) {
            return Some(Self::Mp4);
        }
        if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
            return Some(if mkv::sniff_webm(head) {
                Self::WebM
            } else {
                Self::Matroska
            });
        }
        if head.len() >= 12 && head.starts_with(b"RIFF") {
            return match &head[8..12] {
                b"AVI " => Some(Self::Avi),
                b"WAVE" => Some(Self::Wav),
                _ => None,
            };
        }
        if head.starts_with(b"fLaC") {
            return Some(Self::Flac);
        }
        if head.starts_with(b"OggS") {
            return Some(Self::Ogg);
        }
        if head.starts_with(b"ID3") {
            return Some(Self::Mp3);
        }
        None
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Top-level ISO BMFF box other than `ftyp` with a plausible size.
fn is_bare_iso_box(head: &[u8]) -> bool {
    let size = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
    let known = matches!(&head[4..8], b"moov" | b"mdat" | b"free" | b"wide" | b"skip");
    known && (size == 0 || size == 1 || size >= 8)
}

/// Classify the content of `reader` by signature.
///
/// Reads at most [`SIGNATURE_LEN`] bytes from the start, plus one MPEG
/// frame header when the file begins with a frame sync.
pub fn detect_container<R: Read + Seek>(reader: &mut R) -> io::Result<Option<Container>> {
    reader.seek(SeekFrom::Start(0))?;
    let mut head = Vec::with_capacity(SIGNATURE_LEN);
    reader.by_ref().take(SIGNATURE_LEN as u64).read_to_end(&mut head)?;

    if let Some(container) = Container::from_signature(&head) {
        return Ok(Some(container));
    }

    let Some(frame) = head
        .get(..4)
        .and_then(|h| mp3::FrameHeader::parse([h[0], h[1], h[2], h[3]]))
    else {
        return Ok(None);
    };

    reader.seek(SeekFrom::Start(frame.frame_len() as u64))?;
    let mut next = [0u8; 4];
    match reader.read_exact(&mut next) {
        Ok(()) if mp3::FrameHeader::parse(next).is_some() => Ok(Some(Container::Mp3)),
        Ok(()) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Run the parser for `container`, filling `details` as it goes.
pub(crate) fn parse<R: Read + Seek>(
    container: Container,
    src: &mut Source<R>,
    details: &mut MediaDetails,
) -> ParseResult<()> {
    match container {
        Container::Mp4 | Container::Mov => mp4::parse(src, details),
        Container::Matroska | Container::WebM => mkv::parse(src, details),
        Container::Avi => riff::parse_avi(src, details),
        Container::Wav => riff::parse_wav(src, details),
        Container::Flac => flac::parse(src, details),
        Container::Ogg => ogg::parse(src, details),
        Container::Mp3 => mp3::parse(src, details),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_signatures() {
        let mut ftyp = vec![0, 0, 0, 20];
        ftyp.extend_from_slice(b"ftypisom");
        ftyp.extend_from_slice(&[0; 8]);
        assert_eq!(Container::from_signature(&ftyp), Some(Container::Mp4));

        let mut qt = vec![0, 0, 0, 20];
        qt.extend_from_slice(b"ftypqt  ");
        qt.extend_from_slice(&[0; 8]);
        assert_eq!(Container::from_signature(&qt), Some(Container::Mov));

        assert_eq!(
            Container::from_signature(b"RIFF\0\0\0\0WAVEfmt "),
            Some(Container::Wav)
        );
        assert_eq!(
            Container::from_signature(b"RIFF\0\0\0\0AVI LIST"),
            Some(Container::Avi)
        );
        assert_eq!(Container::from_signature(b"RIFF\0\0\0\0CDXA"), None);
        assert_eq!(Container::from_signature(b"fLaC\0\0\0\x22"), Some(Container::Flac));
        assert_eq!(Container::from_signature(b"OggS\0\x02"), Some(Container::Ogg));
        assert_eq!(Container::from_signature(b"ID3\x04\0\0"), Some(Container::Mp3));
        assert_eq!(Container::from_signature(b"hello world"), None);
        assert_eq!(Container::from_signature(b""), None);
    }

    #[test]
    fn test_bare_moov_box() {
        let mut moov = vec![0, 0, 0, 8];
        moov.extend_from_slice(b"moov");
        assert_eq!(Container::from_signature(&moov), Some(Container::Mp4));

        let mut tiny = vec![0, 0, 0, 3];
        tiny.extend_from_slice(b"moov");
        assert_eq!(Container::from_signature(&tiny), None);
    }

    #[test]
    fn test_detect_mpeg_frames_need_successor() {
        // 128 kbps, 44.1 kHz, layer III frames are 417 bytes
        let mut frames = Vec::new();
        for _ in 0..2 {
            frames.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
            frames.extend_from_slice(&[0u8; 413]);
        }
        let detected = detect_container(&mut Cursor::new(&frames)).unwrap();
        assert_eq!(detected, Some(Container::Mp3));

        // A lone sync word followed by garbage is not MPEG audio
        let mut lone = vec![0xFF, 0xFB, 0x90, 0x00];
        lone.extend_from_slice(&[0x11u8; 600]);
        assert_eq!(detect_container(&mut Cursor::new(&lone)).unwrap(), None);
    }

    #[test]
    fn test_display_tag() {
        assert_eq!(Container::WebM.to_string(), "webm");
        assert_eq!(Container::Mov.to_string(), "mov");
    }
}
