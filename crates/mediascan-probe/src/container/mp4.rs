//! ISO base media (MP4 / QuickTime) box walker.

use std::io::{Read, Seek};

use super::MAX_CHILDREN;
use super::source::{Source, be_u16, be_u32, be_u64, bytes, fourcc_tag};
use crate::error::{ContainerError, ParseResult};
use crate::media::{MediaDetails, Track, TrackKind};

/// Parsed box header.
#[derive(Debug, Clone, Copy)]
struct BoxHeader {
    kind: [u8; 4],
    /// Offset of the box payload.
    data: u64,
    /// End of the box, clipped to its parent.
    end: u64,
    /// Declared size ran past the parent.
    clipped: bool,
}

impl BoxHeader {
    fn data_size(&self) -> u64 {
        self.end - self.data
    }

    fn is(&self, kind: &[u8; 4]) -> bool {
        &self.kind == kind
    }
}

/// Read the box headers between `start` and `end`.
fn children<R: Read + Seek>(
    src: &mut Source<R>,
    start: u64,
    end: u64,
) -> ParseResult<Vec<BoxHeader>> {
    let mut boxes = Vec::new();
    let mut pos = start;

    while pos + 8 <= end {
        if boxes.len() >= MAX_CHILDREN {
            return Err(ContainerError::truncated("too many boxes in one container"));
        }

        let head = src.read_at(pos, 8)?;
        let size = be_u32(&head, 0)? as u64;
        let kind = bytes::<4>(&head, 4)?;

        let (size, header_len) = match size {
            1 => (be_u64(&src.read_at(pos + 8, 8)?, 0)?, 16),
            0 => (end - pos, 8),
            n => (n, 8),
        };
        if size < header_len || pos + header_len > end {
            return Err(ContainerError::truncated(format!(
                "box '{}' at offset {pos} has invalid size {size}",
                fourcc_tag(kind)
            )));
        }

        let declared_end = pos.saturating_add(size);
        let clipped = declared_end > end;
        let header = BoxHeader {
            kind,
            data: pos + header_len,
            end: declared_end.min(end),
            clipped,
        };
        boxes.push(header);

        if clipped {
            break;
        }
        pos = header.end;
    }

    Ok(boxes)
}

fn clipped_error(parent: &str, boxes: &[BoxHeader]) -> ParseResult<()> {
    match boxes.iter().find(|b| b.clipped) {
        Some(b) => Err(ContainerError::truncated(format!(
            "box '{}' extends past the end of {parent}",
            fourcc_tag(b.kind)
        ))),
        None => Ok(()),
    }
}

pub(super) fn parse<R: Read + Seek>(
    src: &mut Source<R>,
    details: &mut MediaDetails,
) -> ParseResult<()> {
    let top = children(src, 0, src.len())?;

    let Some(moov) = top.iter().find(|b| b.is(b"moov")) else {
        return Err(ContainerError::truncated("no moov box"));
    };
    parse_moov(src, moov, details)?;

    // Sample data is never read, so a short trailing mdat loses nothing
    let top: Vec<BoxHeader> = top.into_iter().filter(|b| !b.is(b"mdat")).collect();
    clipped_error("file", &top)
}

fn parse_moov<R: Read + Seek>(
    src: &mut Source<R>,
    moov: &BoxHeader,
    details: &mut MediaDetails,
) -> ParseResult<()> {
    let boxes = children(src, moov.data, moov.end)?;
    let mut movie_duration = false;

    for b in &boxes {
        if b.is(b"mvhd") {
            let data = src.read_at(b.data, b.data_size())?;
            if let Some(seconds) = header_duration(&data)? {
                details.duration = seconds;
                movie_duration = true;
            }
        } else if b.is(b"trak") {
            let mut track = Track {
                kind: TrackKind::Other,
                codec: Default::default(),
                width: 0,
                height: 0,
            };
            let mut track_duration = None;
            let result = parse_trak(src, b, &mut track, &mut track_duration);

            details.tracks.push(track);
            if !movie_duration {
                if let Some(seconds) = track_duration {
                    details.duration = details.duration.max(seconds);
                }
            }
            result?;
        }
    }

    clipped_error("moov", &boxes)
}

/// Duration from an `mvhd` or `mdhd` payload, if declared.
fn header_duration(data: &[u8]) -> ParseResult<Option<f64>> {
    let version = bytes::<1>(data, 0)?[0];
    let (timescale, duration) = if version == 1 {
        let duration = be_u64(data, 24)?;
        (be_u32(data, 20)?, (duration != u64::MAX).then_some(duration))
    } else {
        let duration = be_u32(data, 16)?;
        (be_u32(data, 12)?, (duration != u32::MAX).then_some(duration as u64))
    };

    Ok(match duration {
        Some(d) if timescale > 0 && d > 0 => Some(d as f64 / timescale as f64),
        _ => None,
    })
}

fn parse_trak<R: Read + Seek>(
    src: &mut Source<R>,
    trak: &BoxHeader,
    track: &mut Track,
    duration: &mut Option<f64>,
) -> ParseResult<()> {
    let boxes = children(src, trak.data, trak.end)?;

    for b in &boxes {
        if b.is(b"tkhd") {
            let data = src.read_at(b.data, b.data_size())?;
            let (w, h) = if bytes::<1>(&data, 0)?[0] == 1 { (88, 92) } else { (76, 80) };
            // 16.16 fixed point
            track.width = be_u32(&data, w)? >> 16;
            track.height = be_u32(&data, h)? >> 16;
        } else if b.is(b"mdia") {
            parse_mdia(src, b, track, duration)?;
        }
    }

    clipped_error("trak", &boxes)
}

fn parse_mdia<R: Read + Seek>(
    src: &mut Source<R>,
    mdia: &BoxHeader,
    track: &mut Track,
    duration: &mut Option<f64>,
) -> ParseResult<()> {
    let boxes = children(src, mdia.data, mdia.end)?;

    for b in &boxes {
        if b.is(b"mdhd") {
            let data = src.read_at(b.data, b.data_size())?;
            *duration = header_duration(&data)?;
        } else if b.is(b"hdlr") {
            let data = src.read_at(b.data, b.data_size())?;
            track.kind = match &bytes::<4>(&data, 8)? {
                b"vide" => TrackKind::Video,
                b"soun" => TrackKind::Audio,
                _ => TrackKind::Other,
            };
        } else if b.is(b"minf") {
            for stbl in children(src, b.data, b.end)?.iter().filter(|c| c.is(b"stbl")) {
                for stsd in children(src, stbl.data, stbl.end)?.iter().filter(|c| c.is(b"stsd")) {
                    let data = src.read_at(stsd.data, stsd.data_size())?;
                    parse_stsd(&data, track)?;
                }
            }
        }
    }

    if track.kind != TrackKind::Video {
        track.width = 0;
        track.height = 0;
    }
    clipped_error("mdia", &boxes)
}

/// First sample entry: codec fourcc, and coded size for visual entries.
fn parse_stsd(data: &[u8], track: &mut Track) -> ParseResult<()> {
    if be_u32(data, 4)? == 0 {
        return Ok(());
    }
    let fourcc = bytes::<4>(data, 12)?;
    track.codec = codec_name(fourcc).into();

    if track.kind == TrackKind::Video {
        let width = be_u16(data, 40)? as u32;
        let height = be_u16(data, 42)? as u32;
        if width > 0 && height > 0 {
            track.width = width;
            track.height = height;
        }
    }
    Ok(())
}

/// Map a sample entry fourcc to a codec tag.
fn codec_name(fourcc: [u8; 4]) -> String {
    let name = match &fourcc {
        b"avc1" | b"avc3" => "h264",
        b"hvc1" | b"hev1" => "hevc",
        b"av01" => "av1",
        b"vp08" => "vp8",
        b"vp09" => "vp9",
        b"mp4v" => "mpeg4",
        b"s263" => "h263",
        b"mjpa" | b"mjpb" | b"jpeg" => "mjpeg",
        [b'a', b'p', _, _] => "prores",
        b"mp4a" => "aac",
        b"ac-3" => "ac3",
        b"ec-3" => "eac3",
        b"Opus" => "opus",
        b"fLaC" => "flac",
        b"alac" => "alac",
        b".mp3" => "mp3",
        b"sowt" => "pcm_s16le",
        b"twos" => "pcm_s16be",
        b"lpcm" => "pcm",
        _ => return fourcc_tag(fourcc),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use std::io::Cursor;

    fn run(data: Vec<u8>) -> (MediaDetails, ParseResult<()>) {
        let len = data.len() as u64;
        let mut src = Source::new(Cursor::new(data), len, 1 << 20);
        let mut details = MediaDetails::new("mp4");
        let result = parse(&mut src, &mut details);
        (details, result)
    }

    #[test]
    fn test_video_and_audio_tracks() {
        let (details, result) = run(fixtures::mp4_video(1920, 1080, 12.5));
        result.unwrap();
        assert_eq!(details.duration, 12.5);
        let primary = details.primary().unwrap();
        assert_eq!(primary.codec, "h264");
        assert_eq!((primary.width, primary.height), (1920, 1080));
        assert_eq!(details.tracks.len(), 2);
        assert_eq!(details.tracks[1].codec, "aac");
    }

    #[test]
    fn test_missing_moov() {
        let mut data = vec![0, 0, 0, 16];
        data.extend_from_slice(b"ftypisom");
        data.extend_from_slice(&[0; 4]);
        let (_, result) = run(data);
        assert!(matches!(result, Err(ContainerError::Truncated(_))));
    }

    #[test]
    fn test_clipped_mdat_is_complete() {
        let mut data = fixtures::mp4_video(1280, 720, 3.0);
        // An mdat claiming far more payload than the file holds
        data.extend_from_slice(&1_000_000u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&[0; 64]);

        let (details, result) = run(data);
        result.unwrap();
        assert_eq!(details.primary().map(|t| t.width), Some(1280));
        assert_eq!(details.duration, 3.0);
    }

    #[test]
    fn test_cut_inside_trailing_mdat() {
        let data = fixtures::mp4_video(640, 480, 2.0);
        let (details, result) = run(data[..data.len() - 8].to_vec());
        result.unwrap();
        assert_eq!(details.duration, 2.0);
        assert_eq!(details.primary().map(|t| t.codec.as_str()), Some("h264"));
    }

    #[test]
    fn test_clipped_trailing_box_keeps_details() {
        let mut data = fixtures::mp4_video(1280, 720, 3.0);
        data.extend_from_slice(&1_000_000u32.to_be_bytes());
        data.extend_from_slice(b"udta");
        data.extend_from_slice(&[0; 64]);

        let (details, result) = run(data);
        assert!(matches!(result, Err(ContainerError::Truncated(_))));
        assert_eq!(details.primary().map(|t| t.width), Some(1280));
        assert_eq!(details.duration, 3.0);
    }

    #[test]
    fn test_codec_names() {
        assert_eq!(codec_name(*b"hvc1"), "hevc");
        assert_eq!(codec_name(*b"apch"), "prores");
        assert_eq!(codec_name(*b"ac-3"), "ac3");
        assert_eq!(codec_name(*b"XYZW"), "xyzw");
    }
}
