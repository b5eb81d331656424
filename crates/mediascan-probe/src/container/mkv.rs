//! Matroska / WebM EBML element walker.

use std::io::{Read, Seek};

use super::MAX_CHILDREN;
use super::source::Source;
use crate::error::{ContainerError, ParseResult};
use crate::media::{MediaDetails, Track, TrackKind};

const EBML: u32 = 0x1A45_DFA3;
const DOC_TYPE: u32 = 0x4282;
const SEGMENT: u32 = 0x1853_8067;
const INFO: u32 = 0x1549_A966;
const TIMESTAMP_SCALE: u32 = 0x2A_D7B1;
const DURATION: u32 = 0x4489;
const TRACKS: u32 = 0x1654_AE6B;
const TRACK_ENTRY: u32 = 0xAE;
const TRACK_TYPE: u32 = 0x83;
const CODEC_ID: u32 = 0x86;
const VIDEO: u32 = 0xE0;
const PIXEL_WIDTH: u32 = 0xB0;
const PIXEL_HEIGHT: u32 = 0xBA;
const CLUSTER: u32 = 0x1F43_B675;

const DEFAULT_TIMESTAMP_SCALE: u64 = 1_000_000;

#[derive(Debug, Clone, Copy)]
struct Element {
    id: u32,
    data: u64,
    /// End of the payload, clipped to the parent.
    end: u64,
    clipped: bool,
    unknown_size: bool,
}

/// Decode an element ID, keeping its length marker bits.
fn read_id(buf: &[u8]) -> ParseResult<(u32, usize)> {
    let first = *buf
        .first()
        .ok_or_else(|| ContainerError::truncated("missing element id"))?;
    let len = first.leading_zeros() as usize + 1;
    if len > 4 || buf.len() < len {
        return Err(ContainerError::truncated("invalid element id"));
    }
    let id = buf[..len].iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
    Ok((id, len))
}

/// Decode an element size. `None` is the reserved unknown size.
fn read_size(buf: &[u8]) -> ParseResult<(Option<u64>, usize)> {
    let first = *buf
        .first()
        .ok_or_else(|| ContainerError::truncated("missing element size"))?;
    let len = first.leading_zeros() as usize + 1;
    if len > 8 || buf.len() < len {
        return Err(ContainerError::truncated("invalid element size"));
    }
    let mask = if len == 8 { 0 } else { 0xFFu8 >> len };
    let value = buf[1..len]
        .iter()
        .fold((first & mask) as u64, |acc, b| (acc << 8) | *b as u64);
    let all_ones = (1u64 << (7 * len)) - 1;
    Ok(((value != all_ones).then_some(value), len))
}

fn element_at<R: Read + Seek>(
    src: &mut Source<R>,
    pos: u64,
    parent_end: u64,
) -> ParseResult<Element> {
    let head = src.read_upto(pos, 12)?;
    let (id, id_len) = read_id(&head)?;
    let (size, size_len) = read_size(&head[id_len..])?;
    let data = pos + (id_len + size_len) as u64;
    if data > parent_end {
        return Err(ContainerError::truncated(format!(
            "element {id:#x} header at offset {pos} crosses its parent"
        )));
    }

    let (end, clipped) = match size {
        Some(size) => {
            let end = data.saturating_add(size);
            (end.min(parent_end), end > parent_end)
        }
        None => (parent_end, false),
    };
    Ok(Element {
        id,
        data,
        end,
        clipped,
        unknown_size: size.is_none(),
    })
}

/// Elements inside a master element with a known size.
fn children<R: Read + Seek>(src: &mut Source<R>, parent: &Element) -> ParseResult<Vec<Element>> {
    let mut elements = Vec::new();
    let mut pos = parent.data;

    while pos < parent.end {
        if elements.len() >= MAX_CHILDREN {
            return Err(ContainerError::truncated("too many child elements"));
        }
        let element = element_at(src, pos, parent.end)?;
        if element.unknown_size {
            return Err(ContainerError::truncated(format!(
                "element {:#x} has unknown size inside a sized parent",
                element.id
            )));
        }
        elements.push(element);
        pos = element.end;
    }

    Ok(elements)
}

fn clipped_error(elements: &[Element]) -> ParseResult<()> {
    match elements.iter().find(|e| e.clipped) {
        Some(e) => Err(ContainerError::truncated(format!(
            "element {:#x} extends past its parent",
            e.id
        ))),
        None => Ok(()),
    }
}

fn payload<R: Read + Seek>(src: &mut Source<R>, element: &Element) -> ParseResult<Vec<u8>> {
    src.read_at(element.data, element.end - element.data)
}

fn read_uint(data: &[u8]) -> ParseResult<u64> {
    if data.len() > 8 {
        return Err(ContainerError::truncated("integer element wider than 8 bytes"));
    }
    Ok(data.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

fn read_float(data: &[u8]) -> ParseResult<f64> {
    match data.len() {
        0 => Ok(0.0),
        4 => Ok(f32::from_be_bytes([data[0], data[1], data[2], data[3]]) as f64),
        8 => Ok(f64::from_be_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ])),
        n => Err(ContainerError::truncated(format!("float element of {n} bytes"))),
    }
}

fn read_string(data: &[u8]) -> String {
    let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Whether an EBML header in `head` declares the `webm` DocType.
pub(super) fn sniff_webm(head: &[u8]) -> bool {
    head.windows(7)
        .any(|w| w[0] == 0x42 && w[1] == 0x82 && w[2] == 0x84 && &w[3..7] == b"webm")
}

pub(super) fn parse<R: Read + Seek>(
    src: &mut Source<R>,
    details: &mut MediaDetails,
) -> ParseResult<()> {
    let file = Element {
        id: 0,
        data: 0,
        end: src.len(),
        clipped: false,
        unknown_size: false,
    };

    let header = element_at(src, 0, file.end)?;
    if header.id != EBML || header.unknown_size {
        return Err(ContainerError::truncated("malformed EBML header"));
    }
    for element in children(src, &header)? {
        if element.id == DOC_TYPE {
            let doc_type = read_string(&payload(src, &element)?);
            details.format = if doc_type == "webm" { "webm" } else { "matroska" }.into();
        }
    }

    // Skip anything before the segment, e.g. Void elements
    let mut pos = header.end;
    let segment = loop {
        if pos >= file.end {
            return Err(ContainerError::truncated("no Segment element"));
        }
        let element = element_at(src, pos, file.end)?;
        if element.id == SEGMENT {
            break element;
        }
        if element.unknown_size {
            return Err(ContainerError::truncated("unknown-size element before Segment"));
        }
        pos = element.end;
    };

    let (saw_info, saw_tracks) = parse_segment(src, &segment, details)?;
    if !saw_tracks {
        return Err(ContainerError::truncated("no Tracks element"));
    }
    if !saw_info {
        return Err(ContainerError::truncated("no Info element"));
    }
    if segment.clipped {
        return Err(ContainerError::truncated("Segment extends past end of file"));
    }
    Ok(())
}

/// Walk top-level segment children until Info and Tracks have been read.
fn parse_segment<R: Read + Seek>(
    src: &mut Source<R>,
    segment: &Element,
    details: &mut MediaDetails,
) -> ParseResult<(bool, bool)> {
    let mut saw_info = false;
    let mut saw_tracks = false;
    let mut pos = segment.data;
    let mut visited = 0;

    while pos < segment.end && visited < MAX_CHILDREN && !(saw_info && saw_tracks) {
        visited += 1;
        let element = element_at(src, pos, segment.end)?;

        match element.id {
            INFO => {
                parse_info(src, &element, details)?;
                saw_info = true;
            }
            TRACKS => {
                parse_tracks(src, &element, details)?;
                saw_tracks = true;
            }
            CLUSTER if element.unknown_size => break,
            _ if element.unknown_size => {
                return Err(ContainerError::truncated(format!(
                    "unknown-size element {:#x} in Segment",
                    element.id
                )));
            }
            _ => {}
        }
        clipped_error(&[element])?;
        pos = element.end;
    }

    Ok((saw_info, saw_tracks))
}

fn parse_info<R: Read + Seek>(
    src: &mut Source<R>,
    info: &Element,
    details: &mut MediaDetails,
) -> ParseResult<()> {
    let elements = children(src, info)?;
    let mut scale = DEFAULT_TIMESTAMP_SCALE;
    let mut duration = None;

    for element in &elements {
        match element.id {
            TIMESTAMP_SCALE => scale = read_uint(&payload(src, element)?)?,
            DURATION => duration = Some(read_float(&payload(src, element)?)?),
            _ => {}
        }
    }

    if let Some(ticks) = duration {
        details.duration = ticks * scale as f64 / 1e9;
    }
    clipped_error(&elements)
}

fn parse_tracks<R: Read + Seek>(
    src: &mut Source<R>,
    tracks: &Element,
    details: &mut MediaDetails,
) -> ParseResult<()> {
    let elements = children(src, tracks)?;

    for entry in elements.iter().filter(|e| e.id == TRACK_ENTRY) {
        let mut track = Track {
            kind: TrackKind::Other,
            codec: Default::default(),
            width: 0,
            height: 0,
        };
        let result = parse_track_entry(src, entry, &mut track);
        details.tracks.push(track);
        result?;
    }

    clipped_error(&elements)
}

fn parse_track_entry<R: Read + Seek>(
    src: &mut Source<R>,
    entry: &Element,
    track: &mut Track,
) -> ParseResult<()> {
    let elements = children(src, entry)?;

    for element in &elements {
        match element.id {
            TRACK_TYPE => {
                track.kind = match read_uint(&payload(src, element)?)? {
                    1 => TrackKind::Video,
                    2 => TrackKind::Audio,
                    _ => TrackKind::Other,
                }
            }
            CODEC_ID => track.codec = codec_name(&read_string(&payload(src, element)?)).into(),
            VIDEO => {
                let video = children(src, element)?;
                for field in &video {
                    match field.id {
                        PIXEL_WIDTH => track.width = clamp_u32(read_uint(&payload(src, field)?)?),
                        PIXEL_HEIGHT => track.height = clamp_u32(read_uint(&payload(src, field)?)?),
                        _ => {}
                    }
                }
                clipped_error(&video)?;
            }
            _ => {}
        }
    }

    if track.kind != TrackKind::Video {
        track.width = 0;
        track.height = 0;
    }
    clipped_error(&elements)
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

/// Map a Matroska CodecID to a codec tag.
fn codec_name(codec_id: &str) -> String {
    let name = match codec_id {
        "V_MPEG4/ISO/AVC" => "h264",
        "V_MPEGH/ISO/HEVC" => "hevc",
        "V_AV1" => "av1",
        "V_VP8" => "vp8",
        "V_VP9" => "vp9",
        "V_MPEG2" => "mpeg2video",
        "A_AC3" => "ac3",
        "A_EAC3" => "eac3",
        "A_TRUEHD" => "truehd",
        "A_FLAC" => "flac",
        "A_VORBIS" => "vorbis",
        "A_OPUS" => "opus",
        "A_MPEG/L3" => "mp3",
        id if id.starts_with("A_AAC") => "aac",
        id if id.starts_with("A_DTS") => "dts",
        id => {
            let stripped = id
                .strip_prefix("V_")
                .or_else(|| id.strip_prefix("A_"))
                .or_else(|| id.strip_prefix("S_"))
                .unwrap_or(id);
            return stripped.to_ascii_lowercase();
        }
    };
    name.to_string()
}
