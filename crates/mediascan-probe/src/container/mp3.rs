//! MPEG audio frame headers, Xing/VBRI frame counts and CBR estimation.

use std::io::{Read, Seek};

use super::source::{Source, be_u32};
use crate::error::{ContainerError, ParseResult};
use crate::media::{MediaDetails, Track};

const SYNC_WINDOW: u64 = 64 * 1024;
const ID3V1_LEN: u64 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Version {
    V1,
    V2,
    V25,
}

/// Decoded MPEG audio frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct FrameHeader {
    pub version: Version,
    pub layer: u8,
    /// kbit/s
    pub bitrate: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub mono: bool,
}

const BITRATES_V1: [[u32; 14]; 3] = [
    [32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    [32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    [32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
];
const BITRATES_V2_L1: [u32; 14] = [32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256];
const BITRATES_V2_L23: [u32; 14] = [8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

impl FrameHeader {
    /// Decode four header bytes; `None` for anything reserved or free-format.
    pub(super) fn parse(h: [u8; 4]) -> Option<Self> {
        if h[0] != 0xFF || h[1] & 0xE0 != 0xE0 {
            return None;
        }
        let version = match (h[1] >> 3) & 0b11 {
            0 => Version::V25,
            2 => Version::V2,
            3 => Version::V1,
            _ => return None,
        };
        let layer = match (h[1] >> 1) & 0b11 {
            1 => 3,
            2 => 2,
            3 => 1,
            _ => return None,
        };

        let index = (h[2] >> 4) as usize;
        if index == 0 || index == 15 {
            return None;
        }
        let bitrate = match version {
            Version::V1 => BITRATES_V1[layer as usize - 1][index - 1],
            _ if layer == 1 => BITRATES_V2_L1[index - 1],
            _ => BITRATES_V2_L23[index - 1],
        };

        let base_rate = match (h[2] >> 2) & 0b11 {
            0 => 44_100,
            1 => 48_000,
            2 => 32_000,
            _ => return None,
        };
        let sample_rate = match version {
            Version::V1 => base_rate,
            Version::V2 => base_rate / 2,
            Version::V25 => base_rate / 4,
        };

        Some(Self {
            version,
            layer,
            bitrate,
            sample_rate,
            padding: (h[2] >> 1) & 1 == 1,
            mono: h[3] >> 6 == 0b11,
        })
    }

    pub(super) fn samples_per_frame(&self) -> u32 {
        match (self.layer, self.version) {
            (1, _) => 384,
            (2, _) | (3, Version::V1) => 1152,
            _ => 576,
        }
    }

    /// Frame length in bytes, header included.
    pub(super) fn frame_len(&self) -> u32 {
        let pad = self.padding as u32;
        let bits_per_second = self.bitrate * 1000;
        if self.layer == 1 {
            (12 * bits_per_second / self.sample_rate + pad) * 4
        } else {
            self.samples_per_frame() / 8 * bits_per_second / self.sample_rate + pad
        }
    }

    /// Offset of a Xing/Info header from the frame start.
    fn xing_offset(&self) -> usize {
        4 + match (self.version, self.mono) {
            (Version::V1, false) => 32,
            (Version::V1, true) => 17,
            (_, false) => 17,
            (_, true) => 9,
        }
    }

    fn codec(&self) -> &'static str {
        match self.layer {
            1 => "mp1",
            2 => "mp2",
            _ => "mp3",
        }
    }
}

/// Size of a leading ID3v2 tag, or 0.
fn id3v2_len(head: &[u8]) -> u64 {
    if head.len() < 10 || !head.starts_with(b"ID3") {
        return 0;
    }
    // syncsafe: 7 bits per byte
    let size = head[6..10]
        .iter()
        .fold(0u64, |acc, b| (acc << 7) | (*b & 0x7F) as u64);
    let footer = if head[5] & 0x10 != 0 { 10 } else { 0 };
    10 + size + footer
}

/// Offset of the first frame whose successor (if in the window) is also valid.
fn find_frame(window: &[u8]) -> Option<(usize, FrameHeader)> {
    let header_at = |i: usize| -> Option<FrameHeader> {
        let h = window.get(i..i + 4)?;
        FrameHeader::parse([h[0], h[1], h[2], h[3]])
    };

    (0..window.len().saturating_sub(3)).find_map(|i| {
        let frame = header_at(i)?;
        let next = i + frame.frame_len() as usize;
        if next + 4 <= window.len() && header_at(next).is_none() {
            return None;
        }
        Some((i, frame))
    })
}

/// Frame count from a Xing/Info or VBRI header inside the first frame.
fn vbr_frames(frame: &FrameHeader, data: &[u8]) -> Option<u32> {
    let xing = frame.xing_offset();
    let tag = data.get(xing..xing + 4);
    if tag == Some(b"Xing".as_slice()) || tag == Some(b"Info".as_slice()) {
        let flags = be_u32(data, xing + 4).ok()?;
        return if flags & 1 != 0 {
            be_u32(data, xing + 8).ok()
        } else {
            None
        };
    }
    if data.get(36..40) == Some(b"VBRI".as_slice()) {
        return be_u32(data, 36 + 14).ok();
    }
    None
}

pub(super) fn parse<R: Read + Seek>(
    src: &mut Source<R>,
    details: &mut MediaDetails,
) -> ParseResult<()> {
    let len = src.len();
    let start = id3v2_len(&src.read_upto(0, 10)?);
    if start >= len {
        return Err(ContainerError::truncated("ID3 tag extends past end of file"));
    }

    let window = src.read_upto(start, SYNC_WINDOW)?;
    let Some((offset, frame)) = find_frame(&window) else {
        return Err(ContainerError::truncated("no MPEG audio frame found"));
    };
    details.tracks.push(Track::audio(frame.codec()));

    let frame_start = start + offset as u64;
    let first = src.read_upto(frame_start, 64)?;
    let samples = frame.samples_per_frame() as f64;
    let rate = frame.sample_rate as f64;

    details.duration = match vbr_frames(&frame, &first) {
        Some(frames) => frames as f64 * samples / rate,
        None => {
            let tail = src.read_upto(len.saturating_sub(ID3V1_LEN), 3)?;
            let trailer = if len >= frame_start + ID3V1_LEN && tail == b"TAG" {
                ID3V1_LEN
            } else {
                0
            };
            let audio_bytes = len - frame_start - trailer;
            audio_bytes as f64 * 8.0 / (frame.bitrate as f64 * 1000.0)
        }
    };
    Ok(())
}
