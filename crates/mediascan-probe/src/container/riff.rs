//! RIFF chunk walker for WAV and AVI.

use std::io::{Read, Seek};

use super::MAX_CHILDREN;
use super::source::{Source, bytes, fourcc_tag, le_u16, le_u32};
use crate::error::{ContainerError, ParseResult};
use crate::media::{MediaDetails, Track};

const RIFF_HEADER_LEN: u64 = 12;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

#[derive(Debug, Clone, Copy)]
struct Chunk {
    id: [u8; 4],
    data: u64,
    /// Declared payload size.
    size: u64,
}

impl Chunk {
    /// Offset of the next chunk; payloads are padded to even length.
    fn next(&self) -> u64 {
        self.data + self.size + (self.size & 1)
    }
}

fn chunks<R: Read + Seek>(src: &mut Source<R>, start: u64, end: u64) -> ParseResult<Vec<Chunk>> {
    let mut found = Vec::new();
    let mut pos = start;

    while pos + 8 <= end && found.len() < MAX_CHILDREN {
        let head = src.read_at(pos, 8)?;
        let chunk = Chunk {
            id: bytes::<4>(&head, 0)?,
            data: pos + 8,
            size: le_u32(&head, 4)? as u64,
        };
        found.push(chunk);
        pos = chunk.next();
    }

    Ok(found)
}

/// Read a chunk payload, at most `max` bytes of it.
fn chunk_head<R: Read + Seek>(
    src: &mut Source<R>,
    chunk: &Chunk,
    max: u64,
) -> ParseResult<Vec<u8>> {
    src.read_at(chunk.data, chunk.size.min(max))
}

/// Codec tag for a WAVE format tag.
fn wave_codec(tag: u16, bits: u16) -> &'static str {
    match (tag, bits) {
        (1, 8) => "pcm_u8",
        (1, 24) => "pcm_s24le",
        (1, 32) => "pcm_s32le",
        (1, _) => "pcm_s16le",
        (3, 64) => "pcm_f64le",
        (3, _) => "pcm_f32le",
        (2, _) => "adpcm_ms",
        (6, _) => "pcm_alaw",
        (7, _) => "pcm_mulaw",
        (0x11, _) => "adpcm_ima_wav",
        (0x55, _) => "mp3",
        (0x2000, _) => "ac3",
        _ => "",
    }
}

/// Format tag and bit depth from a `WAVEFORMATEX` payload.
fn wave_format(fmt: &[u8]) -> ParseResult<(u16, u16)> {
    let mut tag = le_u16(fmt, 0)?;
    let bits = le_u16(fmt, 14).unwrap_or(0);
    if tag == WAVE_FORMAT_EXTENSIBLE {
        tag = le_u16(fmt, 24)?;
    }
    Ok((tag, bits))
}

pub(super) fn parse_wav<R: Read + Seek>(
    src: &mut Source<R>,
    details: &mut MediaDetails,
) -> ParseResult<()> {
    let len = src.len();
    let mut byte_rate = None;
    let mut data_size = None;

    for chunk in chunks(src, RIFF_HEADER_LEN, len)? {
        match &chunk.id {
            b"fmt " => {
                if chunk.size < 16 {
                    return Err(ContainerError::truncated("fmt chunk shorter than 16 bytes"));
                }
                let fmt = chunk_head(src, &chunk, 40)?;
                let (tag, bits) = wave_format(&fmt)?;
                details.tracks.push(Track::audio(wave_codec(tag, bits)));
                byte_rate = Some(le_u32(&fmt, 8)?);
            }
            // A short final chunk is common in interrupted recordings
            b"data" => data_size = Some(chunk.size.min(len.saturating_sub(chunk.data))),
            _ => {}
        }
        if byte_rate.is_some() && data_size.is_some() {
            break;
        }
    }

    let Some(byte_rate) = byte_rate else {
        return Err(ContainerError::truncated("no fmt chunk"));
    };
    let Some(data_size) = data_size else {
        return Err(ContainerError::truncated("no data chunk"));
    };
    if byte_rate > 0 {
        details.duration = data_size as f64 / byte_rate as f64;
    }
    Ok(())
}

/// Codec tag for an AVI video FourCC.
fn video_codec(fourcc: [u8; 4]) -> String {
    let upper = fourcc.map(|b| b.to_ascii_uppercase());
    let name = match &upper {
        b"H264" | b"X264" | b"AVC1" => "h264",
        b"HEVC" | b"H265" => "hevc",
        b"XVID" | b"DIVX" | b"DX50" | b"FMP4" | b"MP4V" => "mpeg4",
        b"DIV3" => "msmpeg4v3",
        b"MJPG" => "mjpeg",
        _ => return fourcc_tag(fourcc),
    };
    name.to_string()
}

pub(super) fn parse_avi<R: Read + Seek>(
    src: &mut Source<R>,
    details: &mut MediaDetails,
) -> ParseResult<()> {
    let len = src.len();
    let hdrl = chunks(src, RIFF_HEADER_LEN, len)?
        .into_iter()
        .find(|c| &c.id == b"LIST" && is_list(src, c, b"hdrl"));
    let Some(hdrl) = hdrl else {
        return Err(ContainerError::truncated("no hdrl list"));
    };
    let hdrl_end = hdrl.data + hdrl.size;
    if hdrl_end > len {
        return Err(ContainerError::truncated("hdrl list extends past end of file"));
    }

    let mut frame_dims = (0, 0);
    for chunk in chunks(src, hdrl.data + 4, hdrl_end)? {
        if &chunk.id == b"avih" {
            let avih = chunk_head(src, &chunk, 40)?;
            let micros_per_frame = le_u32(&avih, 0)? as f64;
            let frames = le_u32(&avih, 16)? as f64;
            details.duration = micros_per_frame * frames / 1e6;
            frame_dims = (le_u32(&avih, 32)?, le_u32(&avih, 36)?);
        } else if &chunk.id == b"LIST" && is_list(src, &chunk, b"strl") {
            parse_strl(src, &chunk, frame_dims, details)?;
        }
    }
    Ok(())
}

fn is_list<R: Read + Seek>(src: &mut Source<R>, chunk: &Chunk, kind: &[u8; 4]) -> bool {
    chunk.size >= 4
        && src
            .read_at(chunk.data, 4)
            .is_ok_and(|list_type| list_type.as_slice() == kind)
}

/// One stream list: `strh` gives the stream type, `strf` its format.
fn parse_strl<R: Read + Seek>(
    src: &mut Source<R>,
    strl: &Chunk,
    frame_dims: (u32, u32),
    details: &mut MediaDetails,
) -> ParseResult<()> {
    let mut stream_type = [0u8; 4];
    let mut handler = [0u8; 4];

    for chunk in chunks(src, strl.data + 4, strl.data + strl.size)? {
        match &chunk.id {
            b"strh" => {
                let strh = chunk_head(src, &chunk, 8)?;
                stream_type = bytes::<4>(&strh, 0)?;
                handler = bytes::<4>(&strh, 4)?;
            }
            b"strf" => {
                let strf = chunk_head(src, &chunk, 40)?;
                match &stream_type {
                    b"vids" => {
                        let compression = bytes::<4>(&strf, 16)?;
                        let fourcc = if compression == [0; 4] { handler } else { compression };
                        let (mut width, mut height) = frame_dims;
                        if width == 0 || height == 0 {
                            width = le_u32(&strf, 4)?;
                            height = (le_u32(&strf, 8)? as i32).unsigned_abs();
                        }
                        details.tracks.push(Track::video(video_codec(fourcc), width, height));
                    }
                    b"auds" => {
                        let (tag, bits) = wave_format(&strf)?;
                        details.tracks.push(Track::audio(wave_codec(tag, bits)));
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use std::io::Cursor;

    fn source(data: Vec<u8>) -> Source<Cursor<Vec<u8>>> {
        let len = data.len() as u64;
        Source::new(Cursor::new(data), len, 1 << 20)
    }

    #[test]
    fn test_wav_duration() {
        // 1 second of 16-bit stereo at 8 kHz
        let mut src = source(fixtures::wav(8_000, 2, 16, 32_000));
        let mut details = MediaDetails::new("wav");
        parse_wav(&mut src, &mut details).unwrap();
        assert_eq!(details.duration, 1.0);
        assert_eq!(details.primary().unwrap().codec, "pcm_s16le");
    }

    #[test]
    fn test_wav_short_data_chunk() {
        let mut data = fixtures::wav(8_000, 1, 8, 8_000);
        data.truncate(data.len() - 4_000);
        let mut src = source(data);
        let mut details = MediaDetails::new("wav");
        parse_wav(&mut src, &mut details).unwrap();
        assert_eq!(details.duration, 0.5);
        assert_eq!(details.primary().unwrap().codec, "pcm_u8");
    }

    #[test]
    fn test_wav_without_fmt() {
        let mut data = b"RIFF\x0c\0\0\0WAVEdata\0\0\0\0".to_vec();
        data.extend_from_slice(&[0; 4]);
        let mut src = source(data);
        let mut details = MediaDetails::new("wav");
        let result = parse_wav(&mut src, &mut details);
        assert!(matches!(result, Err(ContainerError::Truncated(_))));
    }

    #[test]
    fn test_avi_streams() {
        let mut src = source(fixtures::avi(*b"XVID", 720, 480, 40_000, 250));
        let mut details = MediaDetails::new("avi");
        parse_avi(&mut src, &mut details).unwrap();
        assert_eq!(details.duration, 10.0);
        let primary = details.primary().unwrap();
        assert_eq!(primary.codec, "mpeg4");
        assert_eq!((primary.width, primary.height), (720, 480));
        assert_eq!(details.tracks[1].codec, "mp3");
    }

    #[test]
    fn test_video_codec_names() {
        assert_eq!(video_codec(*b"divx"), "mpeg4");
        assert_eq!(video_codec(*b"H264"), "h264");
        assert_eq!(video_codec(*b"cvid"), "cvid");
    }
}
