//! Ogg page reader: codec from the first packet, duration from the last
//! granule position.

use std::io::{Read, Seek};

use super::flac;
use super::source::{Source, be_u16, bytes, le_i64, le_u16, le_u32};
use crate::error::{ContainerError, ParseResult};
use crate::media::{MediaDetails, Track, TrackKind};

const PAGE_HEADER_LEN: usize = 27;
const TAIL_WINDOW: u64 = 64 * 1024;
const OPUS_GRANULE_RATE: u32 = 48_000;

/// How granule positions convert to seconds for the first stream.
struct Timing {
    rate: u32,
    pre_skip: u64,
}

pub(super) fn parse<R: Read + Seek>(
    src: &mut Source<R>,
    details: &mut MediaDetails,
) -> ParseResult<()> {
    let head = src.read_upto(0, (PAGE_HEADER_LEN + 255) as u64)?;
    let segments = bytes::<1>(&head, 26)?[0] as usize;
    let table = head
        .get(PAGE_HEADER_LEN..PAGE_HEADER_LEN + segments)
        .ok_or_else(|| ContainerError::truncated("first page segment table cut short"))?;
    let serial = le_u32(&head, 14)?;

    // The first packet ends at the first lacing value below 255
    let mut packet_len = 0u64;
    for lacing in table {
        packet_len += *lacing as u64;
        if *lacing < 255 {
            break;
        }
    }
    let packet = src.read_at((PAGE_HEADER_LEN + segments) as u64, packet_len.min(64))?;

    let Some(timing) = identify(&packet, details)? else {
        return Ok(());
    };

    let tail_start = src.len().saturating_sub(TAIL_WINDOW);
    let tail = src.read_upto(tail_start, TAIL_WINDOW)?;
    match last_granule(&tail, serial) {
        Some(granule) if timing.rate > 0 => {
            let samples = granule.saturating_sub(timing.pre_skip);
            details.duration = samples as f64 / timing.rate as f64;
        }
        _ => {}
    }
    Ok(())
}

/// Push the track described by an identification packet.
///
/// Returns the granule timing when the codec's granule is a sample count.
fn identify(packet: &[u8], details: &mut MediaDetails) -> ParseResult<Option<Timing>> {
    if packet.starts_with(b"\x01vorbis") {
        details.tracks.push(Track::audio("vorbis"));
        let rate = le_u32(packet, 12)?;
        return Ok(Some(Timing { rate, pre_skip: 0 }));
    }
    if packet.starts_with(b"OpusHead") {
        details.tracks.push(Track::audio("opus"));
        let pre_skip = le_u16(packet, 10)? as u64;
        return Ok(Some(Timing {
            rate: OPUS_GRANULE_RATE,
            pre_skip,
        }));
    }
    if packet.starts_with(b"\x7fFLAC") {
        details.tracks.push(Track::audio("flac"));
        // mapping header (13 bytes), then a native metadata block header
        let block = packet
            .get(17..)
            .ok_or_else(|| ContainerError::truncated("FLAC mapping header cut short"))?;
        let (rate, _) = flac::streaminfo(block)?;
        return Ok(Some(Timing { rate, pre_skip: 0 }));
    }
    if packet.starts_with(b"\x80theora") {
        let width = u24(packet, 14)?;
        let height = u24(packet, 17)?;
        details.tracks.push(Track::video("theora", width, height));
        return Ok(None);
    }

    details.tracks.push(Track {
        kind: TrackKind::Other,
        codec: Default::default(),
        width: 0,
        height: 0,
    });
    Ok(None)
}

fn u24(data: &[u8], at: usize) -> ParseResult<u32> {
    let high = be_u16(data, at)? as u32;
    let low = bytes::<1>(data, at + 2)?[0] as u32;
    Ok((high << 8) | low)
}

/// Granule position of the last complete page header for `serial`.
fn last_granule(tail: &[u8], serial: u32) -> Option<u64> {
    (0..tail.len().saturating_sub(PAGE_HEADER_LEN - 1))
        .rev()
        .filter(|&i| &tail[i..i + 4] == b"OggS")
        .filter(|&i| le_u32(tail, i + 14).is_ok_and(|s| s == serial))
        .filter_map(|i| le_i64(tail, i + 6).ok())
        .find(|granule| *granule >= 0)
        .map(|granule| granule as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use std::io::Cursor;

    fn run(data: Vec<u8>) -> MediaDetails {
        let len = data.len() as u64;
        let mut src = Source::new(Cursor::new(data), len, 1 << 20);
        let mut details = MediaDetails::new("ogg");
        parse(&mut src, &mut details).unwrap();
        details
    }

    #[test]
    fn test_vorbis_duration() {
        let details = run(fixtures::ogg_vorbis(44_100, 441_000));
        assert_eq!(details.primary().unwrap().codec, "vorbis");
        assert_eq!(details.duration, 10.0);
    }

    #[test]
    fn test_opus_pre_skip() {
        let details = run(fixtures::ogg_opus(312, 96_312));
        assert_eq!(details.primary().unwrap().codec, "opus");
        assert_eq!(details.duration, 2.0);
    }

    #[test]
    fn test_unknown_granule_is_skipped() {
        let mut tail = fixtures::ogg_page(7, 480, b"x");
        tail.extend_from_slice(&fixtures::ogg_page(7, -1, b"y"));
        tail.extend_from_slice(&fixtures::ogg_page(9, 999, b"z"));
        assert_eq!(last_granule(&tail, 7), Some(480));
        assert_eq!(last_granule(&tail, 9), Some(999));
        assert_eq!(last_granule(&tail, 1), None);
    }
}
