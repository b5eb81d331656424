//! Native FLAC stream header.

use std::io::{Read, Seek};

use super::source::{Source, be_u64, bytes};
use crate::error::{ContainerError, ParseResult};
use crate::media::{MediaDetails, Track};

const STREAMINFO_LEN: u64 = 34;

/// Sample rate and total sample count from a STREAMINFO block payload.
pub(super) fn streaminfo(block: &[u8]) -> ParseResult<(u32, u64)> {
    // rate:20 channels:3 bits:5 total:36
    let packed = be_u64(block, 10)?;
    let rate = ((packed >> 44) & 0xF_FFFF) as u32;
    let total = packed & 0xF_FFFF_FFFF;
    Ok((rate, total))
}

pub(super) fn duration(rate: u32, total: u64) -> f64 {
    if rate == 0 {
        0.0
    } else {
        total as f64 / rate as f64
    }
}

pub(super) fn parse<R: Read + Seek>(
    src: &mut Source<R>,
    details: &mut MediaDetails,
) -> ParseResult<()> {
    details.tracks.push(Track::audio("flac"));

    let header = src.read_at(4, 4)?;
    let block_type = bytes::<1>(&header, 0)?[0] & 0x7F;
    if block_type != 0 {
        return Err(ContainerError::truncated("first metadata block is not STREAMINFO"));
    }

    let block = src.read_at(8, STREAMINFO_LEN)?;
    let (rate, total) = streaminfo(&block)?;
    details.duration = duration(rate, total);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use std::io::Cursor;

    #[test]
    fn test_streaminfo() {
        let data = fixtures::flac(44_100, 441_000);
        let len = data.len() as u64;
        let mut src = Source::new(Cursor::new(data), len, 1 << 20);
        let mut details = MediaDetails::new("flac");
        parse(&mut src, &mut details).unwrap();
        assert_eq!(details.duration, 10.0);
        assert_eq!(details.primary().unwrap().codec, "flac");
    }

    #[test]
    fn test_truncated_streaminfo_keeps_codec() {
        let mut data = fixtures::flac(48_000, 48_000);
        data.truncate(20);
        let len = data.len() as u64;
        let mut src = Source::new(Cursor::new(data), len, 1 << 20);
        let mut details = MediaDetails::new("flac");
        assert!(matches!(parse(&mut src, &mut details), Err(ContainerError::Truncated(_))));
        assert_eq!(details.primary().unwrap().codec, "flac");
    }
}
