//! Bounded random access over a file being probed.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{ContainerError, ParseResult};

/// Reader with a known length and a cap on any single element read.
pub(crate) struct Source<R> {
    reader: R,
    len: u64,
    max_element: u64,
}

impl<R: Read + Seek> Source<R> {
    pub(crate) fn new(reader: R, len: u64, max_element: u64) -> Self {
        Self {
            reader,
            len,
            max_element,
        }
    }

    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    /// Read exactly `size` bytes at `offset`.
    ///
    /// Reads past the end of the file or larger than the element cap are
    /// reported as truncation.
    pub(crate) fn read_at(&mut self, offset: u64, size: u64) -> ParseResult<Vec<u8>> {
        if size > self.max_element {
            return Err(ContainerError::truncated(format!(
                "element of {size} bytes at offset {offset} exceeds limit of {}",
                self.max_element
            )));
        }
        let end = offset
            .checked_add(size)
            .ok_or_else(|| ContainerError::truncated("element offset overflow"))?;
        if end > self.len {
            return Err(ContainerError::truncated(format!(
                "element at offset {offset} ends past end of file ({end} > {})",
                self.len
            )));
        }

        self.reader.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0u8; size as usize];
        self.reader.read_exact(&mut data)?;
        Ok(data)
    }

    /// Read up to `max` bytes at `offset`, stopping at end of file.
    pub(crate) fn read_upto(&mut self, offset: u64, max: u64) -> ParseResult<Vec<u8>> {
        if offset >= self.len {
            return Ok(Vec::new());
        }
        let size = max.min(self.len - offset);
        self.read_at(offset, size)
    }
}

/// Copy `N` bytes out of `data` at `at`.
pub(crate) fn bytes<const N: usize>(data: &[u8], at: usize) -> ParseResult<[u8; N]> {
    data.get(at..at + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            ContainerError::truncated(format!(
                "field at offset {at} outside {}-byte structure",
                data.len()
            ))
        })
}

pub(crate) fn be_u16(data: &[u8], at: usize) -> ParseResult<u16> {
    bytes(data, at).map(u16::from_be_bytes)
}

pub(crate) fn be_u32(data: &[u8], at: usize) -> ParseResult<u32> {
    bytes(data, at).map(u32::from_be_bytes)
}

pub(crate) fn be_u64(data: &[u8], at: usize) -> ParseResult<u64> {
    bytes(data, at).map(u64::from_be_bytes)
}

pub(crate) fn le_u16(data: &[u8], at: usize) -> ParseResult<u16> {
    bytes(data, at).map(u16::from_le_bytes)
}

pub(crate) fn le_u32(data: &[u8], at: usize) -> ParseResult<u32> {
    bytes(data, at).map(u32::from_le_bytes)
}

pub(crate) fn le_i64(data: &[u8], at: usize) -> ParseResult<i64> {
    bytes(data, at).map(i64::from_le_bytes)
}

/// Lowercase a four-character code, dropping padding and non-printables.
pub(crate) fn fourcc_tag(code: [u8; 4]) -> String {
    code.iter()
        .filter(|b| b.is_ascii_graphic())
        .map(|b| b.to_ascii_lowercase() as char)
        .collect()
}
