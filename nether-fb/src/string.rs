//! Length-prefixed strings.
//!
//! Same layout as a byte vector. Writers may or may not append a NUL after
//! the text; it is never part of the string.

use std::borrow::Cow;

use crate::buffer::Buffer;
use crate::error::{ReadError, ReadResult};
use crate::vector::LENGTH_PREFIX_SIZE;

/// View of one string.
#[derive(Debug, Clone)]
pub struct StringView {
    buffer: Buffer,
    position: usize,
    len: usize,
}

impl StringView {
    /// Read the length prefix at `offset`.
    pub fn resolve(buffer: &Buffer, offset: usize) -> ReadResult<Self> {
        let len = buffer.read::<u32>(offset)? as usize;
        Ok(Self {
            buffer: buffer.clone(),
            position: offset,
            len,
        })
    }

    /// Stored byte length.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// The stored bytes, exactly `len()` of them.
    pub fn bytes(&self) -> ReadResult<&[u8]> {
        self.buffer
            .slice(self.position + LENGTH_PREFIX_SIZE, self.len)
    }

    /// The stored bytes as UTF-8.
    pub fn to_str(&self) -> ReadResult<&str> {
        let bytes = self.bytes()?;
        std::str::from_utf8(bytes).map_err(|_| ReadError::InvalidUtf8 {
            offset: self.position,
        })
    }

    /// The stored bytes as UTF-8, replacing invalid sequences.
    pub fn to_string_lossy(&self) -> ReadResult<Cow<'_, str>> {
        Ok(String::from_utf8_lossy(self.bytes()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_at_zero(text: &[u8], trailing_nul: bool) -> Buffer {
        let mut bytes = (text.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(text);
        if trailing_nul {
            bytes.push(0);
        }
        Buffer::new(bytes)
    }

    #[test]
    fn test_length_ignores_trailing_nul() {
        for nul in [false, true] {
            let view = StringView::resolve(&string_at_zero(b"ok", nul), 0).unwrap();
            assert_eq!(view.len(), 2);
            assert_eq!(view.bytes().unwrap(), b"ok");
            assert_eq!(view.to_str().unwrap(), "ok");
        }
    }

    #[test]
    fn test_invalid_utf8() {
        let view = StringView::resolve(&string_at_zero(&[0xff, 0xfe], false), 0).unwrap();
        assert_eq!(
            view.to_str().unwrap_err(),
            ReadError::InvalidUtf8 { offset: 0 }
        );
        assert_eq!(view.to_string_lossy().unwrap(), "\u{fffd}\u{fffd}");
    }

    #[test]
    fn test_truncated_text() {
        let mut bytes = 10u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"short");
        let view = StringView::resolve(&Buffer::new(bytes), 0).unwrap();
        assert!(matches!(
            view.bytes(),
            Err(ReadError::OutOfBounds { offset: 4, width: 10, .. })
        ));
    }

    #[test]
    fn test_repeated_reads_are_identical() {
        let view = StringView::resolve(&string_at_zero(b"scene", true), 0).unwrap();
        let first = view.bytes().unwrap().to_vec();
        let second = view.bytes().unwrap().to_vec();
        assert_eq!(first, second);
    }
}
