//! Shared immutable buffer handle and root-table lookup.
//!
//! # Layout
//! ```text
//! 0x00: root table offset (uoffset, u32)
//! 0x04: file identifier (4 bytes, optional)
//! ...:  vtables, tables, vectors and strings in any order
//! ```
//!
//! [`Buffer`] is a reference-counted handle, so every view can hold a clone
//! without copying data. The bytes are never mutated after construction,
//! which makes `Buffer` and all views safe to read from many threads at once.

use std::fmt;
use std::sync::Arc;

use crate::endian::{Endian, Scalar};
use crate::error::{Malformed, ReadError, ReadResult};
use crate::table::Table;

/// Width of an unsigned forward offset (root pointer, child references).
pub const UOFFSET_SIZE: usize = 4;

/// Width of the signed table-to-vtable offset.
pub const SOFFSET_SIZE: usize = 4;

/// Width of one vtable entry.
pub const VOFFSET_SIZE: usize = 2;

/// Width of the optional file identifier following the root offset.
pub const FILE_IDENTIFIER_LENGTH: usize = 4;

/// Immutable byte buffer shared by every view into it.
#[derive(Clone)]
pub struct Buffer {
    bytes: Arc<[u8]>,
    endian: Endian,
}

impl Buffer {
    /// Wrap little-endian bytes.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::with_endian(bytes, Endian::Little)
    }

    /// Wrap bytes written in the given byte order.
    pub fn with_endian(bytes: impl Into<Arc<[u8]>>, endian: Endian) -> Self {
        Self {
            bytes: bytes.into(),
            endian,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Borrow `width` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, width: usize) -> ReadResult<&[u8]> {
        let out_of_bounds = ReadError::OutOfBounds {
            offset,
            width,
            len: self.len(),
        };
        let end = offset.checked_add(width).ok_or(out_of_bounds)?;
        self.bytes.get(offset..end).ok_or(out_of_bounds)
    }

    /// Read a scalar at an absolute position.
    pub fn read<T: Scalar>(&self, offset: usize) -> ReadResult<T> {
        let bytes = self.slice(offset, T::WIDTH)?;
        Ok(self.endian.read(bytes))
    }

    /// Follow the uoffset stored at `offset` and return the absolute target.
    ///
    /// Every offset target starts with a 4-byte header (a table's soffset or
    /// a vector/string length), so the target must leave room for it.
    pub fn read_uoffset(&self, offset: usize) -> ReadResult<usize> {
        let relative = self.read::<u32>(offset)? as usize;
        let target = offset.saturating_add(relative);
        self.slice(target, UOFFSET_SIZE)?;
        Ok(target)
    }

    /// The 4 bytes after the root offset, if the buffer is long enough.
    pub fn identifier(&self) -> Option<[u8; FILE_IDENTIFIER_LENGTH]> {
        self.slice(UOFFSET_SIZE, FILE_IDENTIFIER_LENGTH)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
    }

    pub fn has_identifier(&self, expected: &[u8; FILE_IDENTIFIER_LENGTH]) -> bool {
        self.identifier().as_ref() == Some(expected)
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("endian", &self.endian)
            .finish()
    }
}

// =============================================================================
// Root lookup
// =============================================================================

/// Extra checks performed when opening the root table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RootOptions {
    /// Expected file identifier at bytes 4..8.
    pub identifier: Option<[u8; FILE_IDENTIFIER_LENGTH]>,
}

/// Resolve the root table.
///
/// Only the root pointer is checked; everything else is validated lazily
/// when read. Use [`crate::verify::open_root_strict`] for an eager pass.
pub fn open_root(buffer: &Buffer) -> ReadResult<Table> {
    open_root_with(buffer, &RootOptions::default())
}

/// Resolve the root table, also checking the file identifier if requested.
pub fn open_root_with(buffer: &Buffer, options: &RootOptions) -> ReadResult<Table> {
    let len = buffer.len();
    if len < UOFFSET_SIZE {
        return Err(Malformed::TooShort { len }.into());
    }

    let root = buffer.read::<u32>(0)? as usize;
    if root.saturating_add(SOFFSET_SIZE) > len {
        return Err(Malformed::RootOutOfBounds { root, len }.into());
    }

    if let Some(expected) = options.identifier {
        let found = buffer.identifier().unwrap_or_default();
        if found != expected {
            return Err(Malformed::IdentifierMismatch { expected, found }.into());
        }
    }

    Ok(Table::new(buffer.clone(), root))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_short_is_malformed() {
        let buffer = Buffer::new(vec![0u8; 3]);
        assert_eq!(
            open_root(&buffer).unwrap_err(),
            ReadError::MalformedBuffer(Malformed::TooShort { len: 3 })
        );
    }

    #[test]
    fn test_root_past_end_is_malformed() {
        let buffer = Buffer::new(vec![8, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            open_root(&buffer).unwrap_err(),
            ReadError::MalformedBuffer(Malformed::RootOutOfBounds { root: 8, len: 8 })
        );
    }

    #[test]
    fn test_root_is_not_validated_further() {
        // Root points at 4; the soffset there is garbage but open_root is lazy.
        let buffer = Buffer::new(vec![4, 0, 0, 0, 0xff, 0xff, 0xff, 0x7f]);
        let root = open_root(&buffer).unwrap();
        assert_eq!(root.position(), 4);
        assert!(root.vtable().is_err());
    }

    #[test]
    fn test_identifier_check() {
        let bytes = vec![8, 0, 0, 0, b'N', b'C', b'S', b'C', 0, 0, 0, 0];
        let buffer = Buffer::new(bytes);
        assert!(buffer.has_identifier(b"NCSC"));

        let ok = RootOptions {
            identifier: Some(*b"NCSC"),
        };
        assert!(open_root_with(&buffer, &ok).is_ok());

        let wrong = RootOptions {
            identifier: Some(*b"XXXX"),
        };
        assert!(matches!(
            open_root_with(&buffer, &wrong),
            Err(ReadError::MalformedBuffer(Malformed::IdentifierMismatch { .. }))
        ));
    }

    #[test]
    fn test_slice_overflow_is_out_of_bounds() {
        let buffer = Buffer::new(vec![0u8; 4]);
        assert!(matches!(
            buffer.slice(usize::MAX, 2),
            Err(ReadError::OutOfBounds { .. })
        ));
        assert!(buffer.slice(0, 4).is_ok());
        assert!(buffer.slice(1, 4).is_err());
    }

    #[test]
    fn test_uoffset_target_must_fit_header() {
        // uoffset at 0 -> 4, but only 2 bytes remain there.
        let buffer = Buffer::new(vec![4, 0, 0, 0, 1, 2]);
        assert!(matches!(
            buffer.read_uoffset(0),
            Err(ReadError::OutOfBounds { offset: 4, .. })
        ));
    }
}
