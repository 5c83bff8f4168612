//! Reader error taxonomy.
//!
//! All reader failures are data errors on already-resident memory: nothing is
//! transient and nothing is worth retrying. The reader never logs; callers
//! decide whether a failure skips one field or aborts the dump.

use thiserror::Error;

/// Whole-buffer precondition that failed in [`crate::open_root`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Malformed {
    #[error("buffer is {len} bytes, too short for the 4-byte root offset")]
    TooShort { len: usize },

    #[error("root table offset {root} is outside the {len}-byte buffer")]
    RootOutOfBounds { root: usize, len: usize },

    #[error("file identifier {found:?} does not match expected {expected:?}")]
    IdentifierMismatch { expected: [u8; 4], found: [u8; 4] },
}

/// Error returned by table, vector and string accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    /// Root pointer or buffer-length precondition violated. Fatal to a dump.
    #[error("malformed buffer: {0}")]
    MalformedBuffer(#[from] Malformed),

    /// A computed position plus its read width runs past the buffer end.
    #[error("read of {width} bytes at offset {offset} exceeds buffer length {len}")]
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },

    /// Vector index at or past the stored length. A caller bug, not bad data.
    #[error("index {index} out of range for vector of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// String bytes at `offset` are not valid UTF-8.
    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },
}

/// Who is to blame for a [`ReadError`], for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The buffer contents are malformed.
    Data,
    /// The caller asked for something the buffer never promised.
    Usage,
}

impl ReadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReadError::IndexOutOfRange { .. } => ErrorKind::Usage,
            _ => ErrorKind::Data,
        }
    }

    /// True when the whole buffer is unusable, not just one field.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReadError::MalformedBuffer(_))
    }
}

/// Shorthand for reader results.
pub type ReadResult<T> = Result<T, ReadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_separates_usage_from_data() {
        let usage = ReadError::IndexOutOfRange { index: 3, len: 3 };
        let data = ReadError::OutOfBounds {
            offset: 10,
            width: 4,
            len: 12,
        };
        assert_eq!(usage.kind(), ErrorKind::Usage);
        assert_eq!(data.kind(), ErrorKind::Data);
        assert!(!data.is_fatal());
    }

    #[test]
    fn test_malformed_converts_and_displays() {
        let err: ReadError = Malformed::TooShort { len: 3 }.into();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "malformed buffer: buffer is 3 bytes, too short for the 4-byte root offset"
        );
    }
}
