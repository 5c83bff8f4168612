//! Fixed-size inline structs.
//!
//! Structs have no vtable: every field sits at a fixed byte offset and is
//! always present. They appear inline in tables and in struct vectors.

use crate::buffer::Buffer;
use crate::endian::Scalar;
use crate::error::{ReadError, ReadResult};

/// View of one inline struct.
#[derive(Debug, Clone)]
pub struct StructView {
    buffer: Buffer,
    position: usize,
    size: usize,
}

impl StructView {
    /// View `size` bytes at `position`; the whole struct must be in bounds.
    pub fn resolve(buffer: &Buffer, position: usize, size: usize) -> ReadResult<Self> {
        buffer.slice(position, size)?;
        Ok(Self {
            buffer: buffer.clone(),
            position,
            size,
        })
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bytes(&self) -> ReadResult<&[u8]> {
        self.buffer.slice(self.position, self.size)
    }

    /// Scalar at a byte offset inside the struct.
    pub fn scalar<T: Scalar>(&self, offset: usize) -> ReadResult<T> {
        self.check_inside(offset, T::WIDTH)?;
        self.buffer.read::<T>(self.position + offset)
    }

    /// Nested struct at a byte offset inside this one.
    pub fn nested(&self, offset: usize, size: usize) -> ReadResult<StructView> {
        self.check_inside(offset, size)?;
        StructView::resolve(&self.buffer, self.position + offset, size)
    }

    fn check_inside(&self, offset: usize, width: usize) -> ReadResult<()> {
        match offset.checked_add(width) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(ReadError::OutOfBounds {
                offset: self.position.saturating_add(offset),
                width,
                len: self.buffer.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_at_fixed_offsets() {
        let mut bytes = Vec::new();
        for value in [1.0f32, 2.0, 3.0] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes.extend_from_slice(&7u32.to_le_bytes());
        let view = StructView::resolve(&Buffer::new(bytes), 0, 16).unwrap();

        assert_eq!(view.scalar::<f32>(4).unwrap(), 2.0);
        assert_eq!(view.scalar::<u32>(12).unwrap(), 7);
        let position = view.nested(0, 12).unwrap();
        assert_eq!(position.scalar::<f32>(8).unwrap(), 3.0);
    }

    #[test]
    fn test_reads_stay_inside_struct() {
        let view = StructView::resolve(&Buffer::new(vec![0u8; 16]), 0, 8).unwrap();
        assert!(view.scalar::<u32>(4).is_ok());
        assert!(view.scalar::<u32>(6).is_err());
        assert!(view.nested(4, 8).is_err());
    }

    #[test]
    fn test_struct_past_end() {
        assert!(StructView::resolve(&Buffer::new(vec![0u8; 10]), 4, 8).is_err());
    }
}
