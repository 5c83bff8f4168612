//! Length-prefixed vectors.
//!
//! # Layout
//! ```text
//! 0x00: length (u32, element count)
//! 0x04: element 0
//! 0x04 + width: element 1, ...
//! ```
//!
//! Elements are fixed-width: scalars, inline structs, or uoffsets to tables
//! and strings (width 4). Only the length prefix is read at resolve time;
//! every element access is bounds-checked on its own.

use crate::buffer::{Buffer, UOFFSET_SIZE};
use crate::endian::Scalar;
use crate::error::{ReadError, ReadResult};
use crate::string::StringView;
use crate::structs::StructView;
use crate::table::Table;

/// Width of the vector/string length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Element width of a vector of tables or strings.
pub const OFFSET_ELEMENT_WIDTH: usize = UOFFSET_SIZE;

/// View of one vector.
#[derive(Debug, Clone)]
pub struct Vector {
    buffer: Buffer,
    position: usize,
    len: usize,
    element_width: usize,
}

impl Vector {
    /// Read the length prefix at `offset`.
    pub fn resolve(buffer: &Buffer, offset: usize, element_width: usize) -> ReadResult<Self> {
        let len = buffer.read::<u32>(offset)? as usize;
        Ok(Self {
            buffer: buffer.clone(),
            position: offset,
            len,
            element_width,
        })
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Element count from the length prefix.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn element_width(&self) -> usize {
        self.element_width
    }

    /// Position of the length prefix.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Position of the first element.
    pub fn data_position(&self) -> usize {
        self.position + LENGTH_PREFIX_SIZE
    }

    /// Number of elements whose bytes lie inside the buffer.
    ///
    /// At most [`Vector::len`]; smaller when the length prefix claims more
    /// elements than the buffer holds.
    pub fn available(&self) -> usize {
        if self.element_width == 0 {
            return self.len;
        }
        let room = self.buffer.len().saturating_sub(self.data_position());
        (room / self.element_width).min(self.len)
    }

    /// Absolute position of element `index`.
    pub fn element_position(&self, index: usize) -> ReadResult<usize> {
        if index >= self.len {
            return Err(ReadError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        index
            .checked_mul(self.element_width)
            .and_then(|delta| self.data_position().checked_add(delta))
            .ok_or(ReadError::OutOfBounds {
                offset: usize::MAX,
                width: self.element_width,
                len: self.buffer.len(),
            })
    }

    /// Raw bytes of element `index`.
    pub fn at(&self, index: usize) -> ReadResult<&[u8]> {
        let position = self.element_position(index)?;
        self.buffer.slice(position, self.element_width)
    }

    /// Scalar element `index`.
    pub fn scalar_at<T: Scalar>(&self, index: usize) -> ReadResult<T> {
        let position = self.element_position(index)?;
        self.buffer.read::<T>(position)
    }

    /// Table referenced by element `index`.
    pub fn table_at(&self, index: usize) -> ReadResult<Table> {
        let position = self.element_position(index)?;
        let target = self.buffer.read_uoffset(position)?;
        Ok(Table::new(self.buffer.clone(), target))
    }

    /// String referenced by element `index`.
    pub fn string_at(&self, index: usize) -> ReadResult<StringView> {
        let position = self.element_position(index)?;
        let target = self.buffer.read_uoffset(position)?;
        StringView::resolve(&self.buffer, target)
    }

    /// Inline struct element `index`; the struct size is the element width.
    pub fn struct_at(&self, index: usize) -> ReadResult<StructView> {
        let position = self.element_position(index)?;
        StructView::resolve(&self.buffer, position, self.element_width)
    }

    /// The whole element run, checked against the buffer end.
    pub fn as_bytes(&self) -> ReadResult<&[u8]> {
        let width = self
            .len
            .checked_mul(self.element_width)
            .ok_or(ReadError::OutOfBounds {
                offset: self.data_position(),
                width: usize::MAX,
                len: self.buffer.len(),
            })?;
        self.buffer.slice(self.data_position(), width)
    }

    /// Raw bytes of every element in order.
    pub fn iter(&self) -> impl Iterator<Item = ReadResult<&[u8]>> + '_ {
        (0..self.len).map(move |index| self.at(index))
    }

    /// Every element decoded as `T`.
    pub fn scalars<T: Scalar>(&self) -> impl Iterator<Item = ReadResult<T>> + '_ {
        (0..self.len).map(move |index| self.scalar_at::<T>(index))
    }

    /// Every element followed as a table offset.
    pub fn tables(&self) -> impl Iterator<Item = ReadResult<Table>> + '_ {
        (0..self.len).map(move |index| self.table_at(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// u16 vector [10, 20, 30] at position 4.
    fn three_shorts() -> Buffer {
        let mut bytes = vec![0u8; 4];
        bytes.extend_from_slice(&3u32.to_le_bytes());
        for value in [10u16, 20, 30] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        Buffer::new(bytes)
    }

    #[test]
    fn test_indices_in_and_out_of_range() {
        let vector = Vector::resolve(&three_shorts(), 4, 2).unwrap();
        assert_eq!(vector.len(), 3);
        assert_eq!(vector.available(), 3);
        for (index, expected) in [10u16, 20, 30].into_iter().enumerate() {
            assert_eq!(vector.scalar_at::<u16>(index).unwrap(), expected);
        }
        for index in [3, 4] {
            assert_eq!(
                vector.at(index).unwrap_err(),
                ReadError::IndexOutOfRange { index, len: 3 }
            );
        }
    }

    #[test]
    fn test_truncated_run_fails_lazily() {
        let mut bytes = three_shorts().as_bytes().to_vec();
        bytes.truncate(bytes.len() - 2); // drop the last element
        let buffer = Buffer::new(bytes);

        let vector = Vector::resolve(&buffer, 4, 2).unwrap();
        assert_eq!(vector.len(), 3);
        assert_eq!(vector.scalar_at::<u16>(0).unwrap(), 10);
        assert_eq!(vector.scalar_at::<u16>(1).unwrap(), 20);
        assert!(matches!(
            vector.at(2),
            Err(ReadError::OutOfBounds { offset: 12, .. })
        ));
        assert!(vector.as_bytes().is_err());
        assert_eq!(vector.available(), 2);
    }

    #[test]
    fn test_oversized_length_prefix() {
        let mut bytes = three_shorts().as_bytes().to_vec();
        bytes[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        let buffer = Buffer::new(bytes);

        let vector = Vector::resolve(&buffer, 4, 2).unwrap();
        assert_eq!(vector.len(), u32::MAX as usize);
        assert_eq!(vector.available(), 3);
        assert_eq!(vector.scalar_at::<u16>(2).unwrap(), 30);
        assert!(matches!(
            vector.at(3),
            Err(ReadError::OutOfBounds { offset: 14, .. })
        ));
    }

    #[test]
    fn test_missing_length_prefix() {
        let buffer = Buffer::new(vec![0u8; 6]);
        assert!(matches!(
            Vector::resolve(&buffer, 4, 1),
            Err(ReadError::OutOfBounds { offset: 4, .. })
        ));
    }

    #[test]
    fn test_iterators() {
        let vector = Vector::resolve(&three_shorts(), 4, 2).unwrap();
        let values: Vec<u16> = vector.scalars::<u16>().map(Result::unwrap).collect();
        assert_eq!(values, vec![10, 20, 30]);
        assert_eq!(vector.iter().count(), 3);
        assert_eq!(vector.as_bytes().unwrap().len(), 6);
    }
}
