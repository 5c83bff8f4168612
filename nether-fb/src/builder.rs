//! Buffer writer.
//!
//! Writes the same layout the reader consumes. Data is written back to front:
//! children are created before the tables that reference them, so every
//! uoffset in the finished buffer points forward. Offsets handed out while
//! building ([`WipOffset`]) are distances from the end of the buffer, which
//! stay fixed as more data is prepended.
//!
//! ```
//! use nether_fb::BufferBuilder;
//!
//! let mut b = BufferBuilder::new();
//! let ids = b.create_vector(&[1u32, 2, 3]);
//! let root = b.table(|t| t.add_offset(0, ids)).unwrap();
//! let bytes = b.finish(root, Some(*b"NCSC"));
//! assert_eq!(&bytes[4..8], b"NCSC");
//! ```

use thiserror::Error;

use crate::buffer::{FILE_IDENTIFIER_LENGTH, SOFFSET_SIZE, UOFFSET_SIZE, VOFFSET_SIZE};
use crate::endian::{Endian, Scalar};
use crate::table::VTABLE_HEADER_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("table of {size} bytes exceeds the 16-bit vtable offset range")]
    TableTooLarge { size: usize },

    #[error("{count} slots do not fit in a 16-bit vtable")]
    TooManySlots { count: usize },

    #[error("{width} bytes at offset {offset} overflow a {size}-byte struct")]
    StructOverflow {
        offset: usize,
        width: usize,
        size: usize,
    },

    #[error("struct vector elements must all be {expected} bytes, found {found}")]
    StructSizeMismatch { expected: usize, found: usize },
}

/// Location of something already written, as a distance from the buffer end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WipOffset(usize);

/// Inline struct bytes, encoded in a fixed byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructData {
    endian: Endian,
    bytes: Vec<u8>,
}

impl StructData {
    /// Zeroed struct of `size` bytes.
    pub fn new(endian: Endian, size: usize) -> Self {
        Self {
            endian,
            bytes: vec![0; size],
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

    /// Store `value` at a byte offset.
    pub fn set<T: Scalar>(&mut self, offset: usize, value: T) -> Result<&mut Self, BuildError> {
        let size = self.bytes.len();
        let out = offset
            .checked_add(T::WIDTH)
            .and_then(|end| self.bytes.get_mut(offset..end))
            .ok_or(BuildError::StructOverflow {
                offset,
                width: T::WIDTH,
                size,
            })?;
        self.endian.write(value, out);
        Ok(self)
    }
}

/// Back-to-front buffer writer.
#[derive(Debug)]
pub struct BufferBuilder {
    /// Written data lives in `bytes[head..]`.
    bytes: Vec<u8>,
    head: usize,
    min_align: usize,
    endian: Endian,
    force_defaults: bool,
}

impl Default for BufferBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferBuilder {
    pub fn new() -> Self {
        Self::with_endian(Endian::Little)
    }

    pub fn with_endian(endian: Endian) -> Self {
        Self {
            bytes: Vec::new(),
            head: 0,
            min_align: 1,
            endian,
            force_defaults: false,
        }
    }

    /// Write scalar fields even when they equal their default.
    pub fn force_defaults(&mut self, force: bool) -> &mut Self {
        self.force_defaults = force;
        self
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.bytes.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zeroed struct in this builder's byte order.
    pub fn struct_data(&self, size: usize) -> StructData {
        StructData::new(self.endian, size)
    }

    // =========================================================================
    // Raw writes
    // =========================================================================

    fn reserve_front(&mut self, additional: usize) {
        if self.head >= additional {
            return;
        }
        let used = self.len();
        let capacity = (self.bytes.len() * 2).max(used + additional).max(64);
        let mut grown = vec![0u8; capacity];
        grown[capacity - used..].copy_from_slice(&self.bytes[self.head..]);
        self.head = capacity - used;
        self.bytes = grown;
    }

    fn pad(&mut self, count: usize) {
        self.reserve_front(count);
        self.head -= count;
        self.bytes[self.head..self.head + count].fill(0);
    }

    /// Pad so that after `additional` more bytes the written length is a
    /// multiple of `alignment`.
    fn align(&mut self, alignment: usize, additional: usize) {
        let alignment = alignment.max(1);
        self.min_align = self.min_align.max(alignment);
        let padding = (alignment - (self.len() + additional) % alignment) % alignment;
        self.pad(padding);
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.reserve_front(bytes.len());
        self.head -= bytes.len();
        self.bytes[self.head..self.head + bytes.len()].copy_from_slice(bytes);
    }

    fn push<T: Scalar>(&mut self, value: T) {
        self.reserve_front(T::WIDTH);
        self.head -= T::WIDTH;
        self.endian
            .write(value, &mut self.bytes[self.head..self.head + T::WIDTH]);
    }

    /// Write a uoffset to `target` at the current front.
    fn push_uoffset(&mut self, target: WipOffset) {
        self.align(UOFFSET_SIZE, 0);
        let relative = self.len() + UOFFSET_SIZE - target.0;
        self.push(relative as u32);
    }

    // =========================================================================
    // Strings and vectors
    // =========================================================================

    /// Length-prefixed string with a trailing NUL.
    pub fn create_string(&mut self, text: &str) -> WipOffset {
        self.align(UOFFSET_SIZE, text.len() + 1);
        self.push(0u8);
        self.push_bytes(text.as_bytes());
        self.push(text.len() as u32);
        WipOffset(self.len())
    }

    /// Vector of scalars, elements aligned to their width.
    pub fn create_vector<T: Scalar>(&mut self, items: &[T]) -> WipOffset {
        self.align(T::WIDTH.max(UOFFSET_SIZE), items.len() * T::WIDTH);
        for item in items.iter().rev() {
            self.push(*item);
        }
        self.push(items.len() as u32);
        WipOffset(self.len())
    }

    /// Vector of uoffsets to tables or strings.
    pub fn create_offset_vector(&mut self, items: &[WipOffset]) -> WipOffset {
        self.align(UOFFSET_SIZE, items.len() * UOFFSET_SIZE);
        for item in items.iter().rev() {
            self.push_uoffset(*item);
        }
        self.push(items.len() as u32);
        WipOffset(self.len())
    }

    pub fn create_string_vector(&mut self, items: &[&str]) -> WipOffset {
        let offsets: Vec<WipOffset> = items.iter().map(|s| self.create_string(s)).collect();
        self.create_offset_vector(&offsets)
    }

    /// Vector of inline structs, all of the same size.
    pub fn create_struct_vector(
        &mut self,
        items: &[StructData],
        alignment: usize,
    ) -> Result<WipOffset, BuildError> {
        let size = items.first().map_or(0, StructData::len);
        if let Some(other) = items.iter().find(|item| item.len() != size) {
            return Err(BuildError::StructSizeMismatch {
                expected: size,
                found: other.len(),
            });
        }

        self.align(alignment.max(UOFFSET_SIZE), items.len() * size);
        for item in items.iter().rev() {
            self.push_bytes(item.as_bytes());
        }
        self.push(items.len() as u32);
        Ok(WipOffset(self.len()))
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Write one table. Everything it references must already be written.
    ///
    /// On error the table's bytes are discarded and the builder is left as it
    /// was before the call.
    pub fn table<F>(&mut self, build: F) -> Result<WipOffset, BuildError>
    where
        F: FnOnce(&mut TableWriter<'_>),
    {
        let start = self.len();
        let mut writer = TableWriter {
            builder: &mut *self,
            fields: Vec::new(),
        };
        build(&mut writer);
        let fields = writer.fields;
        let result = self.end_table(start, &fields);
        if result.is_err() {
            self.truncate(start);
        }
        result
    }

    /// Drop everything written after the builder held `len` bytes.
    fn truncate(&mut self, len: usize) {
        self.head = self.bytes.len() - len;
    }

    fn end_table(&mut self, start: usize, fields: &[(u16, usize)]) -> Result<WipOffset, BuildError> {
        self.align(SOFFSET_SIZE, 0);
        self.push(0i32);
        let table_end = self.len();

        let table_size = table_end - start;
        if table_size > u16::MAX as usize {
            return Err(BuildError::TableTooLarge { size: table_size });
        }
        let count = fields
            .iter()
            .map(|(slot, _)| *slot as usize + 1)
            .max()
            .unwrap_or(0);
        let vtable_size = VTABLE_HEADER_SIZE + count * VOFFSET_SIZE;
        if vtable_size > u16::MAX as usize {
            return Err(BuildError::TooManySlots { count });
        }

        let mut entries = vec![0u16; count];
        for (slot, field_end) in fields {
            entries[*slot as usize] = (table_end - field_end) as u16;
        }
        for entry in entries.iter().rev() {
            self.push(*entry);
        }
        self.push(table_size as u16);
        self.push(vtable_size as u16);

        // The vtable sits before the table, so the soffset is positive.
        let soffset = (self.len() - table_end) as i32;
        let at = self.bytes.len() - table_end;
        self.endian
            .write(soffset, &mut self.bytes[at..at + SOFFSET_SIZE]);
        Ok(WipOffset(table_end))
    }

    /// Write the root offset (and identifier) and return the finished bytes.
    pub fn finish(
        mut self,
        root: WipOffset,
        identifier: Option<[u8; FILE_IDENTIFIER_LENGTH]>,
    ) -> Vec<u8> {
        let identifier_len = identifier.map_or(0, |_| FILE_IDENTIFIER_LENGTH);
        let alignment = self.min_align.max(UOFFSET_SIZE);
        self.align(alignment, UOFFSET_SIZE + identifier_len);
        if let Some(identifier) = identifier {
            self.push_bytes(&identifier);
        }
        self.push_uoffset(root);
        self.bytes.split_off(self.head)
    }
}

/// Field writer for one table, handed out by [`BufferBuilder::table`].
pub struct TableWriter<'b> {
    builder: &'b mut BufferBuilder,
    /// (slot, distance from end of the field's first byte)
    fields: Vec<(u16, usize)>,
}

impl TableWriter<'_> {
    /// Scalar field, left out when equal to `default`.
    pub fn add_scalar<T: Scalar>(&mut self, slot: u16, value: T, default: T) {
        if value == default && !self.builder.force_defaults {
            return;
        }
        self.add_scalar_always(slot, value);
    }

    pub fn add_scalar_always<T: Scalar>(&mut self, slot: u16, value: T) {
        self.builder.align(T::WIDTH, 0);
        self.builder.push(value);
        self.record(slot);
    }

    /// Offset field referencing a table, vector or string.
    pub fn add_offset(&mut self, slot: u16, target: WipOffset) {
        self.builder.push_uoffset(target);
        self.record(slot);
    }

    /// Struct stored inline in the table.
    pub fn add_struct(&mut self, slot: u16, data: &StructData, alignment: usize) {
        self.builder.align(alignment, data.len());
        self.builder.push_bytes(data.as_bytes());
        self.record(slot);
    }

    fn record(&mut self, slot: u16) {
        let at = self.builder.len();
        self.fields.retain(|(existing, _)| *existing != slot);
        self.fields.push((slot, at));
    }
}
