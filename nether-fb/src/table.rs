//! Vtable-indirected tables.
//!
//! # Layout
//! ```text
//! vtable:  u16 vtable size in bytes (4 + 2 * field count)
//!          u16 inline table size in bytes
//!          u16 field offset per slot, relative to the table start (0 = absent)
//! table:   i32 soffset, vtable = table - soffset
//!          inline field data
//! ```
//!
//! A slot past the vtable's field count reads as absent, which is how a
//! newer schema reads an older buffer without failing.

use crate::buffer::{Buffer, VOFFSET_SIZE};
use crate::endian::Scalar;
use crate::error::{ReadError, ReadResult};
use crate::string::StringView;
use crate::structs::StructView;
use crate::vector::Vector;

/// Vtable header size: vtable size + table size.
pub const VTABLE_HEADER_SIZE: usize = 2 * VOFFSET_SIZE;

/// A field as recorded by the writer: present, or left out of the vtable.
///
/// "Writer omitted this field" and "writer stored zero" are different
/// things, so absence is never folded into a default here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<T> {
    Present(T),
    Absent,
}

impl<T> Field<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Field::Present(_))
    }

    pub fn present(self) -> Option<T> {
        match self {
            Field::Present(value) => Some(value),
            Field::Absent => None,
        }
    }

    pub fn unwrap_or(self, default: T) -> T {
        self.present().unwrap_or(default)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Field::Present(value) => Field::Present(f(value)),
            Field::Absent => Field::Absent,
        }
    }

    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Field::Present(value) => Field::Present(value),
            Field::Absent => Field::Absent,
        }
    }

    /// Apply a fallible step to a present value.
    pub fn try_map<U>(self, f: impl FnOnce(T) -> ReadResult<U>) -> ReadResult<Field<U>> {
        match self {
            Field::Present(value) => f(value).map(Field::Present),
            Field::Absent => Ok(Field::Absent),
        }
    }
}

/// A table's vtable header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VTable {
    /// Absolute position of the vtable.
    pub position: usize,
    /// Vtable size in bytes, header included.
    pub size: u16,
    /// Inline size of the table the vtable describes.
    pub table_size: u16,
}

impl VTable {
    /// Number of slots the writer declared.
    pub fn field_count(&self) -> usize {
        (self.size as usize).saturating_sub(VTABLE_HEADER_SIZE) / VOFFSET_SIZE
    }

    fn entry_position(&self, slot: u16) -> usize {
        self.position + VTABLE_HEADER_SIZE + slot as usize * VOFFSET_SIZE
    }
}

/// View of one table instance.
#[derive(Debug, Clone)]
pub struct Table {
    buffer: Buffer,
    position: usize,
}

impl Table {
    /// View the table starting at `position`. Nothing is read yet.
    pub fn new(buffer: Buffer, position: usize) -> Self {
        Self { buffer, position }
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Locate and read the vtable header.
    pub fn vtable(&self) -> ReadResult<VTable> {
        let soffset = self.buffer.read::<i32>(self.position)?;
        let position = self.position as i64 - soffset as i64;
        let position = usize::try_from(position).map_err(|_| ReadError::OutOfBounds {
            // Negative positions are reported as the start of the buffer.
            offset: 0,
            width: VTABLE_HEADER_SIZE,
            len: self.buffer.len(),
        })?;

        let size = self.buffer.read::<u16>(position)?;
        let table_size = self.buffer.read::<u16>(position + VOFFSET_SIZE)?;
        Ok(VTable {
            position,
            size,
            table_size,
        })
    }

    /// Absolute position of a field's inline data.
    pub fn field_position(&self, slot: u16) -> ReadResult<Field<usize>> {
        let vtable = self.vtable()?;
        if slot as usize >= vtable.field_count() {
            return Ok(Field::Absent);
        }

        let entry = self.buffer.read::<u16>(vtable.entry_position(slot))?;
        if entry == 0 {
            return Ok(Field::Absent);
        }
        Ok(Field::Present(self.position + entry as usize))
    }

    /// Raw bytes of a field with the expected width.
    pub fn field(&self, slot: u16, width: usize) -> ReadResult<Field<&[u8]>> {
        match self.field_position(slot)? {
            Field::Present(position) => self.buffer.slice(position, width).map(Field::Present),
            Field::Absent => Ok(Field::Absent),
        }
    }

    /// Decode a scalar field, reporting absence and bounds errors.
    pub fn try_scalar<T: Scalar>(&self, slot: u16) -> ReadResult<Field<T>> {
        let endian = self.buffer.endian();
        Ok(self
            .field(slot, T::WIDTH)?
            .map(|bytes| endian.read::<T>(bytes)))
    }

    /// Decode a scalar field, falling back to `default` when it is absent.
    ///
    /// Never fails: a field that cannot be read also yields `default`. Use
    /// [`Table::try_scalar`] to see why.
    pub fn scalar<T: Scalar>(&self, slot: u16, default: T) -> T {
        match self.try_scalar(slot) {
            Ok(Field::Present(value)) => value,
            Ok(Field::Absent) | Err(_) => default,
        }
    }

    /// Follow an offset field: `field position + stored u32`.
    pub fn offset_field(&self, slot: u16) -> ReadResult<Field<usize>> {
        self.field_position(slot)?
            .try_map(|position| self.buffer.read_uoffset(position))
    }

    /// Nested table referenced by an offset field.
    pub fn table_field(&self, slot: u16) -> ReadResult<Field<Table>> {
        self.offset_field(slot)?
            .try_map(|position| Ok(Table::new(self.buffer.clone(), position)))
    }

    /// Vector referenced by an offset field.
    pub fn vector_field(&self, slot: u16, element_width: usize) -> ReadResult<Field<Vector>> {
        self.offset_field(slot)?
            .try_map(|position| Vector::resolve(&self.buffer, position, element_width))
    }

    /// String referenced by an offset field.
    pub fn string_field(&self, slot: u16) -> ReadResult<Field<StringView>> {
        self.offset_field(slot)?
            .try_map(|position| StringView::resolve(&self.buffer, position))
    }

    /// Struct stored inline in the table.
    pub fn struct_field(&self, slot: u16, size: usize) -> ReadResult<Field<StructView>> {
        self.field_position(slot)?
            .try_map(|position| StructView::resolve(&self.buffer, position, size))
    }

    /// True if the writer stored this slot.
    pub fn has_field(&self, slot: u16) -> bool {
        matches!(self.field_position(slot), Ok(Field::Present(_)))
    }
}
