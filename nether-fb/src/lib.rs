//! Nether-FB: lazy, zero-copy reader for Nethercore table-buffer files
//!
//! Scene files exported by the asset pipeline use a flatbuffers-style layout:
//! vtable-indirected tables, length-prefixed vectors and strings, and forward
//! offsets between them. This crate reads that layout directly out of an
//! immutable byte buffer. Nothing is copied or parsed up front; every accessor
//! bounds-checks exactly the bytes it touches.
//!
//! # Buffer Format
//!
//! ```text
//! 0x00: root table offset (u32)
//! 0x04: file identifier (4 bytes, optional)
//!
//! table:   i32 soffset to its vtable, then inline field data
//! vtable:  u16 vtable size, u16 table size, u16 per slot (0 = absent)
//! vector:  u32 length, then fixed-width elements
//! string:  u32 length, then UTF-8 bytes (trailing NUL not counted)
//! ```
//!
//! All multi-byte values use one byte order, declared by the schema.
//!
//! # Layers
//!
//! - [`open_root`], [`Table`], [`Vector`], [`StringView`], [`StructView`]:
//!   the reader core. Lazy, never logs, never panics on bad input.
//! - [`schema`]: TOML schema files mapping field names to slots and types.
//! - [`decode`]: walks a root table through a schema, field by field.
//! - [`verify`]: optional eager pass that reports every problem at once.
//! - [`builder`]: writer for conforming buffers (fixtures, tooling).
//! - [`scene`]: bundled scene schema and typed scene accessors.
//!
//! # Usage
//!
//! ```
//! use nether_fb::{open_root, Buffer, BufferBuilder};
//!
//! let mut builder = BufferBuilder::new();
//! let name = builder.create_string("crate");
//! let root = builder
//!     .table(|t| {
//!         t.add_scalar::<u32>(0, 7, 0);
//!         t.add_offset(1, name);
//!     })
//!     .unwrap();
//! let bytes = builder.finish(root, None);
//!
//! let buffer = Buffer::new(bytes);
//! let table = open_root(&buffer).unwrap();
//! assert_eq!(table.scalar::<u32>(0, 0), 7);
//! let text = table.string_field(1).unwrap().present().unwrap();
//! assert_eq!(text.to_str().unwrap(), "crate");
//! ```

mod buffer;
mod endian;
mod error;
mod string;
mod structs;
mod table;
mod vector;

pub mod builder;
pub mod decode;
pub mod scene;
pub mod schema;
pub mod verify;

pub use buffer::{
    Buffer, FILE_IDENTIFIER_LENGTH, RootOptions, SOFFSET_SIZE, UOFFSET_SIZE, VOFFSET_SIZE,
    open_root, open_root_with,
};
pub use builder::{BufferBuilder, BuildError, StructData, TableWriter, WipOffset};
pub use endian::{Endian, Scalar};
pub use error::{ErrorKind, Malformed, ReadError, ReadResult};
pub use string::StringView;
pub use structs::StructView;
pub use table::{Field, Table, VTABLE_HEADER_SIZE, VTable};
pub use vector::{LENGTH_PREFIX_SIZE, OFFSET_ELEMENT_WIDTH, Vector};
