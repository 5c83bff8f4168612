//! Scalar decoding with a schema-declared byte order.
//!
//! Every multi-byte integer in a buffer uses one byte order, declared by the
//! schema (little-endian unless stated otherwise). [`Scalar`] is implemented
//! for every primitive a table field, struct field or vector element can hold.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::Deserialize;

/// Byte order of all multi-byte values in a buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl Endian {
    /// Decode a scalar from the first `T::WIDTH` bytes of `bytes`.
    ///
    /// Callers guarantee `bytes.len() >= T::WIDTH`; the views in this crate
    /// bounds-check before calling.
    #[inline]
    pub fn read<T: Scalar>(self, bytes: &[u8]) -> T {
        match self {
            Endian::Little => T::read::<LittleEndian>(bytes),
            Endian::Big => T::read::<BigEndian>(bytes),
        }
    }

    /// Encode a scalar into the first `T::WIDTH` bytes of `out`.
    #[inline]
    pub fn write<T: Scalar>(self, value: T, out: &mut [u8]) {
        match self {
            Endian::Little => value.write::<LittleEndian>(out),
            Endian::Big => value.write::<BigEndian>(out),
        }
    }
}

/// Fixed-width primitive stored directly in a buffer.
pub trait Scalar: Copy + PartialEq + Send + Sync + 'static {
    /// Width in bytes.
    const WIDTH: usize;

    fn read<B: ByteOrder>(bytes: &[u8]) -> Self;

    fn write<B: ByteOrder>(self, out: &mut [u8]);
}

impl Scalar for u8 {
    const WIDTH: usize = 1;

    fn read<B: ByteOrder>(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn write<B: ByteOrder>(self, out: &mut [u8]) {
        out[0] = self;
    }
}

impl Scalar for i8 {
    const WIDTH: usize = 1;

    fn read<B: ByteOrder>(bytes: &[u8]) -> Self {
        bytes[0] as i8
    }

    fn write<B: ByteOrder>(self, out: &mut [u8]) {
        out[0] = self as u8;
    }
}

impl Scalar for bool {
    const WIDTH: usize = 1;

    fn read<B: ByteOrder>(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn write<B: ByteOrder>(self, out: &mut [u8]) {
        out[0] = self as u8;
    }
}

macro_rules! impl_scalar {
    ($($ty:ty => $read:ident, $write:ident;)*) => {
        $(
            impl Scalar for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn read<B: ByteOrder>(bytes: &[u8]) -> Self {
                    B::$read(bytes)
                }

                #[inline]
                fn write<B: ByteOrder>(self, out: &mut [u8]) {
                    B::$write(out, self)
                }
            }
        )*
    };
}

impl_scalar! {
    u16 => read_u16, write_u16;
    i16 => read_i16, write_i16;
    u32 => read_u32, write_u32;
    i32 => read_i32, write_i32;
    u64 => read_u64, write_u64;
    i64 => read_i64, write_i64;
    f32 => read_f32, write_f32;
    f64 => read_f64, write_f64;
}
