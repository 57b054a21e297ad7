//! Wire codec - managed values ↔ big-endian byte stream
//!
//! Every value crossing the boundary inside a [`TransferBuffer`] is encoded
//! with this format:
//! - fixed-width integers and floats: big-endian, native width
//! - `bool`: one signed byte, 0 = false, nonzero = true
//! - strings and byte sequences: `i32` length, then the raw bytes
//! - sequences: `i32` element count, then each element
//! - maps: `i32` entry count, then key/value pairs
//! - optionals: one presence byte (0 = absent, 1 = present), then the value
//! - records: fields in declaration order, no tags
//! - tagged unions: `i32` discriminant (1-based), then the variant payload
//! - flat errors: `u32` discriminant (1-based), then a message string
//!
//! A top-level [`decode`] must consume the whole input; leftover bytes are a
//! corrupt payload.
//!
//! User types implement [`Marshal`] with [`marshal_record!`](crate::marshal_record),
//! [`marshal_enum!`](crate::marshal_enum), [`marshal_flat_error!`](crate::marshal_flat_error)
//! and [`marshal_newtype!`](crate::marshal_newtype).

use crate::error::{Fault, MarshalError};
use crate::ffi::buffer::{self, OwnedBuffer};
use crate::ffi::native::NativeRuntime;
use crate::ffi::types::TransferBuffer;
use bytes::{Buf, BufMut};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A value with a wire encoding.
///
/// `read` consumes exactly the bytes `write` produced and advances the cursor
/// past them.
pub trait Marshal: Sized {
    fn write(&self, buf: &mut Vec<u8>) -> Result<(), MarshalError>;

    fn read(buf: &mut &[u8]) -> Result<Self, MarshalError>;
}

/// Encode a value into a fresh byte vector
pub fn encode<T: Marshal>(value: &T) -> Result<Vec<u8>, MarshalError> {
    let mut buf = Vec::new();
    value.write(&mut buf)?;
    Ok(buf)
}

/// Decode a top-level value, rejecting unread trailing bytes
pub fn decode<T: Marshal>(bytes: &[u8]) -> Result<T, MarshalError> {
    let mut cursor = bytes;
    let value = T::read(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(MarshalError::TrailingBytes(cursor.len()));
    }
    Ok(value)
}

/// Encode a value into a native-allocated buffer.
///
/// Ownership of the returned buffer passes to the native entry point it is
/// handed to.
pub fn lower<T: Marshal>(native: &dyn NativeRuntime, value: &T) -> Result<TransferBuffer, Fault> {
    let bytes = encode(value)?;
    buffer::buffer_from_bytes(native, &bytes)
}

/// Decode a native-returned buffer and release it.
///
/// The buffer is released whether or not decoding succeeds.
///
/// # Safety
///
/// `buffer` must have been allocated by `native`, must not have been released,
/// and ownership passes to this call.
pub unsafe fn lift<T: Marshal>(native: &dyn NativeRuntime, buffer: TransferBuffer) -> Result<T, Fault> {
    let owned = OwnedBuffer::from_raw(native, buffer);
    Ok(decode(owned.as_slice())?)
}

fn ensure_remaining(buf: &&[u8], needed: usize) -> Result<(), MarshalError> {
    if buf.remaining() < needed {
        return Err(MarshalError::UnexpectedEof {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// Write a 32-bit length prefix.
pub fn write_length(buf: &mut Vec<u8>, len: usize, what: &'static str) -> Result<(), MarshalError> {
    let len = i32::try_from(len).map_err(|_| MarshalError::LengthOverflow { what, len })?;
    buf.put_i32(len);
    Ok(())
}

/// Read a 32-bit length prefix.
pub fn read_length(buf: &mut &[u8]) -> Result<usize, MarshalError> {
    let len = i32::read(buf)?;
    usize::try_from(len).map_err(|_| MarshalError::NegativeLength(len))
}

/// Read `len` raw bytes
fn read_bytes<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8], MarshalError> {
    ensure_remaining(buf, len)?;
    let bytes: &'a [u8] = *buf;
    let (head, tail) = bytes.split_at(len);
    *buf = tail;
    Ok(head)
}

/// Read a discriminant and reject anything outside `1..=variants`.
pub fn read_discriminant(buf: &mut &[u8], type_name: &'static str, variants: i32) -> Result<i32, MarshalError> {
    let value = i32::read(buf)?;
    if value < 1 || value > variants {
        return Err(MarshalError::UnknownDiscriminant {
            type_name,
            value: value.into(),
        });
    }
    Ok(value)
}

macro_rules! impl_marshal_for_scalar {
    ($($ty:ty => $put:ident, $get:ident;)*) => {
        $(
            impl Marshal for $ty {
                fn write(&self, buf: &mut Vec<u8>) -> Result<(), MarshalError> {
                    buf.$put(*self);
                    Ok(())
                }

                fn read(buf: &mut &[u8]) -> Result<Self, MarshalError> {
                    ensure_remaining(buf, std::mem::size_of::<$ty>())?;
                    Ok(buf.$get())
                }
            }
        )*
    };
}

impl_marshal_for_scalar! {
    u8 => put_u8, get_u8;
    i8 => put_i8, get_i8;
    u16 => put_u16, get_u16;
    i16 => put_i16, get_i16;
    u32 => put_u32, get_u32;
    i32 => put_i32, get_i32;
    u64 => put_u64, get_u64;
    i64 => put_i64, get_i64;
    f32 => put_f32, get_f32;
    f64 => put_f64, get_f64;
}

impl Marshal for bool {
    fn write(&self, buf: &mut Vec<u8>) -> Result<(), MarshalError> {
        buf.put_i8(i8::from(*self));
        Ok(())
    }

    fn read(buf: &mut &[u8]) -> Result<Self, MarshalError> {
        Ok(i8::read(buf)? != 0)
    }
}

impl Marshal for () {
    fn write(&self, _buf: &mut Vec<u8>) -> Result<(), MarshalError> {
        Ok(())
    }

    fn read(_buf: &mut &[u8]) -> Result<Self, MarshalError> {
        Ok(())
    }
}

impl Marshal for String {
    fn write(&self, buf: &mut Vec<u8>) -> Result<(), MarshalError> {
        write_length(buf, self.len(), "string")?;
        buf.put_slice(self.as_bytes());
        Ok(())
    }

    fn read(buf: &mut &[u8]) -> Result<Self, MarshalError> {
        let len = read_length(buf)?;
        let bytes = read_bytes(buf, len)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

/// Byte sequences share the generic sequence encoding: a count of one-byte
/// elements is the byte length.
impl<T: Marshal> Marshal for Vec<T> {
    fn write(&self, buf: &mut Vec<u8>) -> Result<(), MarshalError> {
        write_length(buf, self.len(), "sequence")?;
        for item in self {
            item.write(buf)?;
        }
        Ok(())
    }

    fn read(buf: &mut &[u8]) -> Result<Self, MarshalError> {
        let count = read_length(buf)?;
        // A corrupt count must not drive the allocation
        let mut items = Vec::with_capacity(count.min(buf.remaining()));
        for _ in 0..count {
            items.push(T::read(buf)?);
        }
        Ok(items)
    }
}

impl<T: Marshal> Marshal for Option<T> {
    fn write(&self, buf: &mut Vec<u8>) -> Result<(), MarshalError> {
        match self {
            None => buf.put_i8(0),
            Some(value) => {
                buf.put_i8(1);
                value.write(buf)?;
            }
        }
        Ok(())
    }

    fn read(buf: &mut &[u8]) -> Result<Self, MarshalError> {
        match i8::read(buf)? {
            0 => Ok(None),
            1 => Ok(Some(T::read(buf)?)),
            flag => Err(MarshalError::InvalidPresenceFlag(flag)),
        }
    }
}

impl<K, V> Marshal for HashMap<K, V>
where
    K: Marshal + Eq + Hash,
    V: Marshal,
{
    fn write(&self, buf: &mut Vec<u8>) -> Result<(), MarshalError> {
        write_length(buf, self.len(), "map")?;
        for (key, value) in self {
            key.write(buf)?;
            value.write(buf)?;
        }
        Ok(())
    }

    fn read(buf: &mut &[u8]) -> Result<Self, MarshalError> {
        let count = read_length(buf)?;
        let mut map = HashMap::with_capacity(count.min(buf.remaining()));
        for index in 0..count {
            let key = K::read(buf)?;
            let value = V::read(buf)?;
            if map.insert(key, value).is_some() {
                return Err(MarshalError::DuplicateMapKey { index });
            }
        }
        Ok(map)
    }
}

impl<K, V> Marshal for BTreeMap<K, V>
where
    K: Marshal + Ord,
    V: Marshal,
{
    fn write(&self, buf: &mut Vec<u8>) -> Result<(), MarshalError> {
        write_length(buf, self.len(), "map")?;
        for (key, value) in self {
            key.write(buf)?;
            value.write(buf)?;
        }
        Ok(())
    }

    fn read(buf: &mut &[u8]) -> Result<Self, MarshalError> {
        let count = read_length(buf)?;
        let mut map = BTreeMap::new();
        for index in 0..count {
            let key = K::read(buf)?;
            let value = V::read(buf)?;
            if map.insert(key, value).is_some() {
                return Err(MarshalError::DuplicateMapKey { index });
            }
        }
        Ok(map)
    }
}

impl Marshal for Duration {
    fn write(&self, buf: &mut Vec<u8>) -> Result<(), MarshalError> {
        buf.put_u64(self.as_secs());
        buf.put_u32(self.subsec_nanos());
        Ok(())
    }

    fn read(buf: &mut &[u8]) -> Result<Self, MarshalError> {
        let secs = u64::read(buf)?;
        let nanos = u32::read(buf)?;
        Duration::from_secs(secs)
            .checked_add(Duration::from_nanos(nanos.into()))
            .ok_or(MarshalError::TimestampOutOfRange)
    }
}

/// Seconds since the epoch (negative before it), then sub-second nanos.
impl Marshal for SystemTime {
    fn write(&self, buf: &mut Vec<u8>) -> Result<(), MarshalError> {
        let (secs, nanos) = match self.duration_since(UNIX_EPOCH) {
            Ok(after) => (
                i64::try_from(after.as_secs()).map_err(|_| MarshalError::TimestampOutOfRange)?,
                after.subsec_nanos(),
            ),
            Err(before) => {
                let before = before.duration();
                let secs = i64::try_from(before.as_secs()).map_err(|_| MarshalError::TimestampOutOfRange)?;
                (-secs, before.subsec_nanos())
            }
        };
        buf.put_i64(secs);
        buf.put_u32(nanos);
        Ok(())
    }

    fn read(buf: &mut &[u8]) -> Result<Self, MarshalError> {
        let secs = i64::read(buf)?;
        let nanos = u32::read(buf)?;
        let offset = Duration::from_secs(secs.unsigned_abs())
            .checked_add(Duration::from_nanos(nanos.into()))
            .ok_or(MarshalError::TimestampOutOfRange)?;
        let time = if secs >= 0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        };
        time.ok_or(MarshalError::TimestampOutOfRange)
    }
}

macro_rules! impl_marshal_for_tuple {
    ($(($($name:ident),+))*) => {
        $(
            #[allow(non_snake_case)]
            impl<$($name: Marshal),+> Marshal for ($($name,)+) {
                fn write(&self, buf: &mut Vec<u8>) -> Result<(), MarshalError> {
                    let ($($name,)+) = self;
                    $($name.write(buf)?;)+
                    Ok(())
                }

                fn read(buf: &mut &[u8]) -> Result<Self, MarshalError> {
                    Ok(($($name::read(buf)?,)+))
                }
            }
        )*
    };
}

impl_marshal_for_tuple! {
    (A)
    (A, B)
    (A, B, C)
    (A, B, C, D)
    (A, B, C, D, E)
    (A, B, C, D, E, F)
}

/// Implement [`Marshal`] for a struct, encoding the listed fields in order.
///
/// ```
/// use isthmus_runtime::marshal_record;
/// use isthmus_runtime::ffi::marshal::{decode, encode};
///
/// #[derive(Debug, PartialEq)]
/// struct Page {
///     limit: u32,
///     cursor: Option<String>,
/// }
/// marshal_record!(Page { limit, cursor });
///
/// let page = Page { limit: 10, cursor: None };
/// assert_eq!(encode(&page).unwrap(), vec![0, 0, 0, 10, 0]);
/// assert_eq!(decode::<Page>(&[0, 0, 0, 10, 0]).unwrap(), page);
/// ```
#[macro_export]
macro_rules! marshal_record {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::ffi::marshal::Marshal for $ty {
            fn write(&self, buf: &mut Vec<u8>) -> Result<(), $crate::error::MarshalError> {
                $($crate::ffi::marshal::Marshal::write(&self.$field, buf)?;)*
                Ok(())
            }

            fn read(buf: &mut &[u8]) -> Result<Self, $crate::error::MarshalError> {
                Ok(Self {
                    $($field: $crate::ffi::marshal::Marshal::read(buf)?,)*
                })
            }
        }
    };
}

/// Implement [`Marshal`] for an enum with explicit 1-based discriminants.
///
/// Variants are either unit variants or struct variants listing their fields
/// in wire order.
///
/// ```
/// use isthmus_runtime::marshal_enum;
/// use isthmus_runtime::ffi::marshal::{decode, encode};
///
/// #[derive(Debug, PartialEq)]
/// enum Clause {
///     Keys { keys: Vec<String> },
///     Any,
/// }
/// marshal_enum!(Clause {
///     1 => Keys { keys },
///     2 => Any,
/// });
///
/// assert_eq!(encode(&Clause::Any).unwrap(), vec![0, 0, 0, 2]);
/// assert_eq!(decode::<Clause>(&[0, 0, 0, 2]).unwrap(), Clause::Any);
/// ```
#[macro_export]
macro_rules! marshal_enum {
    ($ty:ident { $($disc:literal => $variant:ident $({ $($field:ident),* $(,)? })?),+ $(,)? }) => {
        impl $crate::ffi::marshal::Marshal for $ty {
            fn write(&self, buf: &mut Vec<u8>) -> Result<(), $crate::error::MarshalError> {
                match self {
                    $(
                        $ty::$variant $({ $($field),* })? => {
                            <i32 as $crate::ffi::marshal::Marshal>::write(&$disc, buf)?;
                            $($($crate::ffi::marshal::Marshal::write($field, buf)?;)*)?
                        }
                    )+
                }
                Ok(())
            }

            fn read(buf: &mut &[u8]) -> Result<Self, $crate::error::MarshalError> {
                match <i32 as $crate::ffi::marshal::Marshal>::read(buf)? {
                    $(
                        $disc => Ok($ty::$variant $({
                            $($field: $crate::ffi::marshal::Marshal::read(buf)?),*
                        })?),
                    )+
                    other => Err($crate::error::MarshalError::UnknownDiscriminant {
                        type_name: stringify!($ty),
                        value: other.into(),
                    }),
                }
            }
        }
    };
}

/// Implement [`Marshal`] for a flat error enum whose variants each carry a
/// message string.
///
/// ```
/// use isthmus_runtime::marshal_flat_error;
/// use isthmus_runtime::ffi::marshal::decode;
///
/// #[derive(Debug, PartialEq)]
/// enum ClientError {
///     Connection(String),
///     Parse(String),
/// }
/// marshal_flat_error!(ClientError {
///     1 => Connection,
///     2 => Parse,
/// });
///
/// let bytes = [0, 0, 0, 2, 0, 0, 0, 3, b'b', b'a', b'd'];
/// assert_eq!(decode::<ClientError>(&bytes).unwrap(), ClientError::Parse("bad".into()));
/// ```
#[macro_export]
macro_rules! marshal_flat_error {
    ($ty:ident { $($disc:literal => $variant:ident),+ $(,)? }) => {
        impl $crate::ffi::marshal::Marshal for $ty {
            fn write(&self, buf: &mut Vec<u8>) -> Result<(), $crate::error::MarshalError> {
                match self {
                    $(
                        $ty::$variant(message) => {
                            <u32 as $crate::ffi::marshal::Marshal>::write(&$disc, buf)?;
                            <String as $crate::ffi::marshal::Marshal>::write(message, buf)?;
                        }
                    )+
                }
                Ok(())
            }

            fn read(buf: &mut &[u8]) -> Result<Self, $crate::error::MarshalError> {
                let disc = <u32 as $crate::ffi::marshal::Marshal>::read(buf)?;
                let message = <String as $crate::ffi::marshal::Marshal>::read(buf)?;
                match disc {
                    $($disc => Ok($ty::$variant(message)),)+
                    other => Err($crate::error::MarshalError::UnknownDiscriminant {
                        type_name: stringify!($ty),
                        value: other.into(),
                    }),
                }
            }
        }
    };
}

/// Implement [`Marshal`] for a single-field tuple struct by delegating to the
/// wrapped type.
#[macro_export]
macro_rules! marshal_newtype {
    ($ty:ident($inner:ty)) => {
        impl $crate::ffi::marshal::Marshal for $ty {
            fn write(&self, buf: &mut Vec<u8>) -> Result<(), $crate::error::MarshalError> {
                <$inner as $crate::ffi::marshal::Marshal>::write(&self.0, buf)
            }

            fn read(buf: &mut &[u8]) -> Result<Self, $crate::error::MarshalError> {
                Ok($ty(<$inner as $crate::ffi::marshal::Marshal>::read(buf)?))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scalars_are_big_endian() {
        assert_eq!(encode(&0x0102u16).unwrap(), vec![1, 2]);
        assert_eq!(encode(&-2i32).unwrap(), vec![0xff, 0xff, 0xff, 0xfe]);
        assert_eq!(encode(&1.0f64).unwrap(), vec![0x3f, 0xf0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_bool_nonzero_is_true() {
        assert!(decode::<bool>(&[7]).unwrap());
        assert!(!decode::<bool>(&[0]).unwrap());
        assert_eq!(encode(&true).unwrap(), vec![1]);
    }

    #[test]
    fn test_short_read_is_eof() {
        assert_eq!(
            decode::<u32>(&[0, 0, 1]),
            Err(MarshalError::UnexpectedEof {
                needed: 4,
                remaining: 3
            })
        );
    }

    #[test]
    fn test_string_length_overflow() {
        let mut buf = Vec::new();
        let err = write_length(&mut buf, 1usize << 31, "string").unwrap_err();
        assert_eq!(
            err,
            MarshalError::LengthOverflow {
                what: "string",
                len: 1 << 31
            }
        );
        assert!(buf.is_empty());
        write_length(&mut buf, i32::MAX as usize, "string").unwrap();
        assert_eq!(buf, vec![0x7f, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_negative_length_rejected() {
        assert_eq!(
            decode::<String>(&[0xff, 0xff, 0xff, 0xff]),
            Err(MarshalError::NegativeLength(-1))
        );
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let err = decode::<String>(&[0, 0, 0, 2, 0xc3, 0x28]).unwrap_err();
        assert!(matches!(err, MarshalError::InvalidUtf8(_)));
    }

    #[test]
    fn test_corrupt_count_does_not_preallocate() {
        let err = decode::<Vec<u64>>(&[0x7f, 0xff, 0xff, 0xff, 0, 0]).unwrap_err();
        assert!(matches!(err, MarshalError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_read_discriminant_range() {
        let mut cursor: &[u8] = &[0, 0, 0, 3];
        assert_eq!(
            read_discriminant(&mut cursor, "Clause", 2),
            Err(MarshalError::UnknownDiscriminant {
                type_name: "Clause",
                value: 3
            })
        );
        let mut cursor: &[u8] = &[0, 0, 0, 2];
        assert_eq!(read_discriminant(&mut cursor, "Clause", 2), Ok(2));
    }

    #[test]
    fn test_timestamp_before_epoch() {
        let time = UNIX_EPOCH - Duration::new(5, 250);
        let bytes = encode(&time).unwrap();
        assert_eq!(&bytes[..8], &(-5i64).to_be_bytes());
        assert_eq!(&bytes[8..], &250u32.to_be_bytes());
        assert_eq!(decode::<SystemTime>(&bytes).unwrap(), time);
    }

    #[test]
    fn test_duration_layout() {
        let bytes = encode(&Duration::new(3, 7)).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0, 0, 3, 0, 0, 0, 7]);
    }

    #[test]
    fn test_tuple_fields_in_order() {
        let bytes = encode(&(1u8, true, String::from("a"))).unwrap();
        assert_eq!(bytes, vec![1, 1, 0, 0, 0, 1, b'a']);
    }

    #[derive(Debug, PartialEq)]
    struct FieldElement(String);
    marshal_newtype!(FieldElement(String));

    #[test]
    fn test_newtype_encodes_as_inner() {
        let felt = FieldElement("0x1".into());
        assert_eq!(encode(&felt).unwrap(), encode(&"0x1".to_string()).unwrap());
    }
}
