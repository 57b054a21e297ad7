//! Wire shapes - runtime descriptions of encoded values
//!
//! A [`WireShape`] names the layout of a payload without a Rust type for it:
//!
//! ```text
//! u8 i8 u16 i16 u32 i32 u64 i64 f32 f64 bool string bytes timestamp duration
//! option<T>  seq<T>  map<K,V>  record<T,...>  union<T,...>
//! ```
//!
//! Shapes drive the dynamic decoder ([`WireShape::decode`]) used to inspect
//! payloads, and render the canonical signature text that contract checksums
//! are computed from ([`OperationSignature::checksum`]).

use crate::error::MarshalError;
use crate::ffi::marshal::{self, Marshal};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Layout of an encoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireShape {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Bool,
    String,
    Bytes,
    Timestamp,
    Duration,
    Optional(Box<WireShape>),
    Sequence(Box<WireShape>),
    Map(Box<WireShape>, Box<WireShape>),
    /// Fields in wire order
    Record(Vec<WireShape>),
    /// Variant payloads; variant `n` has discriminant `n + 1`
    Union(Vec<WireShape>),
}

/// Shape text parse failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeParseError {
    #[error("unexpected end of shape")]
    UnexpectedEnd,

    #[error("unexpected '{found}' at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },

    #[error("unknown wire type '{0}'")]
    UnknownType(String),

    #[error("{name} takes {expected} type argument(s), got {found}")]
    Arity {
        name: &'static str,
        expected: usize,
        found: usize,
    },
}

impl FromStr for WireShape {
    type Err = ShapeParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parser = ShapeParser { text, pos: 0 };
        let shape = parser.shape()?;
        parser.skip_whitespace();
        match parser.peek() {
            None => Ok(shape),
            Some(found) => Err(ShapeParseError::UnexpectedChar {
                found,
                offset: parser.pos,
            }),
        }
    }
}

struct ShapeParser<'a> {
    text: &'a str,
    pos: usize,
}

impl ShapeParser<'_> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn expect(&mut self, want: char) -> Result<(), ShapeParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(c) if c == want => {
                self.pos += c.len_utf8();
                Ok(())
            }
            Some(found) => Err(ShapeParseError::UnexpectedChar {
                found,
                offset: self.pos,
            }),
            None => Err(ShapeParseError::UnexpectedEnd),
        }
    }

    fn ident(&mut self) -> Result<&str, ShapeParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            self.pos += 1;
        }
        if start == self.pos {
            return match self.peek() {
                Some(found) => Err(ShapeParseError::UnexpectedChar {
                    found,
                    offset: self.pos,
                }),
                None => Err(ShapeParseError::UnexpectedEnd),
            };
        }
        Ok(&self.text[start..self.pos])
    }

    /// `<T, ...>`, possibly empty
    fn arguments(&mut self) -> Result<Vec<WireShape>, ShapeParseError> {
        self.expect('<')?;
        let mut args = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some('>') {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.shape()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('>') => {
                    self.pos += 1;
                    return Ok(args);
                }
                Some(found) => {
                    return Err(ShapeParseError::UnexpectedChar {
                        found,
                        offset: self.pos,
                    })
                }
                None => return Err(ShapeParseError::UnexpectedEnd),
            }
        }
    }

    fn shape(&mut self) -> Result<WireShape, ShapeParseError> {
        let name = self.ident()?.to_string();
        let shape = match name.as_str() {
            "u8" => WireShape::U8,
            "i8" => WireShape::I8,
            "u16" => WireShape::U16,
            "i16" => WireShape::I16,
            "u32" => WireShape::U32,
            "i32" => WireShape::I32,
            "u64" => WireShape::U64,
            "i64" => WireShape::I64,
            "f32" => WireShape::F32,
            "f64" => WireShape::F64,
            "bool" => WireShape::Bool,
            "string" => WireShape::String,
            "bytes" => WireShape::Bytes,
            "timestamp" => WireShape::Timestamp,
            "duration" => WireShape::Duration,
            "option" => {
                let [inner] = exactly::<1>("option", self.arguments()?)?;
                WireShape::Optional(Box::new(inner))
            }
            "seq" => {
                let [inner] = exactly::<1>("seq", self.arguments()?)?;
                WireShape::Sequence(Box::new(inner))
            }
            "map" => {
                let [key, value] = exactly::<2>("map", self.arguments()?)?;
                WireShape::Map(Box::new(key), Box::new(value))
            }
            "record" => WireShape::Record(self.arguments()?),
            "union" => WireShape::Union(self.arguments()?),
            _ => return Err(ShapeParseError::UnknownType(name)),
        };
        Ok(shape)
    }
}

fn exactly<const N: usize>(name: &'static str, args: Vec<WireShape>) -> Result<[WireShape; N], ShapeParseError> {
    let found = args.len();
    args.try_into().map_err(|_| ShapeParseError::Arity {
        name,
        expected: N,
        found,
    })
}

/// Canonical text, accepted back by `FromStr`.
impl fmt::Display for WireShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireShape::U8 => f.write_str("u8"),
            WireShape::I8 => f.write_str("i8"),
            WireShape::U16 => f.write_str("u16"),
            WireShape::I16 => f.write_str("i16"),
            WireShape::U32 => f.write_str("u32"),
            WireShape::I32 => f.write_str("i32"),
            WireShape::U64 => f.write_str("u64"),
            WireShape::I64 => f.write_str("i64"),
            WireShape::F32 => f.write_str("f32"),
            WireShape::F64 => f.write_str("f64"),
            WireShape::Bool => f.write_str("bool"),
            WireShape::String => f.write_str("string"),
            WireShape::Bytes => f.write_str("bytes"),
            WireShape::Timestamp => f.write_str("timestamp"),
            WireShape::Duration => f.write_str("duration"),
            WireShape::Optional(inner) => write!(f, "option<{}>", inner),
            WireShape::Sequence(inner) => write!(f, "seq<{}>", inner),
            WireShape::Map(key, value) => write!(f, "map<{},{}>", key, value),
            WireShape::Record(fields) => write!(f, "record<{}>", join(fields)),
            WireShape::Union(variants) => write!(f, "union<{}>", join(variants)),
        }
    }
}

fn join(shapes: &[WireShape]) -> String {
    shapes.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

/// A decoded value, shaped by a [`WireShape`].
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(SystemTime),
    Duration(Duration),
    Optional(Option<Box<WireValue>>),
    Sequence(Vec<WireValue>),
    Map(Vec<(WireValue, WireValue)>),
    Record(Vec<WireValue>),
    Union { discriminant: i32, payload: Box<WireValue> },
}

impl WireShape {
    /// Decode a whole payload, rejecting trailing bytes.
    pub fn decode(&self, bytes: &[u8]) -> Result<WireValue, MarshalError> {
        let mut cursor = bytes;
        let value = self.read(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(MarshalError::TrailingBytes(cursor.len()));
        }
        Ok(value)
    }

    /// Decode one value and advance the cursor past it.
    pub fn read(&self, buf: &mut &[u8]) -> Result<WireValue, MarshalError> {
        Ok(match self {
            WireShape::U8 => WireValue::U8(u8::read(buf)?),
            WireShape::I8 => WireValue::I8(i8::read(buf)?),
            WireShape::U16 => WireValue::U16(u16::read(buf)?),
            WireShape::I16 => WireValue::I16(i16::read(buf)?),
            WireShape::U32 => WireValue::U32(u32::read(buf)?),
            WireShape::I32 => WireValue::I32(i32::read(buf)?),
            WireShape::U64 => WireValue::U64(u64::read(buf)?),
            WireShape::I64 => WireValue::I64(i64::read(buf)?),
            WireShape::F32 => WireValue::F32(f32::read(buf)?),
            WireShape::F64 => WireValue::F64(f64::read(buf)?),
            WireShape::Bool => WireValue::Bool(bool::read(buf)?),
            WireShape::String => WireValue::String(String::read(buf)?),
            WireShape::Bytes => WireValue::Bytes(Vec::<u8>::read(buf)?),
            WireShape::Timestamp => WireValue::Timestamp(SystemTime::read(buf)?),
            WireShape::Duration => WireValue::Duration(Duration::read(buf)?),
            WireShape::Optional(inner) => match i8::read(buf)? {
                0 => WireValue::Optional(None),
                1 => WireValue::Optional(Some(Box::new(inner.read(buf)?))),
                flag => return Err(MarshalError::InvalidPresenceFlag(flag)),
            },
            WireShape::Sequence(inner) => {
                let count = marshal::read_length(buf)?;
                let mut items = Vec::with_capacity(count.min(buf.len()));
                for _ in 0..count {
                    items.push(inner.read(buf)?);
                }
                WireValue::Sequence(items)
            }
            WireShape::Map(key, value) => {
                let count = marshal::read_length(buf)?;
                let mut entries = Vec::with_capacity(count.min(buf.len()));
                for _ in 0..count {
                    let k = key.read(buf)?;
                    let v = value.read(buf)?;
                    entries.push((k, v));
                }
                WireValue::Map(entries)
            }
            WireShape::Record(fields) => {
                WireValue::Record(fields.iter().map(|field| field.read(buf)).collect::<Result<_, _>>()?)
            }
            WireShape::Union(variants) => {
                let count = i32::try_from(variants.len()).unwrap_or(i32::MAX);
                let discriminant = marshal::read_discriminant(buf, "union", count)?;
                let payload = variants[(discriminant - 1) as usize].read(buf)?;
                WireValue::Union {
                    discriminant,
                    payload: Box::new(payload),
                }
            }
        })
    }
}

impl WireValue {
    /// Encode the value in wire order.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<(), MarshalError> {
        match self {
            WireValue::U8(v) => v.write(buf),
            WireValue::I8(v) => v.write(buf),
            WireValue::U16(v) => v.write(buf),
            WireValue::I16(v) => v.write(buf),
            WireValue::U32(v) => v.write(buf),
            WireValue::I32(v) => v.write(buf),
            WireValue::U64(v) => v.write(buf),
            WireValue::I64(v) => v.write(buf),
            WireValue::F32(v) => v.write(buf),
            WireValue::F64(v) => v.write(buf),
            WireValue::Bool(v) => v.write(buf),
            WireValue::String(v) => v.write(buf),
            WireValue::Bytes(v) => v.write(buf),
            WireValue::Timestamp(v) => v.write(buf),
            WireValue::Duration(v) => v.write(buf),
            WireValue::Optional(None) => 0i8.write(buf),
            WireValue::Optional(Some(inner)) => {
                1i8.write(buf)?;
                inner.write(buf)
            }
            WireValue::Sequence(items) => {
                marshal::write_length(buf, items.len(), "sequence")?;
                items.iter().try_for_each(|item| item.write(buf))
            }
            WireValue::Map(entries) => {
                marshal::write_length(buf, entries.len(), "map")?;
                entries.iter().try_for_each(|(k, v)| {
                    k.write(buf)?;
                    v.write(buf)
                })
            }
            WireValue::Record(fields) => fields.iter().try_for_each(|field| field.write(buf)),
            WireValue::Union { discriminant, payload } => {
                discriminant.write(buf)?;
                payload.write(buf)
            }
        }
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireValue::U8(v) => write!(f, "{}", v),
            WireValue::I8(v) => write!(f, "{}", v),
            WireValue::U16(v) => write!(f, "{}", v),
            WireValue::I16(v) => write!(f, "{}", v),
            WireValue::U32(v) => write!(f, "{}", v),
            WireValue::I32(v) => write!(f, "{}", v),
            WireValue::U64(v) => write!(f, "{}", v),
            WireValue::I64(v) => write!(f, "{}", v),
            WireValue::F32(v) => write!(f, "{}", v),
            WireValue::F64(v) => write!(f, "{}", v),
            WireValue::Bool(v) => write!(f, "{}", v),
            WireValue::String(v) => write!(f, "{:?}", v),
            WireValue::Bytes(v) => {
                f.write_str("0x")?;
                v.iter().try_for_each(|b| write!(f, "{:02x}", b))
            }
            WireValue::Timestamp(t) => match t.duration_since(UNIX_EPOCH) {
                Ok(d) => write!(f, "@{}.{:09}", d.as_secs(), d.subsec_nanos()),
                Err(e) => {
                    let d = e.duration();
                    write!(f, "@-{}.{:09}", d.as_secs(), d.subsec_nanos())
                }
            },
            WireValue::Duration(d) => write!(f, "{:?}", d),
            WireValue::Optional(None) => f.write_str("none"),
            WireValue::Optional(Some(inner)) => write!(f, "some({})", inner),
            WireValue::Sequence(items) => {
                f.write_str("[")?;
                write_list(f, items.iter())?;
                f.write_str("]")
            }
            WireValue::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            WireValue::Record(fields) => {
                f.write_str("(")?;
                write_list(f, fields.iter())?;
                f.write_str(")")
            }
            WireValue::Union { discriminant, payload } => write!(f, "#{} {}", discriminant, payload),
        }
    }
}

fn write_list<'a>(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = &'a WireValue>) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Signature of one exposed operation or callback method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSignature {
    pub name: String,
    pub params: Vec<WireShape>,
    pub returns: Option<WireShape>,
    pub throws: Option<WireShape>,
}

impl OperationSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: None,
            throws: None,
        }
    }

    pub fn param(mut self, shape: WireShape) -> Self {
        self.params.push(shape);
        self
    }

    pub fn returns(mut self, shape: WireShape) -> Self {
        self.returns = Some(shape);
        self
    }

    pub fn throws(mut self, shape: WireShape) -> Self {
        self.throws = Some(shape);
        self
    }

    /// `name(p1,p2)->ret!err`, omitting absent parts
    pub fn canonical(&self) -> String {
        let mut text = format!("{}({})", self.name, join(&self.params));
        if let Some(returns) = &self.returns {
            text.push_str("->");
            text.push_str(&returns.to_string());
        }
        if let Some(throws) = &self.throws {
            text.push('!');
            text.push_str(&throws.to_string());
        }
        text
    }

    /// Contract token: first two bytes of the SHA-256 of the canonical text,
    /// big-endian.
    pub fn checksum(&self) -> u16 {
        let digest = Sha256::digest(self.canonical().as_bytes());
        u16::from_be_bytes([digest[0], digest[1]])
    }
}

impl fmt::Display for OperationSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}
