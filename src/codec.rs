//! Scalar codecs: the byte-level encode/decode of one value.
//!
//! Handles fixed-width integers of any width 1..=8 bytes (configurable endianness),
//! IEEE-754 floats, raw bytes, fixed and null-terminated strings, and the
//! variable-length integer encodings from [`crate::varint`]. User codecs plug in
//! through [`ScalarCodec`].

use std::fmt;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::stream::{position, read_exact, ReadSeek};
use crate::value::Value;
use crate::varint::VarIntEncoding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    /// Byte order of the host, used when neither field nor struct picks one.
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            Endian::Little
        } else {
            Endian::Big
        }
    }

    fn read_uint(self, buf: &[u8]) -> u64 {
        match self {
            Endian::Big => match buf.len() {
                1 => buf[0] as u64,
                2 => BigEndian::read_u16(buf) as u64,
                4 => BigEndian::read_u32(buf) as u64,
                8 => BigEndian::read_u64(buf),
                n => BigEndian::read_uint(buf, n),
            },
            Endian::Little => match buf.len() {
                1 => buf[0] as u64,
                2 => LittleEndian::read_u16(buf) as u64,
                4 => LittleEndian::read_u32(buf) as u64,
                8 => LittleEndian::read_u64(buf),
                n => LittleEndian::read_uint(buf, n),
            },
        }
    }

    fn write_uint(self, v: u64, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        match self {
            Endian::Big => match len {
                1 => buf[0] = v as u8,
                2 => BigEndian::write_u16(&mut buf, v as u16),
                4 => BigEndian::write_u32(&mut buf, v as u32),
                8 => BigEndian::write_u64(&mut buf, v),
                _ => BigEndian::write_uint(&mut buf, v, len),
            },
            Endian::Little => match len {
                1 => buf[0] = v as u8,
                2 => LittleEndian::write_u16(&mut buf, v as u16),
                4 => LittleEndian::write_u32(&mut buf, v as u32),
                8 => LittleEndian::write_u64(&mut buf, v),
                _ => LittleEndian::write_uint(&mut buf, v, len),
            },
        }
        buf
    }
}

/// Text encodings for `String`/`StringZ` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextEncoding {
    /// ISO 8859-1.
    #[default]
    Latin1,
    Ascii,
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl TextEncoding {
    /// Width of one code unit, and so of the string terminator.
    pub fn unit_size(self) -> usize {
        match self {
            TextEncoding::Utf16Le | TextEncoding::Utf16Be => 2,
            _ => 1,
        }
    }

    pub fn encode(self, text: &str) -> Result<Vec<u8>, String> {
        match self {
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| format!("{c:?} isn't in Latin-1")))
                .collect(),
            TextEncoding::Ascii => text
                .chars()
                .map(|c| {
                    if c.is_ascii() {
                        Ok(c as u8)
                    } else {
                        Err(format!("{c:?} isn't ASCII"))
                    }
                })
                .collect(),
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Utf16Le => {
                let mut out = Vec::with_capacity(text.len() * 2);
                for unit in text.encode_utf16() {
                    out.write_u16::<LittleEndian>(unit).map_err(|e| e.to_string())?;
                }
                Ok(out)
            }
            TextEncoding::Utf16Be => {
                let mut out = Vec::with_capacity(text.len() * 2);
                for unit in text.encode_utf16() {
                    out.write_u16::<BigEndian>(unit).map_err(|e| e.to_string())?;
                }
                Ok(out)
            }
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String, String> {
        match self {
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            TextEncoding::Ascii => {
                if let Some(b) = bytes.iter().find(|b| !b.is_ascii()) {
                    return Err(format!("byte {b:#04x} isn't ASCII"));
                }
                Ok(bytes.iter().map(|&b| char::from(b)).collect())
            }
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| e.to_string()),
            TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
                if bytes.len() % 2 != 0 {
                    return Err(format!("odd byte count {} for UTF-16", bytes.len()));
                }
                let mut units = Vec::with_capacity(bytes.len() / 2);
                let mut r = bytes;
                while !r.is_empty() {
                    let unit = if self == TextEncoding::Utf16Le {
                        r.read_u16::<LittleEndian>()
                    } else {
                        r.read_u16::<BigEndian>()
                    };
                    units.push(unit.map_err(|e| e.to_string())?);
                }
                String::from_utf16(&units).map_err(|e| e.to_string())
            }
        }
    }
}

/// Byte-level contract every field type bottoms out in.
///
/// `size` is the byte count the owning field resolved for this call (a literal size,
/// the value of a referenced field, or the size implied by a const), or `None` when
/// the codec must find its own length in the stream.
pub trait ScalarCodec: fmt::Debug + Send + Sync {
    /// Byte width known without looking at a value.
    fn static_size(&self) -> Option<usize> {
        None
    }

    fn decode(&self, stream: &mut dyn ReadSeek, size: Option<usize>) -> Result<Value>;

    fn encode(&self, value: &Value, size: Option<usize>) -> Result<Vec<u8>>;

    /// Encoded length of `value`, if it can be derived.
    fn encoded_size(&self, value: &Value) -> Option<usize> {
        self.static_size()
            .or_else(|| self.encode(value, None).ok().map(|b| b.len()))
    }

    /// Whether decoding needs a size from the owning field.
    fn needs_size(&self) -> bool {
        false
    }
}

/// Builtin scalar codecs. Endianness and text encoding left as `None` are filled in
/// from struct options when the owning schema is built.
#[derive(Debug, Clone)]
pub enum Scalar {
    Integer {
        size: usize,
        signed: bool,
        endian: Option<Endian>,
    },
    Float32 {
        endian: Option<Endian>,
    },
    Float64 {
        endian: Option<Endian>,
    },
    VarInt {
        encoding: VarIntEncoding,
        max_bytes: Option<usize>,
    },
    Bytes,
    /// Fixed-size string; too-short values are padded with `pad_byte` if set.
    String {
        encoding: Option<TextEncoding>,
        pad_byte: Option<u8>,
    },
    /// Null-terminated string; a size, if any, is the maximum including the terminator.
    StringZ {
        encoding: Option<TextEncoding>,
    },
    Custom(Arc<dyn ScalarCodec>),
}

impl Scalar {
    pub fn set_endian(&mut self, value: Endian) {
        match self {
            Scalar::Integer { endian, .. } | Scalar::Float32 { endian } | Scalar::Float64 { endian } => {
                *endian = Some(value)
            }
            _ => {}
        }
    }

    pub fn set_encoding(&mut self, value: TextEncoding) {
        match self {
            Scalar::String { encoding, .. } | Scalar::StringZ { encoding } => *encoding = Some(value),
            _ => {}
        }
    }

    pub(crate) fn set_pad_byte(&mut self, value: u8) -> bool {
        match self {
            Scalar::String { pad_byte, .. } => {
                *pad_byte = Some(value);
                true
            }
            _ => false,
        }
    }

    /// Fill in whatever the field didn't set explicitly.
    pub(crate) fn apply_defaults(&mut self, default_endian: Endian, default_encoding: TextEncoding) {
        match self {
            Scalar::Integer { endian, .. } | Scalar::Float32 { endian } | Scalar::Float64 { endian } => {
                endian.get_or_insert(default_endian);
            }
            Scalar::String { encoding, .. } | Scalar::StringZ { encoding } => {
                encoding.get_or_insert(default_encoding);
            }
            _ => {}
        }
    }

    fn text_encoding(encoding: &Option<TextEncoding>) -> TextEncoding {
        encoding.unwrap_or_default()
    }

    fn decode_int(stream: &mut dyn ReadSeek, size: usize, signed: bool, endian: Endian) -> Result<Value> {
        check_int_width(size)?;
        let buf = read_exact(stream, size)?;
        let raw = endian.read_uint(&buf);
        if !signed {
            return Ok(Value::UInt(raw));
        }
        let bits = size * 8;
        let value = if bits < 64 && raw & (1u64 << (bits - 1)) != 0 {
            (raw as i64) - (1i64 << bits)
        } else {
            raw as i64
        };
        Ok(Value::Int(value))
    }

    fn encode_int(value: &Value, size: usize, signed: bool, endian: Endian) -> Result<Vec<u8>> {
        check_int_width(size)?;
        let v = value
            .as_i128()
            .ok_or_else(|| Error::unserializable(None, format!("expected an integer, got {}", value.describe())))?;
        let bits = (size * 8) as u32;
        let (min, max) = if signed {
            (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
        } else {
            (0, (1i128 << bits) - 1)
        };
        if v < min || v > max {
            return Err(Error::ValueSize {
                field: None,
                size: Some(size),
                value: value.clone(),
            });
        }
        let mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
        Ok(endian.write_uint((v as i64 as u64) & mask, size))
    }

    fn decode_float(stream: &mut dyn ReadSeek, wide: bool, endian: Endian) -> Result<Value> {
        let buf = read_exact(stream, if wide { 8 } else { 4 })?;
        let mut r = buf.as_slice();
        let x = match (wide, endian) {
            (true, Endian::Big) => r.read_f64::<BigEndian>()?,
            (true, Endian::Little) => r.read_f64::<LittleEndian>()?,
            (false, Endian::Big) => f64::from(r.read_f32::<BigEndian>()?),
            (false, Endian::Little) => f64::from(r.read_f32::<LittleEndian>()?),
        };
        Ok(Value::Float(x))
    }

    fn encode_float(value: &Value, wide: bool, endian: Endian) -> Result<Vec<u8>> {
        let x = value
            .as_f64()
            .ok_or_else(|| Error::unserializable(None, format!("expected a number, got {}", value.describe())))?;
        let mut out = Vec::with_capacity(8);
        if wide {
            match endian {
                Endian::Big => out.write_f64::<BigEndian>(x)?,
                Endian::Little => out.write_f64::<LittleEndian>(x)?,
            }
        } else {
            let narrow = x as f32;
            if x.is_finite() && narrow.is_infinite() {
                return Err(Error::ValueSize {
                    field: None,
                    size: Some(4),
                    value: value.clone(),
                });
            }
            match endian {
                Endian::Big => out.write_f32::<BigEndian>(narrow)?,
                Endian::Little => out.write_f32::<LittleEndian>(narrow)?,
            }
        }
        Ok(out)
    }

    fn decode_text(stream: &mut dyn ReadSeek, size: usize, encoding: TextEncoding) -> Result<Value> {
        let offset = position(stream)?;
        let buf = read_exact(stream, size)?;
        encoding
            .decode(&buf)
            .map(Value::Str)
            .map_err(|reason| Error::Deserialization {
                field: None,
                offset,
                reason,
            })
    }

    fn decode_text_z(stream: &mut dyn ReadSeek, max: Option<usize>, encoding: TextEncoding) -> Result<Value> {
        let offset = position(stream)?;
        let unit = encoding.unit_size();
        let mut buf = Vec::new();
        loop {
            if max.is_some_and(|m| buf.len() + unit > m) {
                return Err(Error::Deserialization {
                    field: None,
                    offset,
                    reason: format!("no null terminator within {} bytes", buf.len()),
                });
            }
            let chunk = read_exact(stream, unit)?;
            if chunk.iter().all(|&b| b == 0) {
                break;
            }
            buf.extend_from_slice(&chunk);
        }
        encoding
            .decode(&buf)
            .map(Value::Str)
            .map_err(|reason| Error::Deserialization {
                field: None,
                offset,
                reason,
            })
    }

    fn encode_text(value: &Value, encoding: TextEncoding, terminate: bool) -> Result<Vec<u8>> {
        let text = value
            .as_str()
            .ok_or_else(|| Error::unserializable(None, format!("expected a string, got {}", value.describe())))?;
        let mut out = encoding.encode(text).map_err(|reason| Error::unserializable(None, reason))?;
        if terminate {
            out.extend(std::iter::repeat(0u8).take(encoding.unit_size()));
        }
        Ok(out)
    }

    /// Pad or reject an encoded string so it is exactly `size` bytes.
    fn fit(mut encoded: Vec<u8>, value: &Value, size: Option<usize>, pad_byte: Option<u8>) -> Result<Vec<u8>> {
        let Some(size) = size else { return Ok(encoded) };
        match (encoded.len().cmp(&size), pad_byte) {
            (std::cmp::Ordering::Equal, _) => Ok(encoded),
            (std::cmp::Ordering::Less, Some(pad)) => {
                encoded.resize(size, pad);
                Ok(encoded)
            }
            _ => Err(Error::ValueSize {
                field: None,
                size: Some(size),
                value: value.clone(),
            }),
        }
    }
}

fn check_int_width(size: usize) -> Result<()> {
    if (1..=8).contains(&size) {
        Ok(())
    } else {
        Err(Error::config(format!("integer width must be 1 to 8 bytes, got {size}")))
    }
}

fn undefined_size() -> Error {
    Error::UndefinedSize {
        field: "<unbound field>".to_string(),
    }
}

impl ScalarCodec for Scalar {
    fn static_size(&self) -> Option<usize> {
        match self {
            Scalar::Integer { size, .. } => Some(*size),
            Scalar::Float32 { .. } => Some(4),
            Scalar::Float64 { .. } => Some(8),
            Scalar::Custom(codec) => codec.static_size(),
            _ => None,
        }
    }

    fn needs_size(&self) -> bool {
        match self {
            Scalar::Bytes | Scalar::String { .. } => true,
            Scalar::Custom(codec) => codec.needs_size(),
            _ => false,
        }
    }

    fn decode(&self, stream: &mut dyn ReadSeek, size: Option<usize>) -> Result<Value> {
        match self {
            Scalar::Integer { size, signed, endian } => {
                Self::decode_int(stream, *size, *signed, endian.unwrap_or_else(Endian::native))
            }
            Scalar::Float32 { endian } => Self::decode_float(stream, false, endian.unwrap_or_else(Endian::native)),
            Scalar::Float64 { endian } => Self::decode_float(stream, true, endian.unwrap_or_else(Endian::native)),
            Scalar::VarInt { encoding, .. } => {
                let offset = position(stream)?;
                let n = encoding.decode(stream)?;
                let value = if encoding.is_signed() {
                    i64::try_from(n).map(Value::Int).ok()
                } else {
                    u64::try_from(n).map(Value::UInt).ok()
                };
                value.ok_or_else(|| Error::Deserialization {
                    field: None,
                    offset,
                    reason: format!("{n} is out of range"),
                })
            }
            Scalar::Bytes => {
                let size = size.ok_or_else(undefined_size)?;
                Ok(Value::Bytes(read_exact(stream, size)?))
            }
            Scalar::String { encoding, .. } => {
                let size = size.ok_or_else(undefined_size)?;
                Self::decode_text(stream, size, Self::text_encoding(encoding))
            }
            Scalar::StringZ { encoding } => Self::decode_text_z(stream, size, Self::text_encoding(encoding)),
            Scalar::Custom(codec) => codec.decode(stream, size),
        }
    }

    fn encode(&self, value: &Value, size: Option<usize>) -> Result<Vec<u8>> {
        match self {
            Scalar::Integer { size, signed, endian } => {
                Self::encode_int(value, *size, *signed, endian.unwrap_or_else(Endian::native))
            }
            Scalar::Float32 { endian } => Self::encode_float(value, false, endian.unwrap_or_else(Endian::native)),
            Scalar::Float64 { endian } => Self::encode_float(value, true, endian.unwrap_or_else(Endian::native)),
            Scalar::VarInt { encoding, max_bytes } => {
                let n = value.as_i128().ok_or_else(|| {
                    Error::unserializable(None, format!("expected an integer, got {}", value.describe()))
                })?;
                let out = encoding.encode(n)?;
                if max_bytes.is_some_and(|max| out.len() > max) {
                    return Err(Error::ValueSize {
                        field: None,
                        size: *max_bytes,
                        value: value.clone(),
                    });
                }
                Ok(out)
            }
            Scalar::Bytes => {
                let bytes = value.as_bytes().ok_or_else(|| {
                    Error::unserializable(None, format!("expected bytes, got {}", value.describe()))
                })?;
                Self::fit(bytes.to_vec(), value, size, None)
            }
            Scalar::String { encoding, pad_byte } => {
                let encoded = Self::encode_text(value, Self::text_encoding(encoding), false)?;
                Self::fit(encoded, value, size, *pad_byte)
            }
            Scalar::StringZ { encoding } => {
                let encoded = Self::encode_text(value, Self::text_encoding(encoding), true)?;
                if size.is_some_and(|max| encoded.len() > max) {
                    return Err(Error::ValueSize {
                        field: None,
                        size,
                        value: value.clone(),
                    });
                }
                Ok(encoded)
            }
            Scalar::Custom(codec) => codec.encode(value, size),
        }
    }

    fn encoded_size(&self, value: &Value) -> Option<usize> {
        match self {
            Scalar::Bytes => value.as_bytes().map(<[u8]>::len),
            Scalar::Custom(codec) => codec.encoded_size(value),
            _ => self.static_size().or_else(|| self.encode(value, None).ok().map(|b| b.len())),
        }
    }
}
