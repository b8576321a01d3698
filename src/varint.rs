//! Self-delimiting variable-length integer encodings.
//!
//! Every decoder reads one byte at a time and stops at the first byte whose
//! continuation bit (`0x80`) is clear. Values that don't fit into 64 bits fail
//! with [`Error::Deserialization`] instead of wrapping.
//!
//! See also: <https://en.wikipedia.org/wiki/LEB128>,
//! <https://en.wikipedia.org/wiki/Variable-length_quantity>

use crate::error::{Error, Result};
use crate::stream::{position, read_u8, ReadSeek};

/// Supported variable-length integer encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VarIntEncoding {
    /// Unsigned, 7-bit groups most significant first (MIDI, git packfiles).
    Vlq,
    /// Unsigned little-endian base 128 (DWARF, WebAssembly).
    Uleb128,
    /// Two's complement signed little-endian base 128.
    Leb128,
    /// Sign-magnitude: sign in bit 6 of the first byte, then 7-bit groups
    /// most significant first (Unreal Engine "compact indices").
    CompactIndices,
    /// Zigzag mapping onto ULEB128 (Protocol Buffers `sint*`).
    ZigZag,
}

impl VarIntEncoding {
    pub fn is_signed(self) -> bool {
        !matches!(self, VarIntEncoding::Vlq | VarIntEncoding::Uleb128)
    }

    pub fn encode(self, value: i128) -> Result<Vec<u8>> {
        if self.is_signed() {
            let v = i64::try_from(value)
                .map_err(|_| Error::unserializable(None, format!("{value} doesn't fit into 64 bits")))?;
            Ok(match self {
                VarIntEncoding::Leb128 => encode_leb128(v),
                VarIntEncoding::CompactIndices => encode_compact(v),
                _ => encode_zigzag(v),
            })
        } else {
            let v = u64::try_from(value).map_err(|_| {
                Error::unserializable(None, format!("{self:?} can't encode {value}"))
            })?;
            Ok(match self {
                VarIntEncoding::Vlq => encode_vlq(v),
                _ => encode_uleb128(v),
            })
        }
    }

    /// Decodes one integer; unsigned encodings yield `UInt`-range values.
    pub fn decode(self, stream: &mut dyn ReadSeek) -> Result<i128> {
        Ok(match self {
            VarIntEncoding::Vlq => i128::from(decode_vlq(stream)?),
            VarIntEncoding::Uleb128 => i128::from(decode_uleb128(stream)?),
            VarIntEncoding::Leb128 => i128::from(decode_leb128(stream)?),
            VarIntEncoding::CompactIndices => i128::from(decode_compact(stream)?),
            VarIntEncoding::ZigZag => i128::from(decode_zigzag(stream)?),
        })
    }
}

fn overflow(offset: u64, encoding: &str) -> Error {
    Error::Deserialization {
        field: None,
        offset,
        reason: format!("{encoding} integer overflows 64 bits"),
    }
}

pub fn encode_vlq(mut value: u64) -> Vec<u8> {
    let mut out = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        out.push(0x80 | (value & 0x7f) as u8);
        value >>= 7;
    }
    out.reverse();
    out
}

pub fn decode_vlq(stream: &mut dyn ReadSeek) -> Result<u64> {
    let offset = position(stream)?;
    let mut value: u64 = 0;
    loop {
        let b = read_u8(stream)?;
        if value >> 57 != 0 {
            return Err(overflow(offset, "VLQ"));
        }
        value = (value << 7) | u64::from(b & 0x7f);
        if b & 0x80 == 0 {
            return Ok(value);
        }
    }
}

pub fn encode_uleb128(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    while value >= 0x80 {
        out.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
    out
}

pub fn decode_uleb128(stream: &mut dyn ReadSeek) -> Result<u64> {
    let offset = position(stream)?;
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let b = read_u8(stream)?;
        let group = u64::from(b & 0x7f);
        if shift >= 64 || (group << shift) >> shift != group {
            return Err(overflow(offset, "ULEB128"));
        }
        value |= group << shift;
        shift += 7;
        if b & 0x80 == 0 {
            return Ok(value);
        }
    }
}

pub fn encode_leb128(mut value: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

pub fn decode_leb128(stream: &mut dyn ReadSeek) -> Result<i64> {
    let offset = position(stream)?;
    let mut value: i64 = 0;
    let mut shift = 0u32;
    loop {
        let b = read_u8(stream)?;
        if shift >= 64 {
            return Err(overflow(offset, "LEB128"));
        }
        value |= i64::from(b & 0x7f) << shift;
        shift += 7;
        if b & 0x80 == 0 {
            if shift < 64 && b & 0x40 != 0 {
                value |= -1i64 << shift;
            }
            return Ok(value);
        }
    }
}

pub fn encode_compact(value: i64) -> Vec<u8> {
    let sign = if value < 0 { 0x40u8 } else { 0 };
    let mut magnitude = value.unsigned_abs();

    // First byte holds 6 bits, the rest hold 7 each.
    let bits = 64 - magnitude.leading_zeros() as usize;
    let n_bytes = 1 + bits.saturating_sub(6).div_ceil(7);

    let mut out = vec![0u8; n_bytes];
    for slot in out[1..].iter_mut().rev() {
        *slot = 0x80 | (magnitude & 0x7f) as u8;
        magnitude >>= 7;
    }
    out[0] = 0x80 | sign | (magnitude & 0x3f) as u8;
    if let Some(last) = out.last_mut() {
        *last &= 0x7f;
    }
    out
}

pub fn decode_compact(stream: &mut dyn ReadSeek) -> Result<i64> {
    let offset = position(stream)?;
    let first = read_u8(stream)?;
    let negative = first & 0x40 != 0;
    let mut magnitude = u64::from(first & 0x3f);
    let mut b = first;
    while b & 0x80 != 0 {
        b = read_u8(stream)?;
        if magnitude >> 57 != 0 {
            return Err(overflow(offset, "compact"));
        }
        magnitude = (magnitude << 7) | u64::from(b & 0x7f);
    }
    if negative {
        if magnitude > 1u64 << 63 {
            return Err(overflow(offset, "compact"));
        }
        Ok((magnitude as i64).wrapping_neg())
    } else {
        i64::try_from(magnitude).map_err(|_| overflow(offset, "compact"))
    }
}

pub fn encode_zigzag(value: i64) -> Vec<u8> {
    encode_uleb128(((value << 1) ^ (value >> 63)) as u64)
}

pub fn decode_zigzag(stream: &mut dyn ReadSeek) -> Result<i64> {
    let raw = decode_uleb128(stream)?;
    Ok((raw >> 1) as i64 ^ -((raw & 1) as i64))
}
