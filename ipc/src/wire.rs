//! Byte-level encoding
//!
//! Scalars are little-endian and fixed width. Strings are a u32 byte length
//! followed by UTF-8 bytes. Arrays start with a u32 byte length and a u32
//! element count. Optionals start with a one-byte presence tag. Structs are the
//! plain concatenation of their fields.
//!
//! Every decode is bounded by an explicit `end` offset that never exceeds the
//! buffer length.

use crate::error::CodecError;
use crate::signature::{CodecLimits, Type};
use crate::value::Value;
use crate::Result;

pub(crate) const ARRAY_HEADER: usize = 8;

fn length_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| CodecError::TooLarge)
}

pub(crate) fn encode(value: &Value, buf: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Bool(v) => buf.push(u8::from(*v)),
        Value::Byte(v) => buf.push(*v),
        Value::Int16(v) => buf.extend_from_slice(&v.to_le_bytes()),
        Value::Uint16(v) => buf.extend_from_slice(&v.to_le_bytes()),
        Value::Int32(v) => buf.extend_from_slice(&v.to_le_bytes()),
        Value::Uint32(v) | Value::Handle(v) | Value::Fd(v) => {
            buf.extend_from_slice(&v.to_le_bytes())
        }
        Value::Int64(v) => buf.extend_from_slice(&v.to_le_bytes()),
        Value::Uint64(v) => buf.extend_from_slice(&v.to_le_bytes()),
        Value::Double(v) => buf.extend_from_slice(&v.to_le_bytes()),
        Value::String(v) => {
            buf.extend_from_slice(&length_u32(v.len())?.to_le_bytes());
            buf.extend_from_slice(v.as_bytes());
        }
        Value::Array(_, items) => {
            let at = buf.len();
            buf.extend_from_slice(&[0; ARRAY_HEADER]);
            for item in items {
                encode(item, buf)?;
            }
            patch_array_header(buf, at, length_u32(items.len())?)?;
        }
        Value::Maybe(_, inner) => match inner {
            Some(value) => {
                buf.push(1);
                encode(value, buf)?;
            }
            None => buf.push(0),
        },
        Value::Struct(fields) => {
            for field in fields {
                encode(field, buf)?;
            }
        }
    }
    Ok(())
}

/// Fills in the array header at `at` now that everything after it is the array body.
pub(crate) fn patch_array_header(buf: &mut [u8], at: usize, count: u32) -> Result<()> {
    let body = length_u32(buf.len() - at - ARRAY_HEADER)?;
    buf[at..at + 4].copy_from_slice(&body.to_le_bytes());
    buf[at + 4..at + ARRAY_HEADER].copy_from_slice(&count.to_le_bytes());
    Ok(())
}

fn take<'a>(data: &'a [u8], pos: &mut usize, end: usize, n: usize) -> Result<&'a [u8]> {
    let available = end.saturating_sub(*pos);
    if n > available {
        return Err(CodecError::OutOfBounds {
            needed: n,
            available,
        });
    }
    let bytes = &data[*pos..*pos + n];
    *pos += n;
    Ok(bytes)
}

fn take_array<const N: usize>(data: &[u8], pos: &mut usize, end: usize) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(take(data, pos, end, N)?);
    Ok(out)
}

fn take_u32(data: &[u8], pos: &mut usize, end: usize) -> Result<u32> {
    Ok(u32::from_le_bytes(take_array(data, pos, end)?))
}

/// Reads an array header and returns the end offset of its body and the element count.
pub(crate) fn array_header(
    data: &[u8],
    pos: &mut usize,
    end: usize,
    element: &Type,
    limits: &CodecLimits,
) -> Result<(usize, u32)> {
    let bytes = take_u32(data, pos, end)? as usize;
    let count = take_u32(data, pos, end)?;

    let available = end.saturating_sub(*pos);
    if bytes > available {
        return Err(CodecError::OutOfBounds {
            needed: bytes,
            available,
        });
    }

    let min = element.min_size();
    let plausible = if min == 0 {
        count <= limits.max_unit_elements
    } else {
        (count as usize)
            .checked_mul(min)
            .map_or(false, |needed| needed <= bytes)
    };
    if !plausible {
        return Err(CodecError::InvalidArrayHeader { count, bytes });
    }

    Ok((*pos + bytes, count))
}

/// Reads an optional-value presence tag.
pub(crate) fn maybe_tag(data: &[u8], pos: &mut usize, end: usize) -> Result<bool> {
    match take_array::<1>(data, pos, end)?[0] {
        0 => Ok(false),
        1 => Ok(true),
        tag => Err(CodecError::InvalidMaybeTag(tag)),
    }
}

pub(crate) fn decode(
    ty: &Type,
    data: &[u8],
    pos: &mut usize,
    end: usize,
    limits: &CodecLimits,
) -> Result<Value> {
    let value = match ty {
        Type::Bool => match take_array::<1>(data, pos, end)?[0] {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            byte => return Err(CodecError::InvalidBool(byte)),
        },
        Type::Byte => Value::Byte(take_array::<1>(data, pos, end)?[0]),
        Type::Int16 => Value::Int16(i16::from_le_bytes(take_array(data, pos, end)?)),
        Type::Uint16 => Value::Uint16(u16::from_le_bytes(take_array(data, pos, end)?)),
        Type::Int32 => Value::Int32(i32::from_le_bytes(take_array(data, pos, end)?)),
        Type::Uint32 => Value::Uint32(take_u32(data, pos, end)?),
        Type::Int64 => Value::Int64(i64::from_le_bytes(take_array(data, pos, end)?)),
        Type::Uint64 => Value::Uint64(u64::from_le_bytes(take_array(data, pos, end)?)),
        Type::Double => Value::Double(f64::from_le_bytes(take_array(data, pos, end)?)),
        Type::Handle => Value::Handle(take_u32(data, pos, end)?),
        Type::Fd => Value::Fd(take_u32(data, pos, end)?),
        Type::String => {
            let len = take_u32(data, pos, end)? as usize;
            let bytes = take(data, pos, end, len)?;
            let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
            Value::String(text.to_string())
        }
        Type::Array(element) => {
            let (body_end, count) = array_header(data, pos, end, element, limits)?;
            // count is bounded by the body length above, so this cannot over-allocate
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(decode(element, data, pos, body_end, limits)?);
            }
            if *pos != body_end {
                return Err(CodecError::TrailingBytes(body_end - *pos));
            }
            Value::Array(element.as_ref().clone(), items)
        }
        Type::Maybe(element) => {
            let inner = if maybe_tag(data, pos, end)? {
                Some(Box::new(decode(element, data, pos, end, limits)?))
            } else {
                None
            };
            Value::Maybe(element.as_ref().clone(), inner)
        }
        Type::Struct(fields) => {
            let mut values = Vec::with_capacity(fields.len());
            for field in fields {
                values.push(decode(field, data, pos, end, limits)?);
            }
            Value::Struct(values)
        }
    };
    Ok(value)
}
