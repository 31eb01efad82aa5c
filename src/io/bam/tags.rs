//! Optional auxiliary tags.
//!
//! # Format
//!
//! Each tag is encoded as:
//! - 2 bytes: tag name (e.g., "NM")
//! - 1 byte: value type (A, c, C, s, S, i, I, f, Z, H, B)
//! - N bytes: value (format depends on type)
//!
//! `B` arrays carry a 1-byte element subtype and a 4-byte element count
//! before the elements. `Z` and `H` values are NUL-terminated.
//!
//! Tags are kept as the raw tag block and walked on demand; most records
//! pass through a filter run without any tag being touched.

use super::error::BamDecodeError;
use std::fmt::Write as _;

/// A decoded array tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    /// `B:c`
    Int8(Vec<i8>),
    /// `B:C`
    UInt8(Vec<u8>),
    /// `B:s`
    Int16(Vec<i16>),
    /// `B:S`
    UInt16(Vec<u16>),
    /// `B:i`
    Int32(Vec<i32>),
    /// `B:I`
    UInt32(Vec<u32>),
    /// `B:f`
    Float(Vec<f32>),
}

/// A decoded tag value. Integer types are widened to `i64`.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// `A` printable character
    Char(u8),
    /// `c C s S i I` integer
    Int(i64),
    /// `f` single-precision float
    Float(f32),
    /// `Z` string
    String(String),
    /// `H` hex string
    Hex(String),
    /// `B` numeric array
    Array(ArrayValue),
}

/// A single decoded tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// Two-character key
    pub key: [u8; 2],
    /// Decoded value
    pub value: TagValue,
}

/// Location of one tag inside the raw block.
#[derive(Debug, Clone, Copy)]
struct RawField {
    key: [u8; 2],
    type_code: u8,
    /// Offset of the first value byte
    value_start: usize,
    /// Offset one past the last byte of this field
    end: usize,
}

fn element_size(subtype: u8) -> Option<usize> {
    match subtype {
        b'c' | b'C' => Some(1),
        b's' | b'S' => Some(2),
        b'i' | b'I' | b'f' => Some(4),
        _ => None,
    }
}

fn short(context: &'static str, expected: usize, actual: usize) -> BamDecodeError {
    BamDecodeError::UnexpectedEof {
        context,
        expected,
        actual,
    }
}

/// Locate the field starting at `start`.
fn scan_field(data: &[u8], start: usize) -> Result<RawField, BamDecodeError> {
    let remaining = data.len() - start;
    if remaining < 3 {
        return Err(short("tag header", 3, remaining));
    }
    let key = [data[start], data[start + 1]];
    let type_code = data[start + 2];
    let value_start = start + 3;
    let value = &data[value_start..];

    let value_len = match type_code {
        b'A' | b'c' | b'C' => 1,
        b's' | b'S' => 2,
        b'i' | b'I' | b'f' => 4,
        b'Z' | b'H' => match value.iter().position(|&b| b == 0) {
            Some(nul) => nul + 1,
            None => {
                return Err(BamDecodeError::MissingNulTerminator {
                    field: "string tag",
                    offset: value_start,
                })
            }
        },
        b'B' => {
            if value.len() < 5 {
                return Err(short("array tag header", 5, value.len()));
            }
            let subtype = value[0];
            let size = element_size(subtype)
                .ok_or(BamDecodeError::InvalidArraySubtype { subtype })?;
            let count = u32::from_le_bytes([value[1], value[2], value[3], value[4]]) as usize;
            count
                .checked_mul(size)
                .and_then(|n| n.checked_add(5))
                .ok_or_else(|| BamDecodeError::InvalidData {
                    message: format!("array tag count too large: {}", count),
                })?
        }
        _ => return Err(BamDecodeError::InvalidTagType { tag: key, type_code }),
    };

    if value.len() < value_len {
        return Err(short("tag value", value_len, value.len()));
    }

    Ok(RawField {
        key,
        type_code,
        value_start,
        end: value_start + value_len,
    })
}

fn utf8(bytes: &[u8]) -> Result<&str, BamDecodeError> {
    std::str::from_utf8(bytes).map_err(|source| BamDecodeError::InvalidUtf8 {
        field: "string tag",
        source,
    })
}

fn decode_array(value: &[u8]) -> Result<ArrayValue, BamDecodeError> {
    let subtype = value[0];
    let elements = &value[5..];
    Ok(match subtype {
        b'c' => ArrayValue::Int8(elements.iter().map(|&b| b as i8).collect()),
        b'C' => ArrayValue::UInt8(elements.to_vec()),
        b's' => ArrayValue::Int16(
            elements
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]))
                .collect(),
        ),
        b'S' => ArrayValue::UInt16(
            elements
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect(),
        ),
        b'i' => ArrayValue::Int32(
            elements
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        b'I' => ArrayValue::UInt32(
            elements
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        b'f' => ArrayValue::Float(
            elements
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        _ => return Err(BamDecodeError::InvalidArraySubtype { subtype }),
    })
}

fn decode_value(data: &[u8], field: &RawField) -> Result<TagValue, BamDecodeError> {
    let value = &data[field.value_start..field.end];
    Ok(match field.type_code {
        b'A' => TagValue::Char(value[0]),
        b'c' => TagValue::Int(value[0] as i8 as i64),
        b'C' => TagValue::Int(value[0] as i64),
        b's' => TagValue::Int(i16::from_le_bytes([value[0], value[1]]) as i64),
        b'S' => TagValue::Int(u16::from_le_bytes([value[0], value[1]]) as i64),
        b'i' => TagValue::Int(i32::from_le_bytes([value[0], value[1], value[2], value[3]]) as i64),
        b'I' => TagValue::Int(u32::from_le_bytes([value[0], value[1], value[2], value[3]]) as i64),
        b'f' => TagValue::Float(f32::from_le_bytes([value[0], value[1], value[2], value[3]])),
        b'Z' => TagValue::String(utf8(&value[..value.len() - 1])?.to_string()),
        b'H' => TagValue::Hex(utf8(&value[..value.len() - 1])?.to_string()),
        b'B' => TagValue::Array(decode_array(value)?),
        type_code => {
            return Err(BamDecodeError::InvalidTagType {
                tag: field.key,
                type_code,
            })
        }
    })
}

/// Container for a record's auxiliary tags.
///
/// Holds the raw tag block exactly as encoded, so records that are not
/// modified are re-encoded byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags {
    data: Vec<u8>,
}

impl Tags {
    /// Create empty tags.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Create tags from a raw tag block.
    pub fn from_raw(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Replace the contents with a copy of `data`, reusing the allocation.
    pub fn set_raw(&mut self, data: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(data);
    }

    /// Get the raw tag data.
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Check if tags are empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the total size of tag data in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Remove all tags.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    fn raw_fields(&self) -> impl Iterator<Item = Result<RawField, BamDecodeError>> + '_ {
        let mut pos = 0;
        let mut failed = false;
        std::iter::from_fn(move || {
            if failed || pos >= self.data.len() {
                return None;
            }
            match scan_field(&self.data, pos) {
                Ok(field) => {
                    pos = field.end;
                    Some(Ok(field))
                }
                Err(e) => {
                    failed = true;
                    Some(Err(e))
                }
            }
        })
    }

    /// Check that the block is a well-formed sequence of tags.
    pub fn validate(&self) -> Result<(), BamDecodeError> {
        for field in self.raw_fields() {
            field?;
        }
        Ok(())
    }

    /// Decode every tag in order.
    pub fn iter(&self) -> impl Iterator<Item = Result<Tag, BamDecodeError>> + '_ {
        self.raw_fields().map(move |field| {
            let field = field?;
            Ok(Tag {
                key: field.key,
                value: decode_value(&self.data, &field)?,
            })
        })
    }

    /// Look up and decode a tag by key.
    pub fn get(&self, key: &[u8; 2]) -> Result<Option<Tag>, BamDecodeError> {
        for field in self.raw_fields() {
            let field = field?;
            if &field.key == key {
                return Ok(Some(Tag {
                    key: field.key,
                    value: decode_value(&self.data, &field)?,
                }));
            }
        }
        Ok(None)
    }

    /// Borrow the value of a `Z` tag without allocating.
    ///
    /// Returns `None` if the tag is absent, is not a string, or the block is
    /// malformed before the tag is reached.
    pub fn get_str(&self, key: &[u8; 2]) -> Option<&str> {
        for field in self.raw_fields() {
            let field = field.ok()?;
            if &field.key == key {
                if field.type_code != b'Z' {
                    return None;
                }
                return std::str::from_utf8(&self.data[field.value_start..field.end - 1]).ok();
            }
        }
        None
    }

    /// Remove every tag whose key is in `keys`. Returns how many were removed.
    pub fn remove(&mut self, keys: &[[u8; 2]]) -> Result<usize, BamDecodeError> {
        let mut spans = Vec::new();
        for field in self.raw_fields() {
            let field = field?;
            if keys.contains(&field.key) {
                spans.push((field.value_start - 3, field.end));
            }
        }

        for &(start, end) in spans.iter().rev() {
            self.data.drain(start..end);
        }
        Ok(spans.len())
    }

    /// Append a tag.
    pub fn push(&mut self, tag: &Tag) {
        let out = &mut self.data;
        out.extend_from_slice(&tag.key);
        match &tag.value {
            TagValue::Char(c) => {
                out.push(b'A');
                out.push(*c);
            }
            TagValue::Int(v) => push_int(out, *v),
            TagValue::Float(v) => {
                out.push(b'f');
                out.extend_from_slice(&v.to_le_bytes());
            }
            TagValue::String(s) => {
                out.push(b'Z');
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            TagValue::Hex(s) => {
                out.push(b'H');
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            TagValue::Array(array) => push_array(out, array),
        }
    }

    /// Render all tags as SAM text, each preceded by a TAB.
    pub fn write_sam(&self, out: &mut String) -> Result<(), BamDecodeError> {
        for tag in self.iter() {
            let tag = tag?;
            let _ = write!(out, "\t{}{}:", tag.key[0] as char, tag.key[1] as char);
            match &tag.value {
                TagValue::Char(c) => {
                    let _ = write!(out, "A:{}", *c as char);
                }
                TagValue::Int(v) => {
                    let _ = write!(out, "i:{}", v);
                }
                TagValue::Float(v) => {
                    let _ = write!(out, "f:{}", v);
                }
                TagValue::String(s) => {
                    let _ = write!(out, "Z:{}", s);
                }
                TagValue::Hex(s) => {
                    let _ = write!(out, "H:{}", s);
                }
                TagValue::Array(array) => write_sam_array(out, array),
            }
        }
        Ok(())
    }

    /// Parse one SAM `TAG:TYPE:VALUE` field and append it.
    pub fn push_sam_field(&mut self, field: &str) -> Result<(), BamDecodeError> {
        let tag = parse_sam_field(field)?;
        self.push(&tag);
        Ok(())
    }
}

fn push_int(out: &mut Vec<u8>, v: i64) {
    if v < 0 {
        if v >= i8::MIN as i64 {
            out.push(b'c');
            out.push(v as i8 as u8);
        } else if v >= i16::MIN as i64 {
            out.push(b's');
            out.extend_from_slice(&(v as i16).to_le_bytes());
        } else {
            out.push(b'i');
            out.extend_from_slice(&(v as i32).to_le_bytes());
        }
    } else if v <= u8::MAX as i64 {
        out.push(b'C');
        out.push(v as u8);
    } else if v <= u16::MAX as i64 {
        out.push(b'S');
        out.extend_from_slice(&(v as u16).to_le_bytes());
    } else {
        out.push(b'I');
        out.extend_from_slice(&(v as u32).to_le_bytes());
    }
}

fn push_array(out: &mut Vec<u8>, array: &ArrayValue) {
    out.push(b'B');
    macro_rules! elements {
        ($subtype:expr, $values:expr) => {{
            out.push($subtype);
            out.extend_from_slice(&($values.len() as u32).to_le_bytes());
            for v in $values {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }};
    }
    match array {
        ArrayValue::Int8(values) => elements!(b'c', values),
        ArrayValue::UInt8(values) => elements!(b'C', values),
        ArrayValue::Int16(values) => elements!(b's', values),
        ArrayValue::UInt16(values) => elements!(b'S', values),
        ArrayValue::Int32(values) => elements!(b'i', values),
        ArrayValue::UInt32(values) => elements!(b'I', values),
        ArrayValue::Float(values) => elements!(b'f', values),
    }
}

fn write_sam_array(out: &mut String, array: &ArrayValue) {
    macro_rules! elements {
        ($subtype:expr, $values:expr) => {{
            out.push_str("B:");
            out.push($subtype);
            for v in $values {
                let _ = write!(out, ",{}", v);
            }
        }};
    }
    match array {
        ArrayValue::Int8(values) => elements!('c', values),
        ArrayValue::UInt8(values) => elements!('C', values),
        ArrayValue::Int16(values) => elements!('s', values),
        ArrayValue::UInt16(values) => elements!('S', values),
        ArrayValue::Int32(values) => elements!('i', values),
        ArrayValue::UInt32(values) => elements!('I', values),
        ArrayValue::Float(values) => elements!('f', values),
    }
}

fn parse_sam_field(field: &str) -> Result<Tag, BamDecodeError> {
    let invalid = || BamDecodeError::InvalidField {
        field: "TAG",
        value: field.to_string(),
    };

    let bytes = field.as_bytes();
    if bytes.len() < 5 || bytes[2] != b':' || bytes[4] != b':' {
        return Err(invalid());
    }
    let key = [bytes[0], bytes[1]];
    let value = &field[5..];

    let value = match bytes[3] {
        b'A' => match value.as_bytes() {
            [c] => TagValue::Char(*c),
            _ => return Err(invalid()),
        },
        b'i' => {
            let v: i64 = value.parse().map_err(|_| invalid())?;
            if v < i32::MIN as i64 || v > u32::MAX as i64 {
                return Err(invalid());
            }
            TagValue::Int(v)
        }
        b'f' => TagValue::Float(value.parse().map_err(|_| invalid())?),
        b'Z' => TagValue::String(value.to_string()),
        b'H' => TagValue::Hex(value.to_string()),
        b'B' => TagValue::Array(parse_sam_array(value).ok_or_else(invalid)?),
        type_code => return Err(BamDecodeError::InvalidTagType { tag: key, type_code }),
    };

    Ok(Tag { key, value })
}

fn parse_sam_array(value: &str) -> Option<ArrayValue> {
    let mut parts = value.split(',');
    let subtype = parts.next()?;
    macro_rules! collect {
        ($variant:ident) => {
            ArrayValue::$variant(parts.map(|p| p.parse().ok()).collect::<Option<Vec<_>>>()?)
        };
    }
    Some(match subtype {
        "c" => collect!(Int8),
        "C" => collect!(UInt8),
        "s" => collect!(Int16),
        "S" => collect!(UInt16),
        "i" => collect!(Int32),
        "I" => collect!(UInt32),
        "f" => collect!(Float),
        _ => return None,
    })
}
