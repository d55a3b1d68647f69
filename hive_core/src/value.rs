//! Typed value payloads.
//!
//! Text is stored the way the native store keeps it: UTF-16LE code units
//! followed by a terminating NUL. 32-bit integers are 4 little-endian bytes.

use bytes::Bytes;
use std::fmt;

/// Upper bound, in UTF-16 units including the terminator, for typed string
/// reads and for the result of environment expansion.
pub const MAX_STRING_LENGTH: usize = 1024;

/// The four value encodings the hive interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ValueType {
    String = 1,
    ExpandString = 2,
    Binary = 3,
    Dword = 4,
}

impl ValueType {
    /// Persisted type code.
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(ValueType::String),
            2 => Some(ValueType::ExpandString),
            3 => Some(ValueType::Binary),
            4 => Some(ValueType::Dword),
            _ => None,
        }
    }

    pub fn is_string(self) -> bool {
        matches!(self, ValueType::String | ValueType::ExpandString)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::String => "REG_SZ",
            ValueType::ExpandString => "REG_EXPAND_SZ",
            ValueType::Binary => "REG_BINARY",
            ValueType::Dword => "REG_DWORD",
        })
    }
}

/// A type tag plus the raw payload stored under a value name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawValue {
    pub value_type: ValueType,
    pub data: Bytes,
}

impl RawValue {
    pub fn new(value_type: ValueType, data: impl Into<Bytes>) -> Self {
        Self {
            value_type,
            data: data.into(),
        }
    }

    pub fn string(s: &str) -> Self {
        Self::new(ValueType::String, encode_utf16z(s))
    }

    pub fn expand_string(s: &str) -> Self {
        Self::new(ValueType::ExpandString, encode_utf16z(s))
    }

    pub fn dword(value: u32) -> Self {
        Self::new(ValueType::Dword, Bytes::copy_from_slice(&value.to_le_bytes()))
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(ValueType::Binary, data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decodes a string payload, regardless of the type tag.
    pub fn to_text(&self) -> Result<String, DecodeError> {
        decode_utf16z(&self.data)
    }

    /// Decodes an exactly-4-byte payload, regardless of the type tag.
    pub fn to_u32(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.data.as_ref().try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("string payload has odd length {0}")]
    OddLength(usize),

    #[error("string payload is not valid UTF-16")]
    InvalidUtf16,
}

/// Encodes `s` as UTF-16LE with a terminating NUL.
pub fn encode_utf16z(s: &str) -> Bytes {
    let mut out = Vec::with_capacity((s.len() + 1) * 2);
    for unit in s.encode_utf16().chain(std::iter::once(0)) {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    Bytes::from(out)
}

/// Decodes UTF-16LE text up to the first NUL (or the end of the payload).
pub fn decode_utf16z(data: &[u8]) -> Result<String, DecodeError> {
    if data.len() % 2 != 0 {
        return Err(DecodeError::OddLength(data.len()));
    }
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16(&units).map_err(|_| DecodeError::InvalidUtf16)
}

/// Length of `s` in UTF-16 units, without terminator.
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_payload_includes_terminator() {
        let value = RawValue::string("abc");
        assert_eq!(value.len(), 8);
        assert_eq!(&value.data[6..], &[0, 0]);
        assert_eq!(value.to_text().unwrap(), "abc");
    }

    #[test]
    fn decoding_stops_at_first_nul() {
        let mut data = encode_utf16z("first").to_vec();
        data.extend_from_slice(&encode_utf16z("second"));
        assert_eq!(decode_utf16z(&data).unwrap(), "first");
    }

    #[test]
    fn odd_length_is_rejected() {
        assert_eq!(decode_utf16z(&[0x41]), Err(DecodeError::OddLength(1)));
    }

    #[test]
    fn dword_is_little_endian() {
        let value = RawValue::dword(0x0102_0304);
        assert_eq!(value.data.as_ref(), &[4, 3, 2, 1]);
        assert_eq!(value.to_u32(), Some(0x0102_0304));
        assert_eq!(RawValue::binary(vec![1u8, 2, 3]).to_u32(), None);
    }

    #[test]
    fn type_codes_round_trip() {
        for ty in [
            ValueType::String,
            ValueType::ExpandString,
            ValueType::Binary,
            ValueType::Dword,
        ] {
            assert_eq!(ValueType::from_code(ty.code()), Some(ty));
        }
        assert_eq!(ValueType::from_code(11), None);
    }
}
