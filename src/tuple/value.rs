use std::fmt;

use crate::common::{Result, SdbError, BYTE64_LEN};

/// On-disk type tag written before every column payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TypeTag {
    /// 32-bit signed integer, 4-byte payload
    Int32 = 1,
    /// Fixed 64-byte blob, 64-byte payload
    Byte64 = 2,
}

impl TypeTag {
    /// Size of the encoded tag in bytes.
    pub const LEN: usize = 4;

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Width of the payload that follows this tag.
    pub fn payload_len(self) -> usize {
        match self {
            TypeTag::Int32 => 4,
            TypeTag::Byte64 => BYTE64_LEN,
        }
    }
}

impl TryFrom<u32> for TypeTag {
    type Error = SdbError;

    fn try_from(raw: u32) -> Result<Self> {
        match raw {
            1 => Ok(TypeTag::Int32),
            2 => Ok(TypeTag::Byte64),
            other => Err(SdbError::corrupt(format!("unknown type tag {}", other))),
        }
    }
}

/// A typed value handed to the storage core by the front end.
///
/// Only [`Value::Int32`] and [`Value::Byte64`] can be stored in a tuple; the other
/// variants exist so that values the codec cannot represent are rejected with a
/// `SchemaMismatch` error instead of being dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Byte64([u8; BYTE64_LEN]),
    Text(String),
}

impl Value {
    /// Returns the storage tag for this value, or None if it cannot be stored.
    pub fn type_tag(&self) -> Option<TypeTag> {
        match self {
            Value::Int32(_) => Some(TypeTag::Int32),
            Value::Byte64(_) => Some(TypeTag::Byte64),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Byte64(_) => "byte64",
            Value::Text(_) => "text",
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_byte64(&self) -> Option<&[u8; BYTE64_LEN]> {
        match self {
            Value::Byte64(v) => Some(v),
            _ => None,
        }
    }

    /// Builds a blob value from at most 64 bytes, zero-padding the rest.
    pub fn byte64_from_slice(bytes: &[u8]) -> Option<Value> {
        if bytes.len() > BYTE64_LEN {
            return None;
        }
        let mut buf = [0u8; BYTE64_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Some(Value::Byte64(buf))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Byte64(bytes) => {
                // trailing zero padding is noise
                let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                write!(f, "0x")?;
                for b in &bytes[..end] {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Value::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<[u8; BYTE64_LEN]> for Value {
    fn from(v: [u8; BYTE64_LEN]) -> Self {
        Value::Byte64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}
