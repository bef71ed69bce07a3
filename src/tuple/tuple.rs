use bytes::{Buf, BufMut, BytesMut};

use crate::common::{Result, SdbError, BYTE64_LEN};

use super::{TypeTag, Value};

/// Represents a single row/tuple: an ordered sequence of typed column values.
///
/// ## Tuple Binary Format
///
/// ```text
/// +-----------+-----------------+-----------+-----------------+-----
/// | Tag (4B)  | Payload (N B)   | Tag (4B)  | Payload (N B)   | ...
/// +-----------+-----------------+-----------+-----------------+-----
/// ```
///
/// Tags are little-endian `u32` values (see [`TypeTag`]); the payload width is
/// fixed by the tag (4 bytes for `Int32`, 64 bytes for `Byte64`). The encoding is
/// self-describing: no schema is needed to decode it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    /// Creates a tuple from the given values.
    ///
    /// Fails with `SchemaMismatch` if any value has no on-disk representation.
    pub fn new(values: Vec<Value>) -> Result<Self> {
        for (column, value) in values.iter().enumerate() {
            if value.type_tag().is_none() {
                return Err(SdbError::SchemaMismatch {
                    column,
                    found: value.type_name(),
                });
            }
        }
        Ok(Self { values })
    }

    pub fn builder() -> TupleBuilder {
        TupleBuilder::default()
    }

    /// Returns the value at the given column index.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of bytes [`Tuple::encode`] will produce.
    pub fn encoded_len(&self) -> usize {
        self.values
            .iter()
            .filter_map(Value::type_tag)
            .map(|tag| TypeTag::LEN + tag.payload_len())
            .sum()
    }

    /// Serializes the tuple to bytes for storage.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        for value in &self.values {
            match value {
                Value::Int32(v) => {
                    buf.put_u32_le(TypeTag::Int32.as_u32());
                    buf.put_i32_le(*v);
                }
                Value::Byte64(bytes) => {
                    buf.put_u32_le(TypeTag::Byte64.as_u32());
                    buf.put_slice(bytes);
                }
                // rejected by Tuple::new
                _ => {}
            }
        }
        buf.to_vec()
    }

    /// Deserializes a tuple from bytes produced by [`Tuple::encode`].
    ///
    /// Unknown tags and truncated columns are reported as `Corrupt`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        let mut values = Vec::new();

        while buf.has_remaining() {
            let column = values.len();
            if buf.remaining() < TypeTag::LEN {
                return Err(SdbError::corrupt(format!(
                    "column {}: truncated type tag ({} bytes left)",
                    column,
                    buf.remaining()
                )));
            }
            let tag = TypeTag::try_from(buf.get_u32_le())?;
            if buf.remaining() < tag.payload_len() {
                return Err(SdbError::corrupt(format!(
                    "column {}: {:?} payload needs {} bytes, {} left",
                    column,
                    tag,
                    tag.payload_len(),
                    buf.remaining()
                )));
            }

            let value = match tag {
                TypeTag::Int32 => Value::Int32(buf.get_i32_le()),
                TypeTag::Byte64 => {
                    let mut bytes = [0u8; BYTE64_LEN];
                    buf.copy_to_slice(&mut bytes);
                    Value::Byte64(bytes)
                }
            };
            values.push(value);
        }

        Ok(Self { values })
    }
}

/// Builder for constructing tuples one column at a time.
#[derive(Debug, Default)]
pub struct TupleBuilder {
    values: Vec<Value>,
}

impl TupleBuilder {
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn build(self) -> Result<Tuple> {
        Tuple::new(self.values)
    }
}
