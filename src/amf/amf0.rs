//! AMF0 encoder and decoder
//!
//! Type Markers handled by this codec:
//! ```text
//! 0x00 - Number (IEEE 754 double)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (key-value pairs until 0x000009)
//! 0x05 - Null
//! 0x06 - Undefined
//! 0x08 - ECMA Array (32-bit count hint, then key-value pairs)
//! 0x09 - Object End (0x000009 sequence)
//! 0x0A - Strict Array (32-bit count, then values)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! ```
//!
//! Any other marker is rejected with [`AmfError::UnsupportedType`], which
//! aborts decoding of the enclosing message.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::value::{marker, AmfObject, AmfValue, MAX_SHORT_STRING};
use crate::error::AmfError;

/// Maximum nesting depth for objects/arrays (prevent stack overflow)
const MAX_NESTING_DEPTH: usize = 64;

/// Strict AMF0 decoder
pub struct Amf0Decoder {
    depth: usize,
}

impl Amf0Decoder {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Decode a single AMF0 value from the buffer
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.depth -= 1;
            return Err(AmfError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = self.decode_value(marker, buf);
        self.depth -= 1;
        result
    }

    /// Decode all values from buffer until exhausted
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_value(&mut self, type_marker: u8, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        match type_marker {
            marker::NUMBER => {
                if buf.remaining() < 8 {
                    return Err(AmfError::UnexpectedEof);
                }
                Ok(AmfValue::Number(buf.get_f64()))
            }
            marker::BOOLEAN => {
                if buf.is_empty() {
                    return Err(AmfError::UnexpectedEof);
                }
                Ok(AmfValue::Boolean(buf.get_u8() != 0))
            }
            marker::STRING => Ok(AmfValue::String(read_utf8(buf)?)),
            marker::LONG_STRING => Ok(AmfValue::String(read_utf8_long(buf)?)),
            marker::OBJECT => Ok(AmfValue::Object(self.decode_properties(buf)?)),
            marker::NULL => Ok(AmfValue::Null),
            marker::UNDEFINED => Ok(AmfValue::Undefined),
            marker::ECMA_ARRAY => {
                if buf.remaining() < 4 {
                    return Err(AmfError::UnexpectedEof);
                }
                // Count is only a hint; the terminator is authoritative
                let _count = buf.get_u32();
                Ok(AmfValue::EcmaArray(self.decode_properties(buf)?))
            }
            marker::STRICT_ARRAY => {
                if buf.remaining() < 4 {
                    return Err(AmfError::UnexpectedEof);
                }
                let count = buf.get_u32() as usize;
                let mut elements = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    elements.push(self.decode(buf)?);
                }
                Ok(AmfValue::StrictArray(elements))
            }
            other => Err(AmfError::UnsupportedType(other)),
        }
    }

    /// Key-value pairs up to the empty-key + 0x09 terminator
    fn decode_properties(&mut self, buf: &mut Bytes) -> Result<AmfObject, AmfError> {
        let mut properties = AmfObject::new();

        loop {
            let key = read_utf8(buf)?;

            if key.is_empty() {
                if buf.is_empty() {
                    return Err(AmfError::InvalidObjectEnd);
                }
                if buf.get_u8() != marker::OBJECT_END {
                    return Err(AmfError::InvalidObjectEnd);
                }
                return Ok(properties);
            }

            let value = self.decode(buf)?;
            properties.insert(key, value);
        }
    }
}

impl Default for Amf0Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Read UTF-8 string with 16-bit length prefix
fn read_utf8(buf: &mut Bytes) -> Result<String, AmfError> {
    if buf.remaining() < 2 {
        return Err(AmfError::UnexpectedEof);
    }
    let len = buf.get_u16() as usize;
    read_utf8_body(buf, len)
}

/// Read UTF-8 string with 32-bit length prefix
fn read_utf8_long(buf: &mut Bytes) -> Result<String, AmfError> {
    if buf.remaining() < 4 {
        return Err(AmfError::UnexpectedEof);
    }
    let len = buf.get_u32() as usize;
    read_utf8_body(buf, len)
}

fn read_utf8_body(buf: &mut Bytes, len: usize) -> Result<String, AmfError> {
    if buf.remaining() < len {
        return Err(AmfError::UnexpectedEof);
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

/// AMF0 encoder
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Get the encoded bytes and reset encoder
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Encode a single AMF0 value
    pub fn encode(&mut self, value: &AmfValue) {
        self.buf.put_u8(value.marker());
        match value {
            AmfValue::Null | AmfValue::Undefined => {}
            AmfValue::Boolean(b) => self.buf.put_u8(u8::from(*b)),
            AmfValue::Number(n) => self.buf.put_f64(*n),
            AmfValue::String(s) => {
                if s.len() > MAX_SHORT_STRING {
                    self.buf.put_u32(s.len() as u32);
                } else {
                    self.buf.put_u16(s.len() as u16);
                }
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::Object(props) => self.encode_properties(props),
            AmfValue::EcmaArray(props) => {
                self.buf.put_u32(props.len() as u32);
                self.encode_properties(props);
            }
            AmfValue::StrictArray(elements) => {
                self.buf.put_u32(elements.len() as u32);
                for elem in elements {
                    self.encode(elem);
                }
            }
        }
    }

    /// Encode multiple values
    pub fn encode_all(&mut self, values: &[AmfValue]) {
        for value in values {
            self.encode(value);
        }
    }

    fn encode_properties(&mut self, props: &AmfObject) {
        for (key, val) in props {
            self.write_utf8(key);
            self.encode(val);
        }
        self.buf.put_u16(0);
        self.buf.put_u8(marker::OBJECT_END);
    }

    /// Write UTF-8 string with 16-bit length prefix (no type marker)
    fn write_utf8(&mut self, s: &str) {
        let len = s.len().min(MAX_SHORT_STRING);
        self.buf.put_u16(len as u16);
        self.buf.put_slice(&s.as_bytes()[..len]);
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a single value
pub fn encode(value: &AmfValue) -> Bytes {
    let mut encoder = Amf0Encoder::with_capacity(1 + value.size());
    encoder.encode(value);
    encoder.finish()
}

/// Encode a sequence of values back to back
pub fn encode_all(values: &[AmfValue]) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values);
    encoder.finish()
}

/// Decode a single value
pub fn decode(data: &[u8]) -> Result<AmfValue, AmfError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode(&mut buf)
}

/// Decode values until the input is exhausted
pub fn decode_all(data: &[u8]) -> Result<Vec<AmfValue>, AmfError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode_all(&mut buf)
}
