//! Thrift binary protocol primitives.
//!
//! Every multi-byte integer is Big Endian. Field and list framing:
//! ```text
//! field header  ┌────────┬──────────┐      list header ┌──────────┬──────────┐
//!               │ type   │ field id │                  │ elem type│ count    │
//!               │ 1 byte │ int16 BE │                  │ 1 byte   │ int32 BE │
//!               └────────┴──────────┘                  └──────────┴──────────┘
//! string        int32 BE byte length, then raw UTF-8
//! struct end    single 0x00
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

/// Thrift type codes used by the collector schema.
pub mod ttype {
    /// Terminates the field sequence of a struct.
    pub const STOP: u8 = 0;
    /// Not used by the collector schema.
    pub const BYTE: u8 = 1;
    /// 32-bit integer; also carries enum values.
    pub const I32: u8 = 8;
    pub const I64: u8 = 10;
    pub const STRING: u8 = 11;
    pub const STRUCT: u8 = 12;
    pub const LIST: u8 = 15;
}

/// Append-only Thrift binary writer.
#[derive(Debug, Default)]
pub struct ThriftWriter {
    buf: BytesMut,
}

impl ThriftWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn byte(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    #[inline]
    pub fn i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    #[inline]
    pub fn i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    #[inline]
    pub fn i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    /// Writes a length-prefixed UTF-8 string.
    ///
    /// A string whose length does not fit the int32 prefix is written as
    /// the empty string.
    pub fn string(&mut self, s: &str) {
        match i32::try_from(s.len()) {
            Ok(len) => {
                self.buf.put_i32(len);
                self.buf.put_slice(s.as_bytes());
            }
            Err(_) => {
                warn!(len = s.len(), "string too long for thrift encoding, writing empty string");
                self.buf.put_i32(0);
            }
        }
    }

    #[inline]
    pub fn field_header(&mut self, type_code: u8, field_id: i16) {
        self.byte(type_code);
        self.i16(field_id);
    }

    /// Writes a list header. Callers that omit empty lists must skip this
    /// call entirely rather than passing a zero count.
    #[inline]
    pub fn list_header(&mut self, element_type: u8, count: i32) {
        self.byte(element_type);
        self.i32(count);
    }

    #[inline]
    pub fn struct_end(&mut self) {
        self.byte(ttype::STOP);
    }

    pub fn field_i32(&mut self, field_id: i16, v: i32) {
        self.field_header(ttype::I32, field_id);
        self.i32(v);
    }

    pub fn field_i64(&mut self, field_id: i16, v: i64) {
        self.field_header(ttype::I64, field_id);
        self.i64(v);
    }

    pub fn field_string(&mut self, field_id: i16, s: &str) {
        self.field_header(ttype::STRING, field_id);
        self.string(s);
    }

    /// Appends already-encoded bytes verbatim.
    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Clamps a collection length to the int32 list count.
#[inline]
pub(crate) fn list_count(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}
