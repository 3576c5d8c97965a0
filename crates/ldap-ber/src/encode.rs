//! BER encoding
//!
//! `BerWriter` always produces definite-length, minimal encodings: nested
//! elements are built into a child writer first so the parent can emit the
//! exact length ahead of the content.

use crate::primitives::{integer_octets, put_length};
use crate::tag;
use bytes::{BufMut, Bytes, BytesMut};

/// Trait for types that can be encoded as a BER element
pub trait BerEncode {
    /// Append this value's TLV encoding to the writer
    fn ber_encode(&self, writer: &mut BerWriter);

    /// Encode into a freshly allocated buffer
    fn to_ber(&self) -> Bytes {
        let mut writer = BerWriter::new();
        self.ber_encode(&mut writer);
        writer.into_bytes()
    }
}

/// Accumulates BER elements
#[derive(Debug, Default)]
pub struct BerWriter {
    buf: BytesMut,
}

impl BerWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(64),
        }
    }

    /// Write a complete TLV with the given identifier and content
    pub fn write_tlv(&mut self, tag: u8, content: &[u8]) {
        self.buf.put_u8(tag);
        put_length(&mut self.buf, content.len());
        self.buf.put_slice(content);
    }

    /// Write an INTEGER (or any integer-shaped element under an implicit tag)
    pub fn write_integer(&mut self, tag: u8, value: i64) {
        self.write_tlv(tag, &integer_octets(value));
    }

    /// Write an ENUMERATED
    pub fn write_enumerated(&mut self, value: i64) {
        self.write_integer(tag::ENUMERATED, value);
    }

    /// Write an OCTET STRING (or implicitly tagged octets)
    pub fn write_octet_string(&mut self, tag: u8, value: &[u8]) {
        self.write_tlv(tag, value);
    }

    /// Write a BOOLEAN using the DER value for true
    pub fn write_bool(&mut self, tag: u8, value: bool) {
        self.write_tlv(tag, &[if value { 0xff } else { 0x00 }]);
    }

    /// Write a zero-length element
    pub fn write_null(&mut self, tag: u8) {
        self.write_tlv(tag, &[]);
    }

    /// Write a constructed element whose content is produced by `f`
    pub fn write_constructed<F>(&mut self, tag: u8, f: F)
    where
        F: FnOnce(&mut BerWriter),
    {
        let mut inner = BerWriter::new();
        f(&mut inner);
        self.write_tlv(tag, &inner.buf);
    }

    /// Write a universal SEQUENCE
    pub fn write_sequence<F>(&mut self, f: F)
    where
        F: FnOnce(&mut BerWriter),
    {
        self.write_constructed(tag::SEQUENCE, f);
    }

    /// Append an already-encoded element verbatim
    pub fn write_raw(&mut self, encoded: &[u8]) {
        self.buf.put_slice(encoded);
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
