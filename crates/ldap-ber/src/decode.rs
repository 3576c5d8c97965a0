//! BER decoding
//!
//! `BerReader` walks a borrowed buffer. Child readers returned for constructed
//! elements remember their absolute position so errors deep inside a message
//! still report the offset relative to the start of the whole message.

use crate::error::{BerError, Result};
use crate::primitives::{read_integer, read_length};
use bytes::Bytes;

/// Trait for types that can be decoded from a BER element
pub trait BerDecode: Sized {
    /// Decode one value, consuming its TLV from the reader
    fn ber_decode(reader: &mut BerReader<'_>) -> Result<Self>;

    /// Decode a value that must span the whole buffer
    fn from_ber(data: &[u8]) -> Result<Self> {
        let mut reader = BerReader::new(data);
        let value = Self::ber_decode(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

/// Cursor over BER-encoded bytes
#[derive(Debug, Clone)]
pub struct BerReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> BerReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
        }
    }

    fn child(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    /// Absolute offset of the next unread byte
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Unread bytes
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Identifier of the next element, if any
    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Read the next element of any tag.
    ///
    /// Returns the identifier, the absolute offset of the identifier, and a
    /// reader over the element's content.
    pub fn read_any(&mut self) -> Result<(u8, usize, BerReader<'a>)> {
        let tag_offset = self.offset();
        let tag = self.peek_tag().ok_or(BerError::Truncated {
            offset: tag_offset,
            needed: 1,
            have: 0,
        })?;
        let (length, consumed) = read_length(&self.data[self.pos + 1..], tag_offset + 1)?;
        let start = self.pos + 1 + consumed;
        let available = self.data.len() - start;
        if length > available {
            return Err(BerError::Truncated {
                offset: tag_offset,
                needed: 1 + consumed + length,
                have: self.remaining(),
            });
        }
        let content = &self.data[start..start + length];
        let child = BerReader::child(content, self.base + start);
        self.pos = start + length;
        Ok((tag, tag_offset, child))
    }

    /// Read the next element, which must carry `expected`
    pub fn read_element(&mut self, expected: u8) -> Result<BerReader<'a>> {
        match self.peek_tag() {
            Some(found) if found != expected => Err(BerError::UnexpectedTag {
                offset: self.offset(),
                expected,
                found,
            }),
            _ => {
                let (_, _, content) = self.read_any()?;
                Ok(content)
            }
        }
    }

    /// Read the next element only if it carries `tag`
    pub fn read_optional(&mut self, tag: u8) -> Result<Option<BerReader<'a>>> {
        if self.peek_tag() == Some(tag) {
            self.read_element(tag).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn read_integer(&mut self, tag: u8) -> Result<i64> {
        let content = self.read_element(tag)?;
        read_integer(content.data, content.base)
    }

    /// Read an integer that must fit in `i32`
    pub fn read_i32(&mut self, tag: u8) -> Result<i32> {
        let offset = self.offset();
        let value = self.read_integer(tag)?;
        i32::try_from(value).map_err(|_| BerError::IntegerOverflow { offset })
    }

    pub fn read_bool(&mut self, tag: u8) -> Result<bool> {
        let content = self.read_element(tag)?;
        match content.data {
            [b] => Ok(*b != 0),
            _ => Err(BerError::InvalidValue {
                offset: content.base,
                reason: format!("BOOLEAN with {} content octets", content.data.len()),
            }),
        }
    }

    pub fn read_null(&mut self, tag: u8) -> Result<()> {
        let content = self.read_element(tag)?;
        if !content.data.is_empty() {
            return Err(BerError::InvalidValue {
                offset: content.base,
                reason: "NULL with content".to_string(),
            });
        }
        Ok(())
    }

    /// Borrow the content octets of the next element
    pub fn read_octets(&mut self, tag: u8) -> Result<&'a [u8]> {
        Ok(self.read_element(tag)?.data)
    }

    /// Copy the content octets of the next element
    pub fn read_bytes(&mut self, tag: u8) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(self.read_octets(tag)?))
    }

    /// Read UTF-8 content octets
    pub fn read_string(&mut self, tag: u8) -> Result<String> {
        let content = self.read_element(tag)?;
        std::str::from_utf8(content.data)
            .map(str::to_owned)
            .map_err(|e| BerError::InvalidUtf8 {
                offset: content.base + e.valid_up_to(),
            })
    }

    /// Interpret every unread byte as INTEGER content octets.
    ///
    /// Used on the content of a primitive element that implicitly tags an
    /// integer, such as `AbandonRequest ::= [APPLICATION 16] MessageID`.
    pub fn read_integer_content(&mut self) -> Result<i64> {
        let offset = self.offset();
        let value = read_integer(self.rest(), offset)?;
        self.pos = self.data.len();
        Ok(value)
    }

    /// Fail if anything is left unread
    pub fn finish(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(BerError::TrailingBytes {
                offset: self.offset(),
                count: self.remaining(),
            })
        }
    }
}
