//! Compare operation (RFC 4511 section 4.10)
//!
//! ```text
//! CompareRequest ::= [APPLICATION 14] SEQUENCE {
//!      entry           LDAPDN,
//!      ava             AttributeValueAssertion }
//!
//! CompareResponse ::= [APPLICATION 15] LDAPResult
//! ```

use super::result::{LdapResult, ResultCode};
use super::LdapOperation;
use bytes::Bytes;
use ldap_ber::{tag, BerReader, BerWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareRequest {
    pub entry: String,
    pub attribute: String,
    pub value: Bytes,
}

impl CompareRequest {
    pub fn new(
        entry: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            entry: entry.into(),
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

impl LdapOperation for CompareRequest {
    const TAG: u8 = tag::application_constructed(14);

    fn encode_content(&self, w: &mut BerWriter) {
        w.write_octet_string(tag::OCTET_STRING, self.entry.as_bytes());
        w.write_sequence(|w| {
            w.write_octet_string(tag::OCTET_STRING, self.attribute.as_bytes());
            w.write_octet_string(tag::OCTET_STRING, &self.value);
        });
    }

    fn decode_content(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        let entry = r.read_string(tag::OCTET_STRING)?;
        let mut ava = r.read_element(tag::SEQUENCE)?;
        let attribute = ava.read_string(tag::OCTET_STRING)?;
        let value = ava.read_bytes(tag::OCTET_STRING)?;
        ava.finish()?;
        Ok(Self {
            entry,
            attribute,
            value,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareResponse {
    pub result: LdapResult,
}

impl CompareResponse {
    /// `Some(true)` for compareTrue, `Some(false)` for compareFalse, `None`
    /// for any other result
    pub fn matched(&self) -> Option<bool> {
        match self.result.result_code {
            ResultCode::CompareTrue => Some(true),
            ResultCode::CompareFalse => Some(false),
            _ => None,
        }
    }
}

impl LdapOperation for CompareResponse {
    const TAG: u8 = tag::application_constructed(15);

    fn encode_content(&self, w: &mut BerWriter) {
        self.result.encode_fields(w);
    }

    fn decode_content(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        Ok(Self {
            result: LdapResult::decode_fields(r)?,
        })
    }
}
