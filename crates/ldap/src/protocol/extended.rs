//! Extended operation (RFC 4511 section 4.12) and unsolicited notifications
//! (section 4.4)

use super::message::{LdapMessage, ProtocolOp};
use super::result::{LdapResult, ResultCode};
use super::LdapOperation;
use crate::error::{LdapError, Result};
use bytes::Bytes;
use ldap_ber::{tag, BerReader, BerWriter};

/// responseName of the notice of disconnection
pub const NOTICE_OF_DISCONNECTION_OID: &str = "1.3.6.1.4.1.1466.20036";

const REQUEST_NAME: u8 = tag::context(0);
const REQUEST_VALUE: u8 = tag::context(1);
const RESPONSE_NAME: u8 = tag::context(10);
const RESPONSE_VALUE: u8 = tag::context(11);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedRequest {
    pub name: String,
    pub value: Option<Bytes>,
}

impl ExtendedRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl LdapOperation for ExtendedRequest {
    const TAG: u8 = tag::application_constructed(23);

    fn encode_content(&self, w: &mut BerWriter) {
        w.write_octet_string(REQUEST_NAME, self.name.as_bytes());
        if let Some(ref value) = self.value {
            w.write_octet_string(REQUEST_VALUE, value);
        }
    }

    fn decode_content(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        let name = r.read_string(REQUEST_NAME)?;
        let value = r
            .read_optional(REQUEST_VALUE)?
            .map(|v| Bytes::copy_from_slice(v.rest()));
        Ok(Self { name, value })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedResponse {
    pub result: LdapResult,
    pub name: Option<String>,
    pub value: Option<Bytes>,
}

impl ExtendedResponse {
    pub fn new(result: LdapResult) -> Self {
        Self {
            result,
            name: None,
            value: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl LdapOperation for ExtendedResponse {
    const TAG: u8 = tag::application_constructed(24);

    fn encode_content(&self, w: &mut BerWriter) {
        self.result.encode_fields(w);
        if let Some(ref name) = self.name {
            w.write_octet_string(RESPONSE_NAME, name.as_bytes());
        }
        if let Some(ref value) = self.value {
            w.write_octet_string(RESPONSE_VALUE, value);
        }
    }

    fn decode_content(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        let result = LdapResult::decode_fields(r)?;
        let name = match r.peek_tag() {
            Some(RESPONSE_NAME) => Some(r.read_string(RESPONSE_NAME)?),
            _ => None,
        };
        let value = r
            .read_optional(RESPONSE_VALUE)?
            .map(|v| Bytes::copy_from_slice(v.rest()));
        Ok(Self {
            result,
            name,
            value,
        })
    }
}

/// Extended response sent by the server without a request.
///
/// Unsolicited notifications always carry message ID zero; any attempt to
/// give one a different ID fails with `InvalidMessageId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsolicitedNotification {
    message_id: i32,
    response: ExtendedResponse,
}

impl UnsolicitedNotification {
    pub fn new(response: ExtendedResponse) -> Self {
        Self {
            message_id: 0,
            response,
        }
    }

    pub fn with_message_id(message_id: i32, response: ExtendedResponse) -> Result<Self> {
        let mut notification = Self::new(response);
        notification.set_message_id(message_id)?;
        Ok(notification)
    }

    /// Notice of disconnection with the given result
    pub fn notice_of_disconnection(code: ResultCode, diagnostic: impl Into<String>) -> Self {
        Self::new(
            ExtendedResponse::new(LdapResult::new(code).with_diagnostic(diagnostic))
                .with_name(NOTICE_OF_DISCONNECTION_OID),
        )
    }

    pub fn message_id(&self) -> i32 {
        self.message_id
    }

    pub fn set_message_id(&mut self, message_id: i32) -> Result<()> {
        if message_id != 0 {
            return Err(LdapError::InvalidMessageId(message_id));
        }
        self.message_id = message_id;
        Ok(())
    }

    pub fn response(&self) -> &ExtendedResponse {
        &self.response
    }

    pub fn is_notice_of_disconnection(&self) -> bool {
        self.response.name.as_deref() == Some(NOTICE_OF_DISCONNECTION_OID)
    }

    pub fn into_message(self) -> LdapMessage {
        LdapMessage::new(self.message_id, ProtocolOp::ExtendedResponse(self.response))
    }
}

impl TryFrom<LdapMessage> for UnsolicitedNotification {
    type Error = LdapError;

    fn try_from(message: LdapMessage) -> Result<Self> {
        match message.op {
            ProtocolOp::ExtendedResponse(response) => {
                Self::with_message_id(message.message_id, response)
            }
            other => Err(LdapError::UnexpectedResponse(format!(
                "{} is not an unsolicited notification",
                other.name()
            ))),
        }
    }
}
