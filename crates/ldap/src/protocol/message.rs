use super::bind::{BindRequest, BindResponse};
use super::compare::{CompareRequest, CompareResponse};
use super::control::{decode_controls, encode_controls, Control};
use super::extended::{ExtendedRequest, ExtendedResponse};
use super::search::{SearchRequest, SearchResultDone, SearchResultEntry, SearchResultReference};
use super::LdapOperation;
use crate::error::Result;
use bytes::Bytes;
use ldap_ber::{tag, BerDecode, BerEncode, BerError, BerReader, BerWriter};

/// `UnbindRequest ::= [APPLICATION 2] NULL`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnbindRequest;

impl LdapOperation for UnbindRequest {
    const TAG: u8 = tag::application(2);

    fn encode_content(&self, _w: &mut BerWriter) {}

    fn decode_content(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        r.finish()?;
        Ok(Self)
    }
}

/// `AbandonRequest ::= [APPLICATION 16] MessageID`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbandonRequest {
    pub message_id: i32,
}

impl LdapOperation for AbandonRequest {
    const TAG: u8 = tag::application(16);

    fn encode_content(&self, w: &mut BerWriter) {
        w.write_raw(&ldap_ber::integer_octets(self.message_id as i64));
    }

    fn decode_content(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        let offset = r.offset();
        let value = r.read_integer_content()?;
        let message_id = i32::try_from(value).map_err(|_| BerError::IntegerOverflow { offset })?;
        Ok(Self { message_id })
    }
}

/// The protocolOp CHOICE
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolOp {
    BindRequest(BindRequest),
    BindResponse(BindResponse),
    UnbindRequest(UnbindRequest),
    SearchRequest(SearchRequest),
    SearchResultEntry(SearchResultEntry),
    SearchResultDone(SearchResultDone),
    SearchResultReference(SearchResultReference),
    CompareRequest(CompareRequest),
    CompareResponse(CompareResponse),
    AbandonRequest(AbandonRequest),
    ExtendedRequest(ExtendedRequest),
    ExtendedResponse(ExtendedResponse),
    /// Operation this client does not model, kept verbatim
    Other { tag: u8, content: Bytes },
}

macro_rules! protocol_ops {
    ($($variant:ident),*) => {
        impl ProtocolOp {
            /// Identifier octet of the operation element
            pub fn tag(&self) -> u8 {
                match self {
                    $(Self::$variant(_) => <$variant as LdapOperation>::TAG,)*
                    Self::Other { tag, .. } => *tag,
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => stringify!($variant),)*
                    Self::Other { .. } => "Other",
                }
            }

            fn encode_content(&self, w: &mut BerWriter) {
                match self {
                    $(Self::$variant(op) => op.encode_content(w),)*
                    Self::Other { content, .. } => w.write_raw(content),
                }
            }

            fn decode(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
                let (found, _, mut content) = r.read_any()?;
                let op = $(if found == <$variant as LdapOperation>::TAG {
                    Self::$variant($variant::decode_content(&mut content)?)
                } else)* {
                    return Ok(Self::Other {
                        tag: found,
                        content: Bytes::copy_from_slice(content.rest()),
                    });
                };
                content.finish()?;
                Ok(op)
            }
        }

        $(
            impl From<$variant> for ProtocolOp {
                fn from(op: $variant) -> Self {
                    Self::$variant(op)
                }
            }
        )*
    };
}

protocol_ops!(
    BindRequest,
    BindResponse,
    UnbindRequest,
    SearchRequest,
    SearchResultEntry,
    SearchResultDone,
    SearchResultReference,
    CompareRequest,
    CompareResponse,
    AbandonRequest,
    ExtendedRequest,
    ExtendedResponse
);

/// LDAPMessage envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapMessage {
    pub message_id: i32,
    pub op: ProtocolOp,
    pub controls: Vec<Control>,
}

impl LdapMessage {
    pub fn new(message_id: i32, op: impl Into<ProtocolOp>) -> Self {
        Self {
            message_id,
            op: op.into(),
            controls: Vec::new(),
        }
    }

    pub fn with_controls(mut self, controls: Vec<Control>) -> Self {
        self.controls = controls;
        self
    }

    /// Message ID zero is reserved for unsolicited notifications
    pub fn is_unsolicited(&self) -> bool {
        self.message_id == 0 && matches!(self.op, ProtocolOp::ExtendedResponse(_))
    }

    pub fn encode(&self) -> Bytes {
        self.to_ber()
    }

    /// Decode exactly one message; trailing bytes are an error
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(Self::from_ber(data)?)
    }
}

pub(crate) fn write_envelope<F>(w: &mut BerWriter, message_id: i32, controls: &[Control], op: F)
where
    F: FnOnce(&mut BerWriter),
{
    w.write_sequence(|w| {
        w.write_integer(tag::INTEGER, message_id as i64);
        op(w);
        encode_controls(w, controls);
    });
}

impl BerEncode for LdapMessage {
    fn ber_encode(&self, w: &mut BerWriter) {
        write_envelope(w, self.message_id, &self.controls, |w| {
            w.write_constructed(self.op.tag(), |w| self.op.encode_content(w));
        });
    }
}

impl BerDecode for LdapMessage {
    fn ber_decode(reader: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        let mut seq = reader.read_element(tag::SEQUENCE)?;
        let offset = seq.offset();
        let message_id = seq.read_i32(tag::INTEGER)?;
        if message_id < 0 {
            return Err(BerError::InvalidValue {
                offset,
                reason: format!("negative message ID {message_id}"),
            });
        }
        let op = ProtocolOp::decode(&mut seq)?;
        let controls = decode_controls(&mut seq)?;
        seq.finish()?;
        Ok(Self {
            message_id,
            op,
            controls,
        })
    }
}
