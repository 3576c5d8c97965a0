//! LDAPv3 protocol data units (RFC 4511)
//!
//! Every PDU travels inside an `LDAPMessage` envelope:
//!
//! ```text
//! LDAPMessage ::= SEQUENCE {
//!      messageID       MessageID,
//!      protocolOp      CHOICE { bindRequest BindRequest, ... },
//!      controls       [0] Controls OPTIONAL }
//! ```
//!
//! Encoding is canonical: definite minimal lengths, fields in schema order,
//! absent OPTIONAL fields omitted and DEFAULT values left out.

mod bind;
mod compare;
mod control;
mod extended;
mod message;
mod result;
mod search;

pub use bind::{Authentication, BindRequest, BindResponse, LDAP_VERSION_3};
pub use compare::{CompareRequest, CompareResponse};
pub use control::Control;
pub use extended::{
    ExtendedRequest, ExtendedResponse, UnsolicitedNotification, NOTICE_OF_DISCONNECTION_OID,
};
pub use message::{AbandonRequest, LdapMessage, ProtocolOp, UnbindRequest};
pub use result::{LdapResult, ResultCode};
pub use search::{
    DerefAliases, Filter, PartialAttribute, SearchRequest, SearchResultDone,
    SearchResultEntry, SearchResultReference, SearchScope, SubstringFilter, MAX_FILTER_DEPTH,
};

use bytes::Bytes;
use ldap_ber::{BerReader, BerWriter};

/// A protocolOp alternative of the LDAPMessage CHOICE
pub trait LdapOperation: Sized {
    /// Application tag identifying the operation
    const TAG: u8;

    /// Write the content octets of the operation element (without its tag
    /// and length)
    fn encode_content(&self, w: &mut BerWriter);

    /// Parse the content octets of the operation element
    fn decode_content(r: &mut BerReader<'_>) -> ldap_ber::Result<Self>;

    /// Encode this operation as a complete LDAPMessage without controls
    fn encode(&self, message_id: i32) -> Bytes {
        let mut w = BerWriter::new();
        message::write_envelope(&mut w, message_id, &[], |w| {
            w.write_constructed(Self::TAG, |w| self.encode_content(w));
        });
        w.into_bytes()
    }
}
