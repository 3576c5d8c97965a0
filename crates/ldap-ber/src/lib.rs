//! BER (Basic Encoding Rules) runtime for the LDAP wire protocol
//!
//! LDAPv3 (RFC 4511 section 5.1) uses a restricted subset of BER:
//! - Definite-length form only
//! - Primitive OCTET STRING encoding only
//! - Low-tag-number identifiers (single octet)
//!
//! The writer in this crate emits the canonical (DER-like) form of that subset;
//! the reader tolerates the non-minimal length encodings real servers produce.

mod decode;
mod encode;
mod error;
mod primitives;
pub mod tag;

pub use decode::{BerDecode, BerReader};
pub use encode::{BerEncode, BerWriter};
pub use error::{BerError, Result};
pub use primitives::{frame_length, integer_octets, length_size, MAX_LENGTH_OCTETS};

/// Re-export bytes for convenience
pub use bytes::{Buf, BufMut, Bytes, BytesMut};
