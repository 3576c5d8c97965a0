//! Bind operation (RFC 4511 section 4.2)
//!
//! ```text
//! BindRequest ::= [APPLICATION 0] SEQUENCE {
//!      version                 INTEGER (1 ..  127),
//!      name                    LDAPDN,
//!      authentication          AuthenticationChoice }
//!
//! AuthenticationChoice ::= CHOICE {
//!      simple                  [0] OCTET STRING,
//!      sasl                    [3] SaslCredentials }
//!
//! BindResponse ::= [APPLICATION 1] SEQUENCE {
//!      COMPONENTS OF LDAPResult,
//!      serverSaslCreds    [7] OCTET STRING OPTIONAL }
//! ```

use super::result::LdapResult;
use super::LdapOperation;
use bytes::Bytes;
use ldap_ber::{tag, BerError, BerReader, BerWriter};
use std::fmt;

pub const LDAP_VERSION_3: i32 = 3;

const AUTH_SIMPLE: u8 = tag::context(0);
const AUTH_SASL: u8 = tag::context_constructed(3);
const SERVER_SASL_CREDS: u8 = tag::context(7);

/// Authentication choice of a bind request
#[derive(Clone, PartialEq, Eq)]
pub enum Authentication {
    Simple(Bytes),
    Sasl {
        mechanism: String,
        credentials: Option<Bytes>,
    },
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(_) => f.write_str("Simple(<redacted>)"),
            Self::Sasl {
                mechanism,
                credentials,
            } => f
                .debug_struct("Sasl")
                .field("mechanism", mechanism)
                .field("credentials", &credentials.as_ref().map(|c| c.len()))
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub version: i32,
    pub name: String,
    pub authentication: Authentication,
}

impl BindRequest {
    pub fn simple(name: impl Into<String>, password: impl Into<Bytes>) -> Self {
        Self {
            version: LDAP_VERSION_3,
            name: name.into(),
            authentication: Authentication::Simple(password.into()),
        }
    }

    /// SASL bind; the name is empty since the identity travels in the
    /// mechanism's credentials
    pub fn sasl(mechanism: impl Into<String>, credentials: Option<Bytes>) -> Self {
        Self {
            version: LDAP_VERSION_3,
            name: String::new(),
            authentication: Authentication::Sasl {
                mechanism: mechanism.into(),
                credentials,
            },
        }
    }
}

impl LdapOperation for BindRequest {
    const TAG: u8 = tag::application_constructed(0);

    fn encode_content(&self, w: &mut BerWriter) {
        w.write_integer(tag::INTEGER, self.version as i64);
        w.write_octet_string(tag::OCTET_STRING, self.name.as_bytes());
        match &self.authentication {
            Authentication::Simple(password) => w.write_octet_string(AUTH_SIMPLE, password),
            Authentication::Sasl {
                mechanism,
                credentials,
            } => w.write_constructed(AUTH_SASL, |w| {
                w.write_octet_string(tag::OCTET_STRING, mechanism.as_bytes());
                if let Some(credentials) = credentials {
                    w.write_octet_string(tag::OCTET_STRING, credentials);
                }
            }),
        }
    }

    fn decode_content(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        let version = r.read_i32(tag::INTEGER)?;
        let name = r.read_string(tag::OCTET_STRING)?;
        let offset = r.offset();
        let authentication = match r.peek_tag() {
            Some(AUTH_SIMPLE) => Authentication::Simple(r.read_bytes(AUTH_SIMPLE)?),
            Some(AUTH_SASL) => {
                let mut sasl = r.read_element(AUTH_SASL)?;
                let mechanism = sasl.read_string(tag::OCTET_STRING)?;
                let credentials = sasl
                    .read_optional(tag::OCTET_STRING)?
                    .map(|c| Bytes::copy_from_slice(c.rest()));
                sasl.finish()?;
                Authentication::Sasl {
                    mechanism,
                    credentials,
                }
            }
            Some(found) => {
                return Err(BerError::UnexpectedTag {
                    offset,
                    expected: AUTH_SIMPLE,
                    found,
                })
            }
            None => {
                return Err(BerError::Truncated {
                    offset,
                    needed: 1,
                    have: 0,
                })
            }
        };
        Ok(Self {
            version,
            name,
            authentication,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindResponse {
    pub result: LdapResult,
    pub server_sasl_creds: Option<Bytes>,
}

impl BindResponse {
    pub fn new(result: LdapResult) -> Self {
        Self {
            result,
            server_sasl_creds: None,
        }
    }

    pub fn with_server_sasl_creds(mut self, creds: impl Into<Bytes>) -> Self {
        self.server_sasl_creds = Some(creds.into());
        self
    }
}

impl LdapOperation for BindResponse {
    const TAG: u8 = tag::application_constructed(1);

    fn encode_content(&self, w: &mut BerWriter) {
        self.result.encode_fields(w);
        if let Some(ref creds) = self.server_sasl_creds {
            w.write_octet_string(SERVER_SASL_CREDS, creds);
        }
    }

    fn decode_content(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        let result = LdapResult::decode_fields(r)?;
        let server_sasl_creds = r
            .read_optional(SERVER_SASL_CREDS)?
            .map(|c| Bytes::copy_from_slice(c.rest()));
        Ok(Self {
            result,
            server_sasl_creds,
        })
    }
}
