//! LDAPResult (RFC 4511 section 4.1.9)
//!
//! ```text
//! LDAPResult ::= SEQUENCE {
//!      resultCode         ENUMERATED,
//!      matchedDN          LDAPDN,
//!      diagnosticMessage  LDAPString,
//!      referral           [3] Referral OPTIONAL }
//! ```

use ldap_ber::{tag, BerReader, BerWriter};
use std::fmt;

/// `referral [3]` inside an LDAPResult
pub const REFERRAL: u8 = tag::context_constructed(3);

macro_rules! result_codes {
    ($($variant:ident = $value:literal => $name:literal,)*) => {
        /// LDAP result codes
        ///
        /// Codes not listed here are preserved in `Other`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ResultCode {
            $($variant,)*
            Other(i64),
        }

        impl ResultCode {
            pub fn from_i64(value: i64) -> Self {
                match value {
                    $($value => Self::$variant,)*
                    other => Self::Other(other),
                }
            }

            pub fn as_i64(&self) -> i64 {
                match self {
                    $(Self::$variant => $value,)*
                    Self::Other(value) => *value,
                }
            }

            fn name(&self) -> Option<&'static str> {
                match self {
                    $(Self::$variant => Some($name),)*
                    Self::Other(_) => None,
                }
            }
        }
    };
}

result_codes! {
    Success = 0 => "success",
    OperationsError = 1 => "operationsError",
    ProtocolError = 2 => "protocolError",
    TimeLimitExceeded = 3 => "timeLimitExceeded",
    SizeLimitExceeded = 4 => "sizeLimitExceeded",
    CompareFalse = 5 => "compareFalse",
    CompareTrue = 6 => "compareTrue",
    AuthMethodNotSupported = 7 => "authMethodNotSupported",
    StrongerAuthRequired = 8 => "strongerAuthRequired",
    Referral = 10 => "referral",
    AdminLimitExceeded = 11 => "adminLimitExceeded",
    UnavailableCriticalExtension = 12 => "unavailableCriticalExtension",
    ConfidentialityRequired = 13 => "confidentialityRequired",
    SaslBindInProgress = 14 => "saslBindInProgress",
    NoSuchAttribute = 16 => "noSuchAttribute",
    UndefinedAttributeType = 17 => "undefinedAttributeType",
    InappropriateMatching = 18 => "inappropriateMatching",
    ConstraintViolation = 19 => "constraintViolation",
    AttributeOrValueExists = 20 => "attributeOrValueExists",
    InvalidAttributeSyntax = 21 => "invalidAttributeSyntax",
    NoSuchObject = 32 => "noSuchObject",
    AliasProblem = 33 => "aliasProblem",
    InvalidDnSyntax = 34 => "invalidDNSyntax",
    AliasDereferencingProblem = 36 => "aliasDereferencingProblem",
    InappropriateAuthentication = 48 => "inappropriateAuthentication",
    InvalidCredentials = 49 => "invalidCredentials",
    InsufficientAccessRights = 50 => "insufficientAccessRights",
    Busy = 51 => "busy",
    Unavailable = 52 => "unavailable",
    UnwillingToPerform = 53 => "unwillingToPerform",
    LoopDetect = 54 => "loopDetect",
    NamingViolation = 64 => "namingViolation",
    ObjectClassViolation = 65 => "objectClassViolation",
    NotAllowedOnNonLeaf = 66 => "notAllowedOnNonLeaf",
    NotAllowedOnRdn = 67 => "notAllowedOnRDN",
    EntryAlreadyExists = 68 => "entryAlreadyExists",
    ObjectClassModsProhibited = 69 => "objectClassModsProhibited",
    AffectsMultipleDsas = 71 => "affectsMultipleDSAs",
    OtherError = 80 => "other",
}

impl ResultCode {
    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.as_i64()),
            None => write!(f, "{}", self.as_i64()),
        }
    }
}

/// Common result fields of every response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapResult {
    pub result_code: ResultCode,
    pub matched_dn: String,
    pub diagnostic_message: String,
    pub referrals: Vec<String>,
}

impl LdapResult {
    pub fn new(result_code: ResultCode) -> Self {
        Self {
            result_code,
            matched_dn: String::new(),
            diagnostic_message: String::new(),
            referrals: Vec::new(),
        }
    }

    pub fn success() -> Self {
        Self::new(ResultCode::Success)
    }

    pub fn with_diagnostic(mut self, message: impl Into<String>) -> Self {
        self.diagnostic_message = message.into();
        self
    }

    /// Write the result components into an enclosing response element
    pub(crate) fn encode_fields(&self, w: &mut BerWriter) {
        w.write_enumerated(self.result_code.as_i64());
        w.write_octet_string(tag::OCTET_STRING, self.matched_dn.as_bytes());
        w.write_octet_string(tag::OCTET_STRING, self.diagnostic_message.as_bytes());
        if !self.referrals.is_empty() {
            w.write_constructed(REFERRAL, |w| {
                for url in &self.referrals {
                    w.write_octet_string(tag::OCTET_STRING, url.as_bytes());
                }
            });
        }
    }

    /// Read the result components from an enclosing response element
    pub(crate) fn decode_fields(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        let result_code = ResultCode::from_i64(r.read_integer(tag::ENUMERATED)?);
        let matched_dn = r.read_string(tag::OCTET_STRING)?;
        let diagnostic_message = r.read_string(tag::OCTET_STRING)?;
        let mut referrals = Vec::new();
        if let Some(mut refs) = r.read_optional(REFERRAL)? {
            while !refs.is_empty() {
                referrals.push(refs.read_string(tag::OCTET_STRING)?);
            }
        }
        Ok(Self {
            result_code,
            matched_dn,
            diagnostic_message,
            referrals,
        })
    }
}
