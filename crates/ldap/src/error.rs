//! Error types for the LDAP client

use crate::protocol::ResultCode;
use ldap_ber::BerError;
use thiserror::Error;

/// LDAP client error types
#[derive(Debug, Error)]
pub enum LdapError {
    /// Malformed endpoint string or invalid configuration value
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The strategy has no endpoint left to try
    #[error("no available endpoints ({attempted} attempted){}", .last_error.as_deref().map(|e| format!(", last error: {e}")).unwrap_or_default())]
    NoAvailableEndpoints {
        attempted: usize,
        last_error: Option<String>,
    },

    /// Wire-format violation detected by the codec
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] BerError),

    /// SASL negotiation failed; the mechanism has been disposed
    #[error("SASL negotiation failed for {mechanism}: {cause}")]
    Negotiation {
        mechanism: String,
        #[source]
        cause: NegotiationFailure,
    },

    #[error("unsupported SASL mechanism: {0}")]
    UnsupportedMechanism(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeout")]
    Timeout,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("message too large: {size} bytes exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("message ID mismatch: expected {expected}, got {got}")]
    MessageIdMismatch { expected: i32, got: i32 },

    #[error("invalid message ID: {0}")]
    InvalidMessageId(i32),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Server answered with a non-success result code
    #[error("operation failed: {code}{}", if .diagnostic.is_empty() { String::new() } else { format!(" ({})", .diagnostic) })]
    OperationFailed { code: ResultCode, diagnostic: String },
}

impl LdapError {
    /// True for failures of the transport itself.
    ///
    /// These are the only errors that count against an endpoint's health.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Io(_) | Self::Timeout | Self::ConnectionClosed => true,
            Self::Negotiation {
                cause: NegotiationFailure::Transport(inner),
                ..
            } => inner.is_transport(),
            _ => false,
        }
    }
}

/// Root cause of a failed SASL negotiation
#[derive(Debug, Error)]
pub enum NegotiationFailure {
    /// The mechanism could not evaluate a challenge or build a response
    #[error("mechanism error: {0}")]
    Mechanism(#[from] SaslError),

    /// The mechanism produced client data after the server reported success
    #[error("received response after completion")]
    UnexpectedCompletion,

    /// The server ended the exchange with a non-success result
    #[error("bind rejected: {code}{}", if .diagnostic.is_empty() { String::new() } else { format!(" ({})", .diagnostic) })]
    Rejected { code: ResultCode, diagnostic: String },

    /// Sending the bind or awaiting its response failed
    #[error("{0}")]
    Transport(Box<LdapError>),
}

/// Mechanism-local SASL failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaslError {
    #[error("malformed server challenge: {0}")]
    MalformedChallenge(String),

    #[error("server authentication failed: {0}")]
    ServerAuthentication(String),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("invalid mechanism state: {0}")]
    InvalidState(&'static str),

    #[error("mechanism error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LdapError>;
