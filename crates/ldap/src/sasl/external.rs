//! EXTERNAL mechanism (RFC 4422 appendix A)
//!
//! Credentials come from the transport, typically a TLS client certificate.
//! The only client message is the optional authorization identity.

use super::{SaslMechanism, SaslRequest, QOP_PROPERTY};
use crate::error::SaslError;
use bytes::Bytes;

pub const MECHANISM: &str = "EXTERNAL";

#[derive(Debug)]
pub struct ExternalMechanism {
    authorization_id: Option<String>,
    complete: bool,
}

impl ExternalMechanism {
    pub fn new(request: &SaslRequest) -> Result<Self, SaslError> {
        request.require_auth_qop()?;
        Ok(Self {
            authorization_id: request.authorization_id.clone(),
            complete: false,
        })
    }
}

impl SaslMechanism for ExternalMechanism {
    fn mechanism_name(&self) -> &str {
        MECHANISM
    }

    fn has_initial_response(&self) -> bool {
        true
    }

    fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Option<Bytes>, SaslError> {
        if self.complete {
            if challenge.is_empty() {
                return Ok(None);
            }
            return Err(SaslError::InvalidState("EXTERNAL exchange already complete"));
        }
        self.complete = true;
        let authzid = self.authorization_id.as_deref().unwrap_or_default();
        Ok(Some(Bytes::copy_from_slice(authzid.as_bytes())))
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn negotiated_property(&self, name: &str) -> Option<String> {
        (self.complete && name == QOP_PROPERTY).then(|| "auth".to_string())
    }

    fn dispose(&mut self) -> Result<(), SaslError> {
        self.authorization_id = None;
        Ok(())
    }
}
