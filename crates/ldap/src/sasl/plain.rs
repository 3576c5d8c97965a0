//! PLAIN mechanism (RFC 4616)

use super::{SaslMechanism, SaslRequest, QOP_PROPERTY};
use crate::error::SaslError;
use bytes::{BufMut, Bytes, BytesMut};
use zeroize::Zeroizing;

pub const MECHANISM: &str = "PLAIN";

pub struct PlainMechanism {
    authorization_id: String,
    authentication_id: String,
    password: Zeroizing<String>,
    complete: bool,
}

impl PlainMechanism {
    pub fn new(request: &SaslRequest) -> Result<Self, SaslError> {
        request.require_auth_qop()?;
        let authentication_id = request
            .authentication_id
            .clone()
            .ok_or(SaslError::MissingCredential("authentication identity"))?;
        let password = request
            .password
            .clone()
            .ok_or(SaslError::MissingCredential("password"))?;
        Ok(Self {
            authorization_id: request.authorization_id.clone().unwrap_or_default(),
            authentication_id,
            password,
            complete: false,
        })
    }
}

impl SaslMechanism for PlainMechanism {
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
            return Err(SaslError::InvalidState("PLAIN exchange already complete"));
        }

        // authzid NUL authcid NUL passwd
        let mut message = BytesMut::with_capacity(
            self.authorization_id.len() + self.authentication_id.len() + self.password.len() + 2,
        );
        message.put_slice(self.authorization_id.as_bytes());
        message.put_u8(0);
        message.put_slice(self.authentication_id.as_bytes());
        message.put_u8(0);
        message.put_slice(self.password.as_bytes());
        self.complete = true;
        Ok(Some(message.freeze()))
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn negotiated_property(&self, name: &str) -> Option<String> {
        (self.complete && name == QOP_PROPERTY).then(|| "auth".to_string())
    }

    fn dispose(&mut self) -> Result<(), SaslError> {
        self.password = Zeroizing::new(String::new());
        Ok(())
    }
}
