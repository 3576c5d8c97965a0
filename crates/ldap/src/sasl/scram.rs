//! SCRAM-SHA-1 and SCRAM-SHA-256 (RFC 5802, RFC 7677)
//!
//! Channel binding is not supported; the GS2 header is always `n`.
//! Passwords are used as given, without SASLprep normalisation.

use super::{SaslMechanism, SaslRequest, QOP_PROPERTY};
use crate::error::SaslError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use ring::{digest, hmac, pbkdf2};
use std::num::NonZeroU32;
use zeroize::Zeroizing;

/// Hash function a SCRAM variant is built on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScramHash {
    Sha1,
    Sha256,
}

impl ScramHash {
    pub fn mechanism_name(self) -> &'static str {
        match self {
            Self::Sha1 => "SCRAM-SHA-1",
            Self::Sha256 => "SCRAM-SHA-256",
        }
    }

    fn hmac(self) -> hmac::Algorithm {
        match self {
            Self::Sha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256 => hmac::HMAC_SHA256,
        }
    }

    fn pbkdf2(self) -> pbkdf2::Algorithm {
        match self {
            Self::Sha1 => pbkdf2::PBKDF2_HMAC_SHA1,
            Self::Sha256 => pbkdf2::PBKDF2_HMAC_SHA256,
        }
    }

    fn digest(self) -> &'static digest::Algorithm {
        match self {
            Self::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256 => &digest::SHA256,
        }
    }

    fn output_len(self) -> usize {
        self.digest().output_len()
    }
}

enum State {
    Initial,
    ClientFirstSent {
        client_first_bare: String,
    },
    ClientFinalSent {
        server_key: hmac::Key,
        auth_message: String,
    },
    Complete,
    Failed,
}

pub struct ScramMechanism {
    hash: ScramHash,
    gs2_header: String,
    username: String,
    password: Zeroizing<String>,
    client_nonce: String,
    state: State,
}

impl ScramMechanism {
    pub fn new(hash: ScramHash, request: &SaslRequest) -> Result<Self, SaslError> {
        let nonce = STANDARD.encode(rand::random::<[u8; 24]>());
        Self::with_nonce(hash, request, nonce)
    }

    pub(crate) fn with_nonce(
        hash: ScramHash,
        request: &SaslRequest,
        client_nonce: String,
    ) -> Result<Self, SaslError> {
        request.require_auth_qop()?;
        let username = request
            .authentication_id
            .as_deref()
            .ok_or(SaslError::MissingCredential("authentication identity"))?;
        let password = request
            .password
            .clone()
            .ok_or(SaslError::MissingCredential("password"))?;
        let gs2_header = match &request.authorization_id {
            Some(authzid) => format!("n,a={},", escape_name(authzid)),
            None => "n,,".to_string(),
        };
        Ok(Self {
            hash,
            gs2_header,
            username: escape_name(username),
            password,
            client_nonce,
            state: State::Initial,
        })
    }

    fn client_first(&mut self) -> Bytes {
        let client_first_bare = format!("n={},r={}", self.username, self.client_nonce);
        let message = format!("{}{}", self.gs2_header, client_first_bare);
        self.state = State::ClientFirstSent { client_first_bare };
        Bytes::from(message)
    }

    fn client_final(&mut self, client_first_bare: &str, challenge: &[u8]) -> Result<Bytes, SaslError> {
        let server_first = std::str::from_utf8(challenge)
            .map_err(|_| SaslError::MalformedChallenge("server-first-message is not UTF-8".into()))?;
        let ServerFirst {
            nonce,
            salt,
            iterations,
        } = ServerFirst::parse(server_first)?;

        if nonce.len() <= self.client_nonce.len() || !nonce.starts_with(&self.client_nonce) {
            return Err(SaslError::ServerAuthentication(
                "server nonce does not extend the client nonce".into(),
            ));
        }

        let len = self.hash.output_len();
        let mut salted_password = Zeroizing::new(vec![0u8; len]);
        pbkdf2::derive(
            self.hash.pbkdf2(),
            iterations,
            &salt,
            self.password.as_bytes(),
            &mut salted_password,
        );

        let salted_key = hmac::Key::new(self.hash.hmac(), &salted_password);
        let client_key = Zeroizing::new(hmac::sign(&salted_key, b"Client Key").as_ref().to_vec());
        let stored_key = digest::digest(self.hash.digest(), &client_key);
        let server_key = hmac::Key::new(
            self.hash.hmac(),
            hmac::sign(&salted_key, b"Server Key").as_ref(),
        );

        let without_proof = format!(
            "c={},r={}",
            STANDARD.encode(self.gs2_header.as_bytes()),
            nonce
        );
        let auth_message = format!("{client_first_bare},{server_first},{without_proof}");

        let stored_key = hmac::Key::new(self.hash.hmac(), stored_key.as_ref());
        let client_signature = hmac::sign(&stored_key, auth_message.as_bytes());
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.as_ref())
            .map(|(k, s)| k ^ s)
            .collect();

        self.state = State::ClientFinalSent {
            server_key,
            auth_message,
        };
        Ok(Bytes::from(format!("{without_proof},p={}", STANDARD.encode(proof))))
    }

    fn verify_server_final(
        server_key: &hmac::Key,
        auth_message: &str,
        challenge: &[u8],
    ) -> Result<(), SaslError> {
        let server_final = std::str::from_utf8(challenge)
            .map_err(|_| SaslError::MalformedChallenge("server-final-message is not UTF-8".into()))?;
        let first = server_final.split(',').next().unwrap_or_default();
        if let Some(error) = first.strip_prefix("e=") {
            return Err(SaslError::ServerAuthentication(error.to_string()));
        }
        let verifier = first
            .strip_prefix("v=")
            .ok_or_else(|| SaslError::MalformedChallenge("missing server signature".into()))?;
        let signature = STANDARD
            .decode(verifier)
            .map_err(|e| SaslError::MalformedChallenge(format!("server signature: {e}")))?;
        hmac::verify(server_key, auth_message.as_bytes(), &signature)
            .map_err(|_| SaslError::ServerAuthentication("server signature mismatch".into()))
    }
}

impl SaslMechanism for ScramMechanism {
    fn mechanism_name(&self) -> &str {
        self.hash.mechanism_name()
    }

    fn has_initial_response(&self) -> bool {
        true
    }

    fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Option<Bytes>, SaslError> {
        // Any error leaves the mechanism Failed
        match std::mem::replace(&mut self.state, State::Failed) {
            State::Initial => Ok(Some(self.client_first())),
            State::ClientFirstSent { client_first_bare } => {
                self.client_final(&client_first_bare, challenge).map(Some)
            }
            State::ClientFinalSent {
                server_key,
                auth_message,
            } => {
                Self::verify_server_final(&server_key, &auth_message, challenge)?;
                self.state = State::Complete;
                Ok(None)
            }
            State::Complete if challenge.is_empty() => {
                self.state = State::Complete;
                Ok(None)
            }
            State::Complete => Err(SaslError::InvalidState("SCRAM exchange already complete")),
            State::Failed => Err(SaslError::InvalidState("SCRAM exchange failed")),
        }
    }

    fn is_complete(&self) -> bool {
        matches!(self.state, State::Complete)
    }

    fn negotiated_property(&self, name: &str) -> Option<String> {
        (self.is_complete() && name == QOP_PROPERTY).then(|| "auth".to_string())
    }

    fn dispose(&mut self) -> Result<(), SaslError> {
        self.password = Zeroizing::new(String::new());
        self.state = State::Failed;
        Ok(())
    }
}

struct ServerFirst<'a> {
    nonce: &'a str,
    salt: Vec<u8>,
    iterations: NonZeroU32,
}

impl<'a> ServerFirst<'a> {
    fn parse(message: &'a str) -> Result<Self, SaslError> {
        let malformed = |what: &str| SaslError::MalformedChallenge(what.to_string());
        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;

        for attribute in message.split(',') {
            match attribute.split_once('=') {
                Some(("m", _)) => return Err(malformed("unsupported mandatory extension")),
                Some(("r", value)) => nonce = Some(value),
                Some(("s", value)) => {
                    let decoded = STANDARD.decode(value).map_err(|_| malformed("invalid salt"))?;
                    if decoded.is_empty() {
                        return Err(malformed("empty salt"));
                    }
                    salt = Some(decoded);
                }
                Some(("i", value)) => {
                    let count = value
                        .parse::<u32>()
                        .ok()
                        .and_then(NonZeroU32::new)
                        .ok_or_else(|| malformed("invalid iteration count"))?;
                    iterations = Some(count);
                }
                Some(_) => {}
                None => return Err(malformed("attribute without value")),
            }
        }

        Ok(Self {
            nonce: nonce.ok_or_else(|| malformed("missing nonce"))?,
            salt: salt.ok_or_else(|| malformed("missing salt"))?,
            iterations: iterations.ok_or_else(|| malformed("missing iteration count"))?,
        })
    }
}

/// saslname escaping: '=' and ',' become =3D and =2C
fn escape_name(name: &str) -> String {
    name.replace('=', "=3D").replace(',', "=2C")
}
