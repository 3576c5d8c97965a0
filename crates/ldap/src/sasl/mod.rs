//! SASL bind negotiation (RFC 4513 section 5.2.1)
//!
//! A [`SaslClient`] drives one multi-round bind exchange:
//!
//! ```text
//! NotStarted --bind--> ChallengeSent --+--> AwaitingServer --+--> Complete
//!                                      |        ^     |      |
//!                                      |        +-----+      +--> Failed
//!                                      +--> Complete | Failed
//! ```
//!
//! The mechanism is disposed on every exit path: explicit `dispose`, failure,
//! abandonment of an in-flight bind, or drop of the client.

mod external;
mod mechanism;
mod plain;
mod scram;

pub use crate::error::SaslError;
pub use external::ExternalMechanism;
pub use mechanism::{
    MechanismFactory, MechanismRegistry, MechanismResult, SaslMechanism, QOP_PROPERTY,
};
pub use plain::PlainMechanism;
pub use scram::{ScramHash, ScramMechanism};

use crate::error::{LdapError, NegotiationFailure, Result};
use crate::protocol::{BindRequest, BindResponse, ResultCode};
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Sends one bind request and returns its correlated response
pub trait BindOperation {
    fn bind(&mut self, request: BindRequest) -> impl Future<Output = Result<BindResponse>> + Send;
}

/// SASL security layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityOfProtection {
    /// Authentication only
    Auth,
    /// Authentication with integrity protection
    AuthInt,
    /// Authentication with integrity and confidentiality protection
    AuthConf,
}

impl QualityOfProtection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::AuthInt => "auth-int",
            Self::AuthConf => "auth-conf",
        }
    }
}

impl fmt::Display for QualityOfProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityOfProtection {
    type Err = SaslError;

    fn from_str(s: &str) -> std::result::Result<Self, SaslError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auth" => Ok(Self::Auth),
            "auth-int" => Ok(Self::AuthInt),
            "auth-conf" => Ok(Self::AuthConf),
            other => Err(SaslError::Other(format!("unknown quality of protection '{other}'"))),
        }
    }
}

/// Parameters of a SASL bind
#[derive(Clone)]
pub struct SaslRequest {
    pub mechanism: String,
    pub authorization_id: Option<String>,
    pub authentication_id: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub realm: Option<String>,
    /// Mechanism properties, e.g. [`QOP_PROPERTY`] with a comma-separated
    /// preference list
    pub properties: HashMap<String, String>,
}

impl SaslRequest {
    pub fn new(mechanism: impl Into<String>) -> Self {
        Self {
            mechanism: mechanism.into(),
            authorization_id: None,
            authentication_id: None,
            password: None,
            realm: None,
            properties: HashMap::new(),
        }
    }

    pub fn with_authorization_id(mut self, authzid: impl Into<String>) -> Self {
        self.authorization_id = Some(authzid.into());
        self
    }

    pub fn with_credentials(mut self, authcid: impl Into<String>, password: impl Into<String>) -> Self {
        self.authentication_id = Some(authcid.into());
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Requested protection levels in preference order; `auth` if unset
    pub fn requested_qop(&self) -> std::result::Result<Vec<QualityOfProtection>, SaslError> {
        match self.properties.get(QOP_PROPERTY) {
            Some(list) => list.split(',').map(str::parse).collect(),
            None => Ok(vec![QualityOfProtection::Auth]),
        }
    }

    /// Fail unless `auth` is among the requested protection levels
    pub(crate) fn require_auth_qop(&self) -> std::result::Result<(), SaslError> {
        if self.requested_qop()?.contains(&QualityOfProtection::Auth) {
            Ok(())
        } else {
            Err(SaslError::Other(format!(
                "{} only provides the auth quality of protection",
                self.mechanism
            )))
        }
    }
}

impl fmt::Debug for SaslRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslRequest")
            .field("mechanism", &self.mechanism)
            .field("authorization_id", &self.authorization_id)
            .field("authentication_id", &self.authentication_id)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("realm", &self.realm)
            .field("properties", &self.properties)
            .finish()
    }
}

/// Progress of a negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    NotStarted,
    /// The initial bind request has been sent
    ChallengeSent,
    /// A continuation has been sent and the server has not answered yet
    AwaitingServer,
    Complete,
    Failed,
}

/// One SASL authentication session against one server
pub struct SaslClient {
    server_name: String,
    mechanism_name: String,
    mechanism: Option<Box<dyn SaslMechanism>>,
    state: NegotiationState,
}

impl SaslClient {
    /// Instantiate the requested mechanism from the registry
    pub fn new(
        registry: &MechanismRegistry,
        request: &SaslRequest,
        server_name: impl Into<String>,
    ) -> Result<Self> {
        let server_name = server_name.into();
        let mechanism = registry.create(request, &server_name)?;
        Ok(Self::with_mechanism(mechanism, server_name))
    }

    pub fn with_mechanism(mechanism: Box<dyn SaslMechanism>, server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            mechanism_name: mechanism.mechanism_name().to_string(),
            mechanism: Some(mechanism),
            state: NegotiationState::NotStarted,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Name of the mechanism, available until it is disposed
    pub fn mechanism_name(&self) -> Option<&str> {
        self.mechanism.as_ref().map(|m| m.mechanism_name())
    }

    pub fn negotiated_property(&self, name: &str) -> Option<String> {
        self.mechanism.as_ref()?.negotiated_property(name)
    }

    /// Negotiated protection level, available after a successful bind until
    /// the mechanism is disposed
    pub fn quality_of_protection(&self) -> Option<QualityOfProtection> {
        self.negotiated_property(QOP_PROPERTY)?.parse().ok()
    }

    pub fn is_disposed(&self) -> bool {
        self.mechanism.is_none()
    }

    /// Release the mechanism. Repeated calls do nothing.
    pub fn dispose(&mut self) {
        if let Some(mut mechanism) = self.mechanism.take() {
            if let Err(e) = mechanism.dispose() {
                warn!(mechanism = %self.mechanism_name, error = %e, "failed to dispose SASL mechanism");
            }
        }
    }

    /// Run the bind exchange to completion.
    ///
    /// Any failure leaves the client `Failed` with its mechanism disposed
    /// and is reported as a single `Negotiation` error. Dropping the returned
    /// future before it completes disposes the mechanism as well.
    pub async fn bind<B>(&mut self, conn: &mut B) -> Result<BindResponse>
    where
        B: BindOperation + ?Sized,
    {
        let mechanism = self.mechanism_name.clone();
        if self.state != NegotiationState::NotStarted || self.mechanism.is_none() {
            return Err(LdapError::Negotiation {
                mechanism,
                cause: NegotiationFailure::Mechanism(SaslError::InvalidState(
                    "negotiation already attempted",
                )),
            });
        }

        let mut guard = AbandonGuard {
            client: self,
            armed: true,
        };
        let outcome = guard.client.negotiate(conn).await;
        guard.armed = false;

        match outcome {
            Ok(response) => Ok(response),
            Err(cause) => {
                debug!(mechanism = %mechanism, error = %cause, "SASL negotiation failed");
                guard.client.state = NegotiationState::Failed;
                guard.client.dispose();
                Err(LdapError::Negotiation { mechanism, cause })
            }
        }
    }

    async fn negotiate<B>(&mut self, conn: &mut B) -> std::result::Result<BindResponse, NegotiationFailure>
    where
        B: BindOperation + ?Sized,
    {
        let name = self.mechanism_name.clone();

        let initial = {
            let mechanism = self.mechanism_mut()?;
            if mechanism.has_initial_response() {
                mechanism.evaluate_challenge(&[])?
            } else {
                None
            }
        };

        self.state = NegotiationState::ChallengeSent;
        debug!(mechanism = %name, server = %self.server_name, initial = initial.is_some(), "sending SASL bind");
        let mut response = send(conn, &name, initial).await?;

        loop {
            let code = response.result.result_code;
            let mechanism = self.mechanism_mut()?;
            if mechanism.is_complete()
                || !matches!(code, ResultCode::SaslBindInProgress | ResultCode::Success)
            {
                break;
            }

            let challenge = response.server_sasl_creds.as_deref().unwrap_or_default();
            let reply = mechanism.evaluate_challenge(challenge)?;
            if code == ResultCode::Success {
                if reply.as_ref().is_some_and(|r| !r.is_empty()) {
                    return Err(NegotiationFailure::UnexpectedCompletion);
                }
                break;
            }

            self.state = NegotiationState::AwaitingServer;
            debug!(mechanism = %name, "sending SASL continuation");
            response = send(conn, &name, reply).await?;
        }

        if response.result.result_code != ResultCode::Success {
            return Err(NegotiationFailure::Rejected {
                code: response.result.result_code,
                diagnostic: response.result.diagnostic_message,
            });
        }

        self.state = NegotiationState::Complete;
        debug!(mechanism = %name, qop = ?self.quality_of_protection(), "SASL bind complete");
        Ok(response)
    }

    fn mechanism_mut(&mut self) -> std::result::Result<&mut Box<dyn SaslMechanism>, NegotiationFailure> {
        self.mechanism
            .as_mut()
            .ok_or(NegotiationFailure::Mechanism(SaslError::InvalidState(
                "mechanism disposed",
            )))
    }
}

impl fmt::Debug for SaslClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslClient")
            .field("server_name", &self.server_name)
            .field("mechanism", &self.mechanism_name)
            .field("state", &self.state)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Drop for SaslClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Disposes the mechanism if a bind future is dropped mid-exchange
struct AbandonGuard<'a> {
    client: &'a mut SaslClient,
    armed: bool,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(mechanism = %self.client.mechanism_name, "SASL negotiation abandoned");
            self.client.state = NegotiationState::Failed;
            self.client.dispose();
        }
    }
}

async fn send<B>(
    conn: &mut B,
    mechanism: &str,
    credentials: Option<Bytes>,
) -> std::result::Result<BindResponse, NegotiationFailure>
where
    B: BindOperation + ?Sized,
{
    conn.bind(BindRequest::sasl(mechanism, credentials))
        .await
        .map_err(|e| NegotiationFailure::Transport(Box::new(e)))
}
