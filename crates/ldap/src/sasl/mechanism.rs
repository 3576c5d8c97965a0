//! Mechanism seam and registry

use super::{external, plain, scram, SaslRequest};
use crate::error::{LdapError, NegotiationFailure, Result, SaslError};
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Negotiated property holding the quality of protection
pub const QOP_PROPERTY: &str = "qop";

/// Outcome of instantiating a mechanism
pub type MechanismResult = std::result::Result<Box<dyn SaslMechanism>, SaslError>;

/// Client side of one SASL mechanism exchange
pub trait SaslMechanism: Send {
    fn mechanism_name(&self) -> &str;

    /// True if the client speaks first
    fn has_initial_response(&self) -> bool;

    /// Process a server challenge (empty for the initial response) and
    /// produce the next client message, if any
    fn evaluate_challenge(&mut self, challenge: &[u8]) -> std::result::Result<Option<Bytes>, SaslError>;

    fn is_complete(&self) -> bool;

    /// Property negotiated during the exchange, such as [`QOP_PROPERTY`]
    fn negotiated_property(&self, name: &str) -> Option<String>;

    /// Release mechanism state. Called at most once.
    fn dispose(&mut self) -> std::result::Result<(), SaslError>;
}

/// Builds mechanism instances for one mechanism name
pub trait MechanismFactory: Send + Sync {
    fn create(&self, request: &SaslRequest, server_name: &str) -> MechanismResult;
}

impl<F> MechanismFactory for F
where
    F: Fn(&SaslRequest, &str) -> MechanismResult + Send + Sync,
{
    fn create(&self, request: &SaslRequest, server_name: &str) -> MechanismResult {
        self(request, server_name)
    }
}

/// Mechanism factories by (case-insensitive) mechanism name
#[derive(Clone)]
pub struct MechanismRegistry {
    factories: HashMap<String, Arc<dyn MechanismFactory>>,
}

impl MechanismRegistry {
    /// Registry with the built-in mechanisms:
    /// EXTERNAL, PLAIN, SCRAM-SHA-1 and SCRAM-SHA-256
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(external::MECHANISM, create_external);
        registry.register(plain::MECHANISM, create_plain);
        for hash in [scram::ScramHash::Sha1, scram::ScramHash::Sha256] {
            registry.register(
                hash.mechanism_name(),
                move |request: &SaslRequest, _: &str| -> MechanismResult {
                    Ok(Box::new(scram::ScramMechanism::new(hash, request)?))
                },
            );
        }
        registry
    }

    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Add or replace the factory for a mechanism name
    pub fn register(&mut self, name: &str, factory: impl MechanismFactory + 'static) {
        self.factories
            .insert(name.to_ascii_uppercase(), Arc::new(factory));
    }

    pub fn supports(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_uppercase())
    }

    pub fn mechanisms(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiate the mechanism named by the request
    pub fn create(
        &self,
        request: &SaslRequest,
        server_name: &str,
    ) -> Result<Box<dyn SaslMechanism>> {
        let factory = self
            .factories
            .get(&request.mechanism.to_ascii_uppercase())
            .ok_or_else(|| LdapError::UnsupportedMechanism(request.mechanism.clone()))?;
        factory
            .create(request, server_name)
            .map_err(|e| LdapError::Negotiation {
                mechanism: request.mechanism.clone(),
                cause: NegotiationFailure::Mechanism(e),
            })
    }
}

fn create_external(request: &SaslRequest, _server_name: &str) -> MechanismResult {
    Ok(Box::new(external::ExternalMechanism::new(request)?))
}

fn create_plain(request: &SaslRequest, _server_name: &str) -> MechanismResult {
    Ok(Box::new(plain::PlainMechanism::new(request)?))
}

impl Default for MechanismRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MechanismRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MechanismRegistry")
            .field("mechanisms", &self.mechanisms())
            .finish()
    }
}
