//! Negotiation Tests - SASL binds over real connections
//!
//! These tests drive the negotiation state machine against the mock
//! directory:
//! - PLAIN through the connection factory, accepted and rejected
//! - A custom two-round mechanism registered at startup
//! - Unsupported mechanism names
//! - Timeouts during negotiation counting as endpoint failures
//! - Mechanism disposal when a negotiation is abandoned

mod common;

use bytes::Bytes;
use common::*;
use ldap::protocol::ResultCode;
use ldap::sasl::{MechanismResult, QOP_PROPERTY};
use ldap::{
    Connection, ConnectionConfig, ConnectionFactory, Endpoint, LdapError, MechanismRegistry,
    NegotiationFailure, NegotiationState, QualityOfProtection, SaslError, SaslMechanism,
    SaslRequest,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

/// Client half of the mock directory's X-CHALLENGE mechanism
struct ChallengeMechanism {
    step: u8,
    disposed: Arc<AtomicBool>,
}

impl SaslMechanism for ChallengeMechanism {
    fn mechanism_name(&self) -> &str {
        CHALLENGE_MECHANISM
    }

    fn has_initial_response(&self) -> bool {
        true
    }

    fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Option<Bytes>, SaslError> {
        self.step += 1;
        match (self.step, challenge) {
            (1, b"") => Ok(Some(Bytes::from_static(b"hello"))),
            (2, b"question") => Ok(Some(Bytes::from_static(b"answer"))),
            (3, b"") => Ok(None),
            _ => Err(SaslError::MalformedChallenge(
                String::from_utf8_lossy(challenge).into_owned(),
            )),
        }
    }

    fn is_complete(&self) -> bool {
        self.step >= 3
    }

    fn negotiated_property(&self, name: &str) -> Option<String> {
        (self.is_complete() && name == QOP_PROPERTY).then(|| "auth".to_string())
    }

    fn dispose(&mut self) -> Result<(), SaslError> {
        self.disposed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn challenge_registry(disposed: Arc<AtomicBool>) -> MechanismRegistry {
    let mut registry = MechanismRegistry::new();
    registry.register(
        CHALLENGE_MECHANISM,
        move |_: &SaslRequest, _: &str| -> MechanismResult {
            Ok(Box::new(ChallengeMechanism {
                step: 0,
                disposed: disposed.clone(),
            }))
        },
    );
    registry
}

fn plain_factory(urls: &str, password: &str) -> ConnectionFactory {
    let config = ConnectionConfig::builder()
        .url(urls)
        .response_timeout(Duration::from_millis(300))
        .sasl_bind(
            MechanismRegistry::new(),
            SaslRequest::new("PLAIN").with_credentials("jdoe", password),
        )
        .build();
    ConnectionFactory::new(config).unwrap()
}

async fn connect(server: &MockServer) -> Connection {
    let stream = TcpStream::connect(server.addr()).await.unwrap();
    Connection::new(Endpoint::parse(&server.url()).unwrap(), stream)
        .with_response_timeout(Duration::from_secs(5))
}

/// Test: PLAIN credentials configured on the factory are used on connect
#[tokio::test]
async fn test_plain_through_factory() {
    init_logging();

    let server = MockServer::directory().await.unwrap();
    let factory = plain_factory(&server.url(), PASSWORD);
    let conn = factory.connect().await.unwrap();
    assert!(!conn.is_closed());
    assert_eq!(conn.sasl_mechanism().as_deref(), Some("PLAIN"));
    assert_eq!(conn.quality_of_protection(), Some(QualityOfProtection::Auth));
    conn.unbind().await.unwrap();
}

/// Test: A rejected bind is reported as-is and does not demote the endpoint
#[tokio::test]
async fn test_plain_rejected() {
    init_logging();

    let server = MockServer::directory().await.unwrap();
    let backup = MockServer::directory().await.unwrap();
    let factory = plain_factory(&format!("{} {}", server.url(), backup.url()), "wrong");

    let err = factory.connect().await.unwrap_err();
    match err {
        LdapError::Negotiation {
            mechanism,
            cause: NegotiationFailure::Rejected { code, .. },
        } => {
            assert_eq!(mechanism, "PLAIN");
            assert_eq!(code, ResultCode::InvalidCredentials);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(factory.strategy().endpoint_set().inactive().is_empty());
    assert_eq!(backup.connections(), 0);
}

/// Test: A registered mechanism runs two challenge rounds to completion
#[tokio::test]
async fn test_custom_two_round_mechanism() {
    init_logging();

    let server = MockServer::directory().await.unwrap();
    let disposed = Arc::new(AtomicBool::new(false));
    let registry = challenge_registry(disposed.clone());
    let mut conn = connect(&server).await;

    let mut client = conn
        .sasl_bind(&registry, &SaslRequest::new(CHALLENGE_MECHANISM))
        .await
        .unwrap();
    assert_eq!(client.state(), NegotiationState::Complete);
    assert_eq!(client.mechanism_name(), Some(CHALLENGE_MECHANISM));
    assert_eq!(client.quality_of_protection(), Some(QualityOfProtection::Auth));
    assert!(!disposed.load(Ordering::SeqCst));

    client.dispose();
    assert!(disposed.load(Ordering::SeqCst));
    assert_eq!(client.mechanism_name(), None);

    // hello, answer
    assert_eq!(server.requests(), 2);
}

/// Test: Mechanisms the client does not implement are refused up front
#[tokio::test]
async fn test_unsupported_mechanisms() {
    init_logging();

    let server = MockServer::directory().await.unwrap();
    for name in ["GSSAPI", "DIGEST-MD5", "CRAM-MD5"] {
        let config = ConnectionConfig::builder()
            .url(server.url())
            .sasl_bind(MechanismRegistry::new(), SaslRequest::new(name))
            .build();
        let factory = ConnectionFactory::new(config).unwrap();
        match factory.connect().await {
            Err(LdapError::UnsupportedMechanism(m)) => assert_eq!(m, name),
            other => panic!("expected UnsupportedMechanism, got {other:?}"),
        }
        assert!(factory.strategy().endpoint_set().inactive().is_empty());
    }
    assert_eq!(server.requests(), 0);
}

/// Test: A server that never answers the bind times out, and the factory
/// moves on to the next endpoint
#[tokio::test]
async fn test_negotiation_timeout_fails_over() {
    init_logging();

    let silent = MockServer::start(Arc::new(silent_handler)).await.unwrap();
    let healthy = MockServer::directory().await.unwrap();
    let factory = plain_factory(&format!("{} {}", silent.url(), healthy.url()), PASSWORD);

    let conn = factory.connect().await.unwrap();
    assert_eq!(conn.endpoint().port(), healthy.addr().port());

    let inactive = factory.strategy().endpoint_set().inactive();
    assert_eq!(inactive.len(), 1);
    assert_eq!(inactive[0].port(), silent.addr().port());
}

/// Test: Dropping an in-flight negotiation disposes the mechanism
#[tokio::test]
async fn test_abandoned_negotiation_disposes_mechanism() {
    init_logging();

    let silent = MockServer::start(Arc::new(silent_handler)).await.unwrap();
    let disposed = Arc::new(AtomicBool::new(false));
    let registry = challenge_registry(disposed.clone());
    let mut conn = connect(&silent).await;

    let request = SaslRequest::new(CHALLENGE_MECHANISM);
    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        conn.sasl_bind(&registry, &request),
    )
    .await;
    assert!(outcome.is_err());
    assert!(disposed.load(Ordering::SeqCst));
}
