//! Resilient LDAP client core
//!
//! This crate provides the parts of an LDAPv3 client that decide where to
//! connect and how to authenticate:
//!
//! - LDAP URL endpoints and connection strategies (active-passive,
//!   round-robin, random, DNS SRV discovery) with per-endpoint failure
//!   tracking
//! - LDAPv3 protocol messages (RFC 4511) on top of the `ldap-ber` codec
//! - A multi-round SASL bind state machine with EXTERNAL, PLAIN and SCRAM
//! - A connection factory that fails over between endpoints
//!
//! # Example
//!
//! ```no_run
//! use ldap::{ConnectionConfig, ConnectionFactory, StrategyKind};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ConnectionConfig::builder()
//!         .url("ldap://ldap1.example.com ldap://ldap2.example.com")
//!         .strategy(StrategyKind::ActivePassive)
//!         .simple_bind("cn=admin,dc=example,dc=com", "secret")
//!         .build();
//!
//!     let factory = ConnectionFactory::new(config).unwrap();
//!     let conn = factory.connect().await.unwrap();
//!     println!("connected to {}", conn.endpoint());
//!     conn.unbind().await.unwrap();
//! }
//! ```

pub mod config;
pub mod connection;
pub mod dns_srv;
pub mod endpoint;
pub mod endpoint_set;
pub mod error;
pub mod factory;
pub mod protocol;
pub mod retry;
pub mod sasl;
pub mod strategy;
pub mod transport;

// Re-export error types
pub use error::{LdapError, NegotiationFailure, Result, SaslError};

pub use config::{
    BindInitializer, ConnectionConfig, ConnectionConfigBuilder, DEFAULT_CONNECT_TIMEOUT,
};
pub use connection::{Connection, SearchResults, DEFAULT_RESPONSE_TIMEOUT};
pub use dns_srv::{
    DnsSrvOptions, DnsSrvStrategy, SrvQuery, SrvRecord, SrvResolver, StaticSrvResolver,
    DEFAULT_DNS_SRV_TTL,
};
pub use endpoint::{Endpoint, Scheme, LDAPS_PORT, LDAP_PORT};
pub use endpoint_set::{EndpointEntry, EndpointSet, Promotion, Snapshot};
pub use factory::{ConnectionFactory, Connector, TcpConnector};
pub use retry::RetryMetadata;
pub use sasl::{
    BindOperation, MechanismRegistry, NegotiationState, QualityOfProtection, SaslClient,
    SaslMechanism, SaslRequest,
};
pub use strategy::{
    ActivePassiveStrategy, ConnectionStrategy, RandomStrategy, RoundRobinStrategy, StrategyKind,
    StrategyOptions,
};
pub use transport::{LdapTransport, DEFAULT_MAX_MESSAGE_SIZE};

/// Re-export the BER codec
pub use ldap_ber;
