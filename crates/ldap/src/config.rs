//! Connection factory configuration
//!
//! Setters store values as given. Nothing is checked until a
//! [`ConnectionFactory`](crate::ConnectionFactory) is built from the config.

use crate::dns_srv::{DnsSrvOptions, SrvResolver};
use crate::error::{LdapError, Result};
use crate::sasl::{MechanismRegistry, SaslRequest};
use crate::strategy::{StrategyKind, StrategyOptions};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

pub use crate::connection::DEFAULT_RESPONSE_TIMEOUT;
pub use crate::dns_srv::DEFAULT_DNS_SRV_TTL;
pub use crate::transport::DEFAULT_MAX_MESSAGE_SIZE;

/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Authentication performed on every new connection
#[derive(Clone)]
pub enum BindInitializer {
    Simple {
        name: String,
        password: Zeroizing<String>,
    },
    Sasl {
        registry: MechanismRegistry,
        request: SaslRequest,
    },
}

impl fmt::Debug for BindInitializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple { name, .. } => f
                .debug_struct("Simple")
                .field("name", name)
                .field("password", &"<redacted>")
                .finish(),
            Self::Sasl { request, .. } => f.debug_struct("Sasl").field("request", request).finish(),
        }
    }
}

/// Connection factory configuration
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Space-separated LDAP URLs
    pub url: String,
    pub strategy: StrategyKind,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub max_message_size: usize,
    /// Minimum time before a failed endpoint is attempted again
    pub inactive_retry_interval: Option<Duration>,
    pub dns_srv_ttl: Duration,
    /// Connect with ldaps to endpoints found through DNS SRV
    pub dns_srv_use_tls: bool,
    /// Base DN used to derive the DNS SRV name when a URL names no domain
    pub base_dn: Option<String>,
    pub srv_resolver: Option<Arc<dyn SrvResolver>>,
    pub bind: Option<BindInitializer>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            strategy: StrategyKind::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            inactive_retry_interval: None,
            dns_srv_ttl: DEFAULT_DNS_SRV_TTL,
            dns_srv_use_tls: false,
            base_dn: None,
            srv_resolver: None,
            bind: None,
        }
    }
}

impl ConnectionConfig {
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Check every value that the strategy itself does not
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(LdapError::Configuration("no LDAP URL configured".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(LdapError::Configuration("connect timeout must be positive".into()));
        }
        if self.response_timeout.is_zero() {
            return Err(LdapError::Configuration("response timeout must be positive".into()));
        }
        if self.max_message_size == 0 {
            return Err(LdapError::Configuration("max message size must be positive".into()));
        }
        if self.strategy == StrategyKind::DnsSrv {
            if self.dns_srv_ttl.is_zero() {
                return Err(LdapError::Configuration("DNS SRV TTL must be positive".into()));
            }
            if self.srv_resolver.is_none() {
                return Err(LdapError::Configuration(
                    "the dns-srv strategy needs an SRV resolver".into(),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn strategy_options(&self) -> StrategyOptions {
        let mut options = StrategyOptions::default();
        if let Some(interval) = self.inactive_retry_interval {
            options = options.with_inactive_retry_interval(interval);
        }
        if let Some(resolver) = &self.srv_resolver {
            let mut dns = DnsSrvOptions::new(resolver.clone())
                .with_ttl(self.dns_srv_ttl)
                .with_tls(self.dns_srv_use_tls);
            if let Some(base_dn) = &self.base_dn {
                dns = dns.with_base_dn(base_dn.clone());
            }
            options = options.with_dns(dns);
        }
        options
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("strategy", &self.strategy)
            .field("connect_timeout", &self.connect_timeout)
            .field("response_timeout", &self.response_timeout)
            .field("max_message_size", &self.max_message_size)
            .field("inactive_retry_interval", &self.inactive_retry_interval)
            .field("dns_srv_ttl", &self.dns_srv_ttl)
            .field("dns_srv_use_tls", &self.dns_srv_use_tls)
            .field("base_dn", &self.base_dn)
            .field("srv_resolver", &self.srv_resolver)
            .field("bind", &self.bind)
            .finish()
    }
}

/// One setter per [`ConnectionConfig`] property
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn strategy(mut self, strategy: StrategyKind) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    pub fn inactive_retry_interval(mut self, interval: Duration) -> Self {
        self.config.inactive_retry_interval = Some(interval);
        self
    }

    pub fn dns_srv_ttl(mut self, ttl: Duration) -> Self {
        self.config.dns_srv_ttl = ttl;
        self
    }

    pub fn dns_srv_use_tls(mut self, use_tls: bool) -> Self {
        self.config.dns_srv_use_tls = use_tls;
        self
    }

    pub fn base_dn(mut self, base_dn: impl Into<String>) -> Self {
        self.config.base_dn = Some(base_dn.into());
        self
    }

    pub fn srv_resolver(mut self, resolver: Arc<dyn SrvResolver>) -> Self {
        self.config.srv_resolver = Some(resolver);
        self
    }

    /// Simple bind on every new connection
    pub fn simple_bind(mut self, name: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.bind = Some(BindInitializer::Simple {
            name: name.into(),
            password: Zeroizing::new(password.into()),
        });
        self
    }

    /// SASL bind on every new connection
    pub fn sasl_bind(mut self, registry: MechanismRegistry, request: SaslRequest) -> Self {
        self.config.bind = Some(BindInitializer::Sasl { registry, request });
        self
    }

    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}
