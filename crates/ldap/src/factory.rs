//! Connection factory
//!
//! Walks the strategy's endpoint list until one endpoint accepts a connection
//! (and the configured bind, if any). Endpoint health is only touched by
//! transport failures; protocol and authentication errors go straight back to
//! the caller.

use crate::config::{BindInitializer, ConnectionConfig};
use crate::connection::Connection;
use crate::endpoint::Endpoint;
use crate::error::{LdapError, Result};
use crate::strategy::ConnectionStrategy;
use crate::transport::LdapTransport;
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Opens byte streams to endpoints
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn connect(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Plain TCP. `ldaps` endpoints need a connector that provides TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> impl Future<Output = Result<TcpStream>> + Send {
        let tls = endpoint.is_tls();
        let target = endpoint.to_string();
        let addr = (endpoint.hostname().to_string(), endpoint.port());
        async move {
            if tls {
                return Err(LdapError::Configuration(format!(
                    "{target} requires TLS, which TcpConnector does not provide"
                )));
            }
            let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
                .await
                .map_err(|_| LdapError::Timeout)??;
            stream.set_nodelay(true)?;
            Ok(stream)
        }
    }
}

/// Creates connections to the endpoints of one configuration
pub struct ConnectionFactory<C = TcpConnector> {
    config: ConnectionConfig,
    strategy: Arc<dyn ConnectionStrategy>,
    connector: C,
}

impl ConnectionFactory<TcpConnector> {
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> ConnectionFactory<C> {
    /// Validate the configuration and build its strategy.
    ///
    /// Malformed URLs and invalid settings fail here, before any connection
    /// is attempted.
    pub fn with_connector(config: ConnectionConfig, connector: C) -> Result<Self> {
        config.validate()?;
        let strategy = config
            .strategy
            .initialize(&config.url, &config.strategy_options())?;
        debug!(
            strategy = %config.strategy,
            endpoints = strategy.endpoint_set().len(),
            "connection factory ready"
        );
        Ok(Self {
            config,
            strategy,
            connector,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn strategy(&self) -> &Arc<dyn ConnectionStrategy> {
        &self.strategy
    }

    /// Connect to the first endpoint that works, in strategy order.
    ///
    /// Each endpoint failing at the transport level is recorded as failed and
    /// the next one is tried. When none is left the result is a single
    /// `NoAvailableEndpoints` error.
    pub async fn connect(&self) -> Result<Connection<C::Stream>> {
        let mut attempted = 0;
        let mut last_error = None;

        for endpoint in self.strategy.next_endpoints() {
            attempted += 1;
            match self.open(&endpoint).await {
                Ok(connection) => {
                    self.strategy.record_success(&endpoint);
                    debug!(endpoint = %endpoint, attempted, "connected");
                    return Ok(connection);
                }
                Err(e) if e.is_transport() => {
                    warn!(endpoint = %endpoint, error = %e, "endpoint failed");
                    self.strategy.record_failure(&endpoint, Instant::now());
                    last_error = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        Err(LdapError::NoAvailableEndpoints {
            attempted,
            last_error,
        })
    }

    async fn open(&self, endpoint: &Endpoint) -> Result<Connection<C::Stream>> {
        let stream = self
            .connector
            .connect(endpoint, self.config.connect_timeout)
            .await?;
        let transport = LdapTransport::new(stream).with_max_message_size(self.config.max_message_size);
        let mut connection = Connection::with_transport(endpoint.clone(), transport)
            .with_response_timeout(self.config.response_timeout);

        match &self.config.bind {
            Some(BindInitializer::Simple { name, password }) => {
                connection
                    .simple_bind(name.clone(), Bytes::copy_from_slice(password.as_bytes()))
                    .await?;
            }
            Some(BindInitializer::Sasl { registry, request }) => {
                let client = connection.sasl_bind(registry, request).await?;
                connection.retain_sasl_client(client);
            }
            None => {}
        }
        Ok(connection)
    }
}

impl<C> std::fmt::Debug for ConnectionFactory<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("config", &self.config)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}
