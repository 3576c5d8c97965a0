//! LDAP connection
//!
//! One request is outstanding at a time: the transport lock is held from
//! sending a request until its final response has been read.

use crate::endpoint::Endpoint;
use crate::error::{LdapError, Result};
use crate::protocol::{
    AbandonRequest, BindRequest, BindResponse, CompareRequest, ExtendedRequest, ExtendedResponse,
    LdapMessage, LdapResult, ProtocolOp, SearchRequest, SearchResultDone, SearchResultEntry,
    UnbindRequest, UnsolicitedNotification,
};
use crate::sasl::{BindOperation, MechanismRegistry, QualityOfProtection, SaslClient, SaslRequest};
use crate::transport::LdapTransport;
use bytes::Bytes;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default time to wait for a response
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a search returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResults {
    pub entries: Vec<SearchResultEntry>,
    /// Continuation reference URIs
    pub references: Vec<String>,
    pub result: LdapResult,
}

/// An open LDAP session with one endpoint
pub struct Connection<S = TcpStream> {
    endpoint: Endpoint,
    transport: Mutex<LdapTransport<S>>,
    next_message_id: AtomicI32,
    response_timeout: Duration,
    closed: AtomicBool,
    /// Negotiation that authenticated this session, kept until close
    sasl: std::sync::Mutex<Option<SaslClient>>,
}

impl<S> Connection<S> {
    pub fn new(endpoint: Endpoint, stream: S) -> Self {
        Self::with_transport(endpoint, LdapTransport::new(stream))
    }

    pub fn with_transport(endpoint: Endpoint, transport: LdapTransport<S>) -> Self {
        Self {
            endpoint,
            transport: Mutex::new(transport),
            next_message_id: AtomicI32::new(1),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            closed: AtomicBool::new(false),
            sasl: std::sync::Mutex::new(None),
        }
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// True once the connection failed, was told to disconnect or unbound
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Keep a completed SASL negotiation with the session. Any previously
    /// kept one is disposed.
    pub fn retain_sasl_client(&mut self, client: SaslClient) {
        let slot = self
            .sasl
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(client);
    }

    /// Mechanism of the retained SASL negotiation
    pub fn sasl_mechanism(&self) -> Option<String> {
        self.with_sasl(|client| client.mechanism_name().map(str::to_string))
    }

    /// Protection negotiated by the retained SASL negotiation
    pub fn quality_of_protection(&self) -> Option<QualityOfProtection> {
        self.with_sasl(SaslClient::quality_of_protection)
    }

    /// Take back the retained SASL negotiation
    pub fn take_sasl_client(&mut self) -> Option<SaslClient> {
        self.sasl
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    fn with_sasl<R>(&self, f: impl FnOnce(&SaslClient) -> Option<R>) -> Option<R> {
        let sasl = self.sasl.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sasl.as_ref().and_then(f)
    }

    /// Allocate the next message ID: 1..=i32::MAX, then back to 1
    fn allocate_message_id(&self) -> i32 {
        self.next_message_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| {
                Some(if id == i32::MAX { 1 } else { id + 1 })
            })
            .unwrap_or_else(|id| id)
    }

    /// Close on errors that leave the stream unusable
    fn track(&self, error: LdapError) -> LdapError {
        let fatal = error.is_transport()
            || matches!(
                error,
                LdapError::MalformedMessage(_)
                    | LdapError::MessageTooLarge { .. }
                    | LdapError::MessageIdMismatch { .. }
            );
        if fatal && !self.closed.swap(true, Ordering::AcqRel) {
            debug!(endpoint = %self.endpoint, error = %error, "connection closed");
        }
        error
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(LdapError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Send a bind request and return the server's response, whatever its
    /// result code
    pub async fn bind_request(&self, request: BindRequest) -> Result<BindResponse> {
        match self.exchange(request.into()).await? {
            ProtocolOp::BindResponse(response) => Ok(response),
            other => Err(unexpected("BindResponse", &other)),
        }
    }

    /// Simple bind; a non-success result is an `OperationFailed` error
    pub async fn simple_bind(
        &self,
        name: impl Into<String>,
        password: impl Into<Bytes>,
    ) -> Result<BindResponse> {
        let response = self.bind_request(BindRequest::simple(name, password)).await?;
        check(&response.result)?;
        Ok(response)
    }

    /// Authenticate with a SASL mechanism from the registry.
    ///
    /// The returned client exposes the negotiated mechanism and quality of
    /// protection until it is disposed or dropped.
    pub async fn sasl_bind(
        &mut self,
        registry: &MechanismRegistry,
        request: &SaslRequest,
    ) -> Result<SaslClient> {
        let mut client = SaslClient::new(registry, request, self.endpoint.hostname())?;
        client.bind(self).await?;
        Ok(client)
    }

    /// Compare an attribute value; `true` for compareTrue, `false` for
    /// compareFalse
    pub async fn compare(&self, request: CompareRequest) -> Result<bool> {
        match self.exchange(request.into()).await? {
            ProtocolOp::CompareResponse(response) => match response.matched() {
                Some(matched) => Ok(matched),
                None => Err(failed(response.result)),
            },
            other => Err(unexpected("CompareResponse", &other)),
        }
    }

    /// Run a search and collect its entries and references until the final
    /// SearchResultDone
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResults> {
        self.ensure_open()?;
        let mut transport = self.transport.lock().await;
        let message_id = self.send(&mut transport, request.into()).await?;

        let mut entries = Vec::new();
        let mut references = Vec::new();
        loop {
            match self.receive(&mut transport, message_id).await?.op {
                ProtocolOp::SearchResultEntry(entry) => entries.push(entry),
                ProtocolOp::SearchResultReference(reference) => {
                    references.extend(reference.uris)
                }
                ProtocolOp::SearchResultDone(SearchResultDone { result }) => {
                    debug!(
                        message_id,
                        entries = entries.len(),
                        references = references.len(),
                        code = %result.result_code,
                        "search complete"
                    );
                    return Ok(SearchResults {
                        entries,
                        references,
                        result,
                    });
                }
                other => return Err(unexpected("search result", &other)),
            }
        }
    }

    pub async fn extended(&self, request: ExtendedRequest) -> Result<ExtendedResponse> {
        match self.exchange(request.into()).await? {
            ProtocolOp::ExtendedResponse(response) => {
                check(&response.result)?;
                Ok(response)
            }
            other => Err(unexpected("ExtendedResponse", &other)),
        }
    }

    /// Ask the server to abandon an outstanding operation. No response
    /// follows.
    pub async fn abandon(&self, message_id: i32) -> Result<()> {
        self.ensure_open()?;
        let mut transport = self.transport.lock().await;
        self.send(&mut transport, AbandonRequest { message_id }.into())
            .await?;
        Ok(())
    }

    /// End the session and close the stream
    pub async fn unbind(self) -> Result<()> {
        self.ensure_open()?;
        let mut transport = self.transport.lock().await;
        self.send(&mut transport, UnbindRequest.into()).await?;
        self.closed.store(true, Ordering::Release);
        transport.shutdown().await?;
        Ok(())
    }

    /// Send one request and read its single response
    async fn exchange(&self, op: ProtocolOp) -> Result<ProtocolOp> {
        self.ensure_open()?;
        let mut transport = self.transport.lock().await;
        let message_id = self.send(&mut transport, op).await?;
        let response = self.receive(&mut transport, message_id).await?;
        Ok(response.op)
    }

    async fn send(&self, transport: &mut LdapTransport<S>, op: ProtocolOp) -> Result<i32> {
        let message_id = self.allocate_message_id();
        let message = LdapMessage::new(message_id, op);
        transport
            .write_message(&message)
            .await
            .map_err(|e| self.track(e))?;
        Ok(message_id)
    }

    /// Read until the response to `message_id` arrives, consuming any
    /// unsolicited notifications on the way
    async fn receive(&self, transport: &mut LdapTransport<S>, message_id: i32) -> Result<LdapMessage> {
        loop {
            let message = tokio::time::timeout(self.response_timeout, transport.read_message())
                .await
                .map_err(|_| LdapError::Timeout)
                .and_then(|read| read)
                .map_err(|e| self.track(e))?;

            if message.is_unsolicited() {
                let notification = UnsolicitedNotification::try_from(message)?;
                if notification.is_notice_of_disconnection() {
                    let result = &notification.response().result;
                    warn!(
                        endpoint = %self.endpoint,
                        code = %result.result_code,
                        diagnostic = %result.diagnostic_message,
                        "server sent notice of disconnection"
                    );
                    return Err(self.track(LdapError::ConnectionClosed));
                }
                debug!(
                    name = notification.response().name.as_deref().unwrap_or_default(),
                    "ignoring unsolicited notification"
                );
                continue;
            }

            if message.message_id != message_id {
                return Err(self.track(LdapError::MessageIdMismatch {
                    expected: message_id,
                    got: message.message_id,
                }));
            }
            return Ok(message);
        }
    }
}

impl<S> BindOperation for Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn bind(&mut self, request: BindRequest) -> impl Future<Output = Result<BindResponse>> + Send {
        self.bind_request(request)
    }
}

impl<S> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("response_timeout", &self.response_timeout)
            .field("closed", &self.is_closed())
            .field("sasl_mechanism", &self.sasl_mechanism())
            .finish()
    }
}

fn check(result: &LdapResult) -> Result<()> {
    if result.result_code.is_success() {
        Ok(())
    } else {
        Err(failed(result.clone()))
    }
}

fn failed(result: LdapResult) -> LdapError {
    LdapError::OperationFailed {
        code: result.result_code,
        diagnostic: result.diagnostic_message,
    }
}

fn unexpected(expected: &str, got: &ProtocolOp) -> LdapError {
    LdapError::UnexpectedResponse(format!("expected {expected}, got {}", got.name()))
}
