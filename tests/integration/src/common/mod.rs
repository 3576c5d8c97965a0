//! Common test utilities for integration tests

#![allow(dead_code)]

use bytes::Bytes;
use ldap::protocol::{
    Authentication, BindResponse, CompareResponse, ExtendedResponse, LdapMessage, LdapResult,
    PartialAttribute, ProtocolOp, ResultCode, SearchResultDone, SearchResultEntry,
};
use ldap::LdapTransport;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Password the mock directory accepts for simple and PLAIN binds
pub const PASSWORD: &str = "secret";

/// Bind DN the mock directory knows
pub const ADMIN_DN: &str = "cn=admin,dc=example,dc=com";

/// Who-am-I extended operation (RFC 4532)
pub const WHOAMI_OID: &str = "1.3.6.1.4.1.4203.1.11.3";

/// Custom two-round SASL mechanism understood by the mock directory
pub const CHALLENGE_MECHANISM: &str = "X-CHALLENGE";

static INIT: Once = Once::new();

/// Initialize logging for tests (respects RUST_LOG)
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Produces the replies to one request; an empty list means no reply
pub type Handler = Arc<dyn Fn(&LdapMessage) -> Vec<LdapMessage> + Send + Sync>;

/// Loopback LDAP server answering with a [`Handler`]
pub struct MockServer {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start(handler: Handler) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(AtomicUsize::new(0));

        let task = {
            let connections = connections.clone();
            let requests = requests.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(stream, handler.clone(), requests.clone()));
                }
            })
        };

        Ok(Self {
            addr,
            connections,
            requests,
            task,
        })
    }

    /// Server backed by [`directory_handler`]
    pub async fn directory() -> std::io::Result<Self> {
        Self::start(Arc::new(directory_handler)).await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("ldap://{}", self.addr)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(stream: TcpStream, handler: Handler, requests: Arc<AtomicUsize>) {
    let mut transport = LdapTransport::new(stream);
    while let Ok(request) = transport.read_message().await {
        requests.fetch_add(1, Ordering::SeqCst);
        if matches!(request.op, ProtocolOp::UnbindRequest(_)) {
            break;
        }
        for reply in handler(&request) {
            if transport.write_message(&reply).await.is_err() {
                return;
            }
        }
    }
}

/// URL of a loopback port nothing listens on
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("ldap://{addr}")
}

fn bind_reply(id: i32, code: ResultCode, creds: Option<&'static [u8]>) -> Vec<LdapMessage> {
    let mut response = BindResponse::new(LdapResult::new(code));
    if let Some(creds) = creds {
        response = response.with_server_sasl_creds(Bytes::from_static(creds));
    }
    vec![LdapMessage::new(id, response)]
}

/// A small directory:
/// - simple bind: [`ADMIN_DN`] / [`PASSWORD`], or anonymous
/// - SASL PLAIN: any user with [`PASSWORD`]
/// - SASL X-CHALLENGE: "hello", then "answer" to the challenge "question"
/// - compare: `color` is `blue`
/// - search: two entries under `dc=example,dc=com`
/// - extended: who-am-I
pub fn directory_handler(request: &LdapMessage) -> Vec<LdapMessage> {
    let id = request.message_id;
    match &request.op {
        ProtocolOp::BindRequest(bind) => match &bind.authentication {
            Authentication::Simple(pw) => {
                let anonymous = bind.name.is_empty() && pw.is_empty();
                let valid = bind.name == ADMIN_DN && pw.as_ref() == PASSWORD.as_bytes();
                if anonymous || valid {
                    bind_reply(id, ResultCode::Success, None)
                } else {
                    bind_reply(id, ResultCode::InvalidCredentials, None)
                }
            }
            Authentication::Sasl {
                mechanism,
                credentials,
            } => {
                let creds = credentials.as_deref().unwrap_or_default();
                match mechanism.as_str() {
                    "PLAIN" => {
                        let mut fields = creds.split(|&b| b == 0);
                        let _authzid = fields.next();
                        let authcid = fields.next().unwrap_or_default();
                        let password = fields.next().unwrap_or_default();
                        if !authcid.is_empty() && password == PASSWORD.as_bytes() {
                            bind_reply(id, ResultCode::Success, None)
                        } else {
                            bind_reply(id, ResultCode::InvalidCredentials, None)
                        }
                    }
                    CHALLENGE_MECHANISM => match creds {
                        b"hello" => bind_reply(id, ResultCode::SaslBindInProgress, Some(b"question")),
                        b"answer" => bind_reply(id, ResultCode::Success, Some(b"")),
                        _ => bind_reply(id, ResultCode::InvalidCredentials, None),
                    },
                    _ => bind_reply(id, ResultCode::AuthMethodNotSupported, None),
                }
            }
        },
        ProtocolOp::CompareRequest(compare) => {
            let code = match (compare.attribute.as_str(), compare.value.as_ref()) {
                ("color", b"blue") => ResultCode::CompareTrue,
                ("color", _) => ResultCode::CompareFalse,
                _ => ResultCode::NoSuchAttribute,
            };
            vec![LdapMessage::new(
                id,
                CompareResponse {
                    result: LdapResult::new(code),
                },
            )]
        }
        ProtocolOp::SearchRequest(_) => {
            let entry = |cn: &str| SearchResultEntry {
                object_name: format!("cn={cn},dc=example,dc=com"),
                attributes: vec![PartialAttribute {
                    name: "cn".into(),
                    values: vec![Bytes::copy_from_slice(cn.as_bytes())],
                }],
            };
            vec![
                LdapMessage::new(id, entry("alice")),
                LdapMessage::new(id, entry("bob")),
                LdapMessage::new(
                    id,
                    SearchResultDone {
                        result: LdapResult::success(),
                    },
                ),
            ]
        }
        ProtocolOp::ExtendedRequest(ext) if ext.name == WHOAMI_OID => vec![LdapMessage::new(
            id,
            ExtendedResponse::new(LdapResult::success()).with_value(format!("dn:{ADMIN_DN}")),
        )],
        ProtocolOp::ExtendedRequest(_) => vec![LdapMessage::new(
            id,
            ExtendedResponse::new(LdapResult::new(ResultCode::ProtocolError)),
        )],
        _ => Vec::new(),
    }
}

/// Handler that never answers binds
pub fn silent_handler(_request: &LdapMessage) -> Vec<LdapMessage> {
    Vec::new()
}
