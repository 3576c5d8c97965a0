//! Codec Tests - LDAP messages over real sockets
//!
//! These tests check the wire format end to end:
//! - Byte-exact encoding of a known CompareRequest
//! - Reassembly of messages split across many TCP segments
//! - Full request/response cycles against the mock directory
//! - Rejection of malformed and oversized input

mod common;

use bytes::Bytes;
use common::*;
use ldap::protocol::{
    CompareRequest, ExtendedRequest, ExtendedResponse, Filter, LdapMessage, LdapResult, ProtocolOp,
    SearchRequest, SearchScope,
};
use ldap::{Connection, Endpoint, LdapError, LdapTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

fn compare_golden() -> Vec<u8> {
    let mut expected = vec![0x30, 0x45, 0x02, 0x01, 0x02, 0x6e, 0x40, 0x04, 0x24];
    expected.extend_from_slice(b"uid=jdoe,ou=People,dc=example,dc=com");
    expected.extend_from_slice(&[0x30, 0x18, 0x04, 0x0c]);
    expected.extend_from_slice(b"employeeType");
    expected.extend_from_slice(&[0x04, 0x08]);
    expected.extend_from_slice(b"salaried");
    expected
}

async fn connect(server: &MockServer) -> Connection {
    let stream = TcpStream::connect(server.addr()).await.unwrap();
    let endpoint = Endpoint::parse(&server.url()).unwrap();
    Connection::new(endpoint, stream).with_response_timeout(Duration::from_secs(5))
}

/// Test: The CompareRequest vector is produced byte for byte
#[test]
fn test_compare_request_golden_vector() {
    init_logging();

    let request = CompareRequest::new(
        "uid=jdoe,ou=People,dc=example,dc=com",
        "employeeType",
        Bytes::from_static(b"salaried"),
    );
    let message = LdapMessage::new(2, request);
    assert_eq!(message.encode().as_ref(), compare_golden().as_slice());
    assert_eq!(
        ldap_ber::frame_length(&compare_golden()).unwrap(),
        Some(compare_golden().len())
    );
}

/// Test: Frames trickling in one byte at a time, back to back, are
/// reassembled into whole messages
#[tokio::test]
async fn test_split_segments_over_tcp() {
    init_logging();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let writer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.set_nodelay(true).unwrap();
        let mut data = compare_golden();
        data.extend_from_slice(&compare_golden());
        for byte in data {
            stream.write_all(&[byte]).await.unwrap();
            stream.flush().await.unwrap();
        }
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut transport = LdapTransport::new(stream);
    for _ in 0..2 {
        let message = transport.read_message().await.unwrap();
        assert_eq!(message.message_id, 2);
        assert!(matches!(message.op, ProtocolOp::CompareRequest(_)));
    }
    assert!(matches!(
        transport.read_message().await,
        Err(LdapError::ConnectionClosed)
    ));
    writer.await.unwrap();
}

/// Test: Compare, search and extended operations against the mock directory
#[tokio::test]
async fn test_operations_against_directory() {
    init_logging();

    let server = MockServer::directory().await.unwrap();
    let conn = connect(&server).await;

    conn.simple_bind(ADMIN_DN, PASSWORD).await.unwrap();

    assert!(conn
        .compare(CompareRequest::new("cn=widget", "color", "blue"))
        .await
        .unwrap());
    assert!(!conn
        .compare(CompareRequest::new("cn=widget", "color", "red"))
        .await
        .unwrap());
    assert!(matches!(
        conn.compare(CompareRequest::new("cn=widget", "size", "xl")).await,
        Err(LdapError::OperationFailed { .. })
    ));

    let results = conn
        .search(
            SearchRequest::new("dc=example,dc=com", SearchScope::WholeSubtree, Filter::present("cn"))
                .with_attributes(["cn"]),
        )
        .await
        .unwrap();
    let names: Vec<_> = results.entries.iter().map(|e| e.object_name.as_str()).collect();
    assert_eq!(
        names,
        ["cn=alice,dc=example,dc=com", "cn=bob,dc=example,dc=com"]
    );
    assert_eq!(
        results.entries[0].values("cn"),
        Some(&[Bytes::from_static(b"alice")][..])
    );

    let whoami = conn.extended(ExtendedRequest::new(WHOAMI_OID)).await.unwrap();
    assert_eq!(
        whoami.value.as_deref(),
        Some(format!("dn:{ADMIN_DN}").as_bytes())
    );

    conn.unbind().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // bind, 3 compares, search, extended, unbind
    assert_eq!(server.requests(), 7);
}

/// Test: A response that is not valid BER closes the connection
#[tokio::test]
async fn test_malformed_response() {
    init_logging();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut transport = LdapTransport::new(&mut stream);
        let _ = transport.read_message().await;
        // Envelope with an INTEGER where the SEQUENCE belongs
        let _ = stream.write_all(&[0x02, 0x01, 0x05]).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let conn = Connection::new(Endpoint::parse(&format!("ldap://{addr}")).unwrap(), stream);
    let err = conn.simple_bind("", "").await.unwrap_err();
    assert!(matches!(err, LdapError::MalformedMessage(_)), "{err:?}");
    assert!(conn.is_closed());
}

/// Test: Frames above the configured maximum are refused before they are read
#[tokio::test]
async fn test_oversized_response() {
    init_logging();

    let handler: Handler = Arc::new(|request: &LdapMessage| {
        let huge = "x".repeat(64 * 1024);
        vec![LdapMessage::new(
            request.message_id,
            ExtendedResponse::new(LdapResult::success()).with_value(huge),
        )]
    });
    let server = MockServer::start(handler).await.unwrap();
    let stream = TcpStream::connect(server.addr()).await.unwrap();
    let transport = LdapTransport::new(stream).with_max_message_size(1024);
    let conn = Connection::with_transport(Endpoint::parse(&server.url()).unwrap(), transport);

    let err = conn
        .extended(ExtendedRequest::new(WHOAMI_OID))
        .await
        .unwrap_err();
    assert!(
        matches!(err, LdapError::MessageTooLarge { max: 1024, .. }),
        "{err:?}"
    );
}
