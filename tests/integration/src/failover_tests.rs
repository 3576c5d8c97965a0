//! Failover Tests - Connection strategies against live and dead endpoints
//!
//! These tests run the connection factory over loopback sockets:
//! - Active-passive failover past a dead endpoint
//! - Round-robin and random distribution across healthy endpoints
//! - A single NoAvailableEndpoints error when everything is down
//! - Inactive retry interval quarantine
//! - DNS SRV discovery and TTL-driven refresh

mod common;

use common::*;
use ldap::{
    ConnectionConfig, ConnectionFactory, LdapError, SrvRecord, StaticSrvResolver, StrategyKind,
};
use std::sync::Arc;
use std::time::Duration;

fn factory(urls: &[String], strategy: StrategyKind) -> ConnectionFactory {
    let config = ConnectionConfig::builder()
        .url(urls.join(" "))
        .strategy(strategy)
        .connect_timeout(Duration::from_secs(2))
        .response_timeout(Duration::from_secs(2))
        .simple_bind(ADMIN_DN, PASSWORD)
        .build();
    ConnectionFactory::new(config).unwrap()
}

fn port_of(url: &str) -> u16 {
    url.rsplit(':').next().unwrap().parse().unwrap()
}

/// Test: The first live endpoint in configured order wins; the dead one is
/// quarantined and tried last
#[tokio::test]
async fn test_active_passive_failover() {
    init_logging();

    let dead = dead_url().await;
    let primary = MockServer::directory().await.unwrap();
    let secondary = MockServer::directory().await.unwrap();
    let factory = factory(
        &[dead.clone(), primary.url(), secondary.url()],
        StrategyKind::ActivePassive,
    );

    let conn = factory.connect().await.unwrap();
    assert_eq!(conn.endpoint().port(), primary.addr().port());

    let set = factory.strategy().endpoint_set();
    let inactive = set.inactive();
    assert_eq!(inactive.len(), 1);
    assert_eq!(inactive[0].port(), port_of(&dead));
    assert_eq!(set.entry(&inactive[0]).unwrap().retry().attempts(), 1);

    // Healthy endpoints come first now; the dead one is not touched again
    for _ in 0..3 {
        let conn = factory.connect().await.unwrap();
        assert_eq!(conn.endpoint().port(), primary.addr().port());
    }
    assert_eq!(set.entry(&inactive[0]).unwrap().retry().attempts(), 1);
    assert_eq!(primary.connections(), 4);
    assert_eq!(secondary.connections(), 0);
}

/// Test: Successive connections start at successive endpoints
#[tokio::test]
async fn test_round_robin_distribution() {
    init_logging();

    let servers = vec![
        MockServer::directory().await.unwrap(),
        MockServer::directory().await.unwrap(),
        MockServer::directory().await.unwrap(),
    ];
    let urls: Vec<_> = servers.iter().map(|s| s.url()).collect();
    let factory = factory(&urls, StrategyKind::RoundRobin);

    for _ in 0..6 {
        factory.connect().await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    for server in &servers {
        assert_eq!(server.connections(), 2);
    }
}

/// Test: Random selection only ever lands on live endpoints once the dead
/// one has been demoted
#[tokio::test]
async fn test_random_selection() {
    init_logging();

    let dead = dead_url().await;
    let a = MockServer::directory().await.unwrap();
    let b = MockServer::directory().await.unwrap();
    let factory = factory(&[dead, a.url(), b.url()], StrategyKind::Random);

    for _ in 0..40 {
        factory.connect().await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(a.connections() + b.connections(), 40);
    assert!(a.connections() > 0);
    assert!(b.connections() > 0);
    assert_eq!(factory.strategy().endpoint_set().inactive().len(), 1);
}

/// Test: Every endpoint down gives one aggregated error, and inactive
/// endpoints remain candidates for the next attempt
#[tokio::test]
async fn test_all_endpoints_down() {
    init_logging();

    let urls = vec![dead_url().await, dead_url().await];
    let factory = factory(&urls, StrategyKind::ActivePassive);

    for _ in 0..2 {
        match factory.connect().await {
            Err(LdapError::NoAvailableEndpoints {
                attempted,
                last_error,
            }) => {
                assert_eq!(attempted, 2);
                assert!(last_error.is_some());
            }
            other => panic!("expected NoAvailableEndpoints, got {other:?}"),
        }
    }
    let set = factory.strategy().endpoint_set();
    assert!(set.active().is_empty());
    assert_eq!(set.inactive().len(), 2);
    for endpoint in set.inactive() {
        assert_eq!(set.entry(&endpoint).unwrap().retry().attempts(), 2);
    }
}

/// Test: Endpoints that failed within the retry interval are skipped
#[tokio::test]
async fn test_inactive_retry_interval() {
    init_logging();

    let dead = dead_url().await;
    let live = MockServer::directory().await.unwrap();
    let config = ConnectionConfig::builder()
        .url(format!("{dead} {}", live.url()))
        .inactive_retry_interval(Duration::from_secs(3600))
        .simple_bind(ADMIN_DN, PASSWORD)
        .build();
    let factory = ConnectionFactory::new(config).unwrap();

    factory.connect().await.unwrap();
    factory.connect().await.unwrap();
    assert_eq!(live.connections(), 2);

    // Take the last live endpoint down
    drop(live);
    tokio::time::sleep(Duration::from_millis(50)).await;

    match factory.connect().await {
        Err(LdapError::NoAvailableEndpoints { attempted, .. }) => assert_eq!(attempted, 1),
        other => panic!("expected NoAvailableEndpoints, got {other:?}"),
    }
    // Both endpoints are now quarantined
    match factory.connect().await {
        Err(LdapError::NoAvailableEndpoints {
            attempted,
            last_error,
        }) => {
            assert_eq!(attempted, 0);
            assert!(last_error.is_none());
        }
        other => panic!("expected NoAvailableEndpoints, got {other:?}"),
    }
}

/// Test: SRV records decide the endpoints; a refresh after the TTL picks up
/// the new record set
#[tokio::test]
async fn test_dns_srv_discovery_and_refresh() {
    init_logging();

    const NAME: &str = "_ldap._tcp.example.com";
    let dead = dead_url().await;
    let first = MockServer::directory().await.unwrap();
    let second = MockServer::directory().await.unwrap();

    let resolver = Arc::new(StaticSrvResolver::new().with_records(
        NAME,
        vec![
            SrvRecord::new(20, 0, first.addr().port(), "127.0.0.1."),
            SrvRecord::new(10, 0, port_of(&dead), "127.0.0.1."),
        ],
    ));
    let config = ConnectionConfig::builder()
        .url(format!("dns:?{NAME}"))
        .strategy(StrategyKind::DnsSrv)
        .srv_resolver(resolver.clone())
        .dns_srv_ttl(Duration::from_millis(200))
        .simple_bind(ADMIN_DN, PASSWORD)
        .build();
    let factory = ConnectionFactory::new(config).unwrap();

    // Priority 10 is dead, so priority 20 serves
    let conn = factory.connect().await.unwrap();
    assert_eq!(conn.endpoint().port(), first.addr().port());
    assert_eq!(conn.endpoint().hostname(), "127.0.0.1");

    resolver.set_records(
        NAME,
        vec![SrvRecord::new(5, 0, second.addr().port(), "127.0.0.1.")],
    );
    // Still within the TTL
    let conn = factory.connect().await.unwrap();
    assert_eq!(conn.endpoint().port(), first.addr().port());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let conn = factory.connect().await.unwrap();
    assert_eq!(conn.endpoint().port(), second.addr().port());
    assert_eq!(factory.strategy().endpoint_set().len(), 1);
}
