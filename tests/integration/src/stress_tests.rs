//! Stress Tests - Shared factories and endpoint sets under load
//!
//! These tests look for race conditions by:
//! - Connecting through one factory from many tasks at once
//! - Sharing one connection between many tasks
//! - Hammering an endpoint set with failures and recoveries from many threads
//!   while checking that every endpoint stays in exactly one partition
//! - Connecting while another thread flaps endpoint health

mod common;

use common::*;
use ldap::protocol::CompareRequest;
use ldap::{
    Connection, ConnectionConfig, ConnectionFactory, Endpoint, EndpointSet, Promotion,
    StrategyKind,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Barrier;
use tokio::task::JoinSet;

/// Test: Concurrent connects through one round-robin factory spread evenly
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_round_robin_connects() {
    init_logging();

    const NUM_TASKS: usize = 30;

    let servers = vec![
        MockServer::directory().await.unwrap(),
        MockServer::directory().await.unwrap(),
        MockServer::directory().await.unwrap(),
    ];
    let urls: Vec<_> = servers.iter().map(|s| s.url()).collect();
    let config = ConnectionConfig::builder()
        .url(urls.join(" "))
        .strategy(StrategyKind::RoundRobin)
        .simple_bind(ADMIN_DN, PASSWORD)
        .build();
    let factory = Arc::new(ConnectionFactory::new(config).unwrap());
    let barrier = Arc::new(Barrier::new(NUM_TASKS));

    let start = Instant::now();
    let mut tasks = JoinSet::new();
    for _ in 0..NUM_TASKS {
        let factory = factory.clone();
        let barrier = barrier.clone();
        tasks.spawn(async move {
            barrier.wait().await;
            let conn = factory.connect().await?;
            conn.unbind().await
        });
    }

    let mut failures = 0;
    while let Some(outcome) = tasks.join_next().await {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                eprintln!("connect failed: {e}");
                failures += 1;
            }
            Err(e) => {
                eprintln!("task panicked: {e}");
                failures += 1;
            }
        }
    }
    println!("{NUM_TASKS} connects in {:?}", start.elapsed());

    assert_eq!(failures, 0);
    for server in &servers {
        assert_eq!(server.connections(), NUM_TASKS / servers.len());
    }
    assert!(factory.strategy().endpoint_set().inactive().is_empty());
}

/// Test: Concurrent connects with a dead primary all land on the live
/// endpoint, and the dead one is demoted
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_failover() {
    init_logging();

    const NUM_TASKS: usize = 20;

    let dead = dead_url().await;
    let live = MockServer::directory().await.unwrap();
    let config = ConnectionConfig::builder()
        .url(format!("{dead} {}", live.url()))
        .simple_bind(ADMIN_DN, PASSWORD)
        .build();
    let factory = Arc::new(ConnectionFactory::new(config).unwrap());

    let mut tasks = JoinSet::new();
    for _ in 0..NUM_TASKS {
        let factory = factory.clone();
        tasks.spawn(async move { factory.connect().await.map(|conn| conn.endpoint().port()) });
    }
    while let Some(outcome) = tasks.join_next().await {
        assert_eq!(outcome.unwrap().unwrap(), live.addr().port());
    }

    let set = factory.strategy().endpoint_set();
    let inactive = set.inactive();
    assert_eq!(inactive.len(), 1);
    let attempts = set.entry(&inactive[0]).unwrap().retry().attempts();
    assert!((1..=NUM_TASKS as u32).contains(&attempts), "attempts = {attempts}");
    assert_eq!(live.connections(), NUM_TASKS);
}

/// Test: Concurrent operations sharing one connection each get their own answer
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_shared_connection_operations() {
    init_logging();

    const NUM_OPS: usize = 200;

    let server = MockServer::directory().await.unwrap();
    let stream = TcpStream::connect(server.addr()).await.unwrap();
    let conn = Arc::new(Connection::new(
        Endpoint::parse(&server.url()).unwrap(),
        stream,
    ));
    conn.simple_bind(ADMIN_DN, PASSWORD).await.unwrap();

    let mut tasks = JoinSet::new();
    for i in 0..NUM_OPS {
        let conn = conn.clone();
        tasks.spawn(async move {
            let value = if i % 2 == 0 { "blue" } else { "green" };
            let matched = conn
                .compare(CompareRequest::new("cn=widget", "color", value))
                .await?;
            Ok::<_, ldap::LdapError>((i, matched))
        });
    }

    let mut matches = 0;
    while let Some(outcome) = tasks.join_next().await {
        let (i, matched) = outcome.unwrap().unwrap();
        assert_eq!(matched, i % 2 == 0, "operation {i}");
        if matched {
            matches += 1;
        }
    }
    assert_eq!(matches, NUM_OPS / 2);
    assert!(!conn.is_closed());
    assert_eq!(server.requests(), NUM_OPS + 1);
}

/// Test: Failures and recoveries from many threads never lose or duplicate
/// an endpoint
#[test]
fn test_endpoint_set_partition_under_contention() {
    init_logging();

    const NUM_WORKERS: usize = 8;
    const ITERATIONS: usize = 2_000;

    let endpoints: Vec<_> = (1..=6)
        .map(|i| Endpoint::parse(&format!("ldap://ldap{i}.example.com")).unwrap())
        .collect();
    let set = Arc::new(EndpointSet::new(endpoints.clone()).unwrap());
    let done = Arc::new(AtomicBool::new(false));
    let snapshots = Arc::new(AtomicUsize::new(0));

    let checker = {
        let set = set.clone();
        let done = done.clone();
        let snapshots = snapshots.clone();
        let total = endpoints.len();
        std::thread::spawn(move || {
            loop {
                let finished = done.load(Ordering::SeqCst);
                let snapshot = set.snapshot();
                let seen: HashSet<_> = snapshot
                    .active
                    .iter()
                    .chain(&snapshot.inactive)
                    .map(|entry| entry.endpoint().clone())
                    .collect();
                assert_eq!(snapshot.active.len() + snapshot.inactive.len(), total);
                assert_eq!(seen.len(), total);
                snapshots.fetch_add(1, Ordering::SeqCst);
                if finished {
                    break;
                }
            }
        })
    };

    let workers: Vec<_> = (0..NUM_WORKERS)
        .map(|worker| {
            let set = set.clone();
            let endpoints = endpoints.clone();
            std::thread::spawn(move || {
                let promotion = if worker % 2 == 0 {
                    Promotion::Restore
                } else {
                    Promotion::Append
                };
                for i in 0..ITERATIONS {
                    let endpoint = &endpoints[(worker + i) % endpoints.len()];
                    if (worker + i) % 3 == 0 {
                        set.record_success(endpoint, promotion);
                    } else {
                        set.record_failure(endpoint, Instant::now());
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    checker.join().unwrap();
    assert!(snapshots.load(Ordering::SeqCst) > 0);

    for endpoint in &endpoints {
        set.record_success(endpoint, Promotion::Restore);
    }
    let active: HashSet<_> = set.active().into_iter().collect();
    assert_eq!(active, endpoints.iter().cloned().collect::<HashSet<_>>());
    assert!(set.inactive().is_empty());
    for endpoint in &endpoints {
        let entry = set.entry(endpoint).unwrap();
        assert!(!entry.retry().has_recorded_failure());
        assert!(entry.retry().failure_time().is_none());
    }
}

/// Test: The factory stays usable while its endpoints flap
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connects_while_endpoints_flap() {
    init_logging();

    const ROUNDS: usize = 50;

    let a = MockServer::directory().await.unwrap();
    let b = MockServer::directory().await.unwrap();
    let config = ConnectionConfig::builder()
        .url(format!("{} {}", a.url(), b.url()))
        .strategy(StrategyKind::Random)
        .simple_bind(ADMIN_DN, PASSWORD)
        .build();
    let factory = Arc::new(ConnectionFactory::new(config).unwrap());
    let stop = Arc::new(AtomicBool::new(false));

    let flapper = {
        let factory = factory.clone();
        let stop = stop.clone();
        tokio::task::spawn_blocking(move || {
            let endpoints = factory.strategy().endpoint_set().active();
            let mut i = 0;
            while !stop.load(Ordering::SeqCst) {
                let endpoint = &endpoints[i % endpoints.len()];
                factory.strategy().record_failure(endpoint, Instant::now());
                std::thread::sleep(Duration::from_micros(200));
                factory.strategy().record_success(endpoint);
                i += 1;
            }
        })
    };

    for _ in 0..ROUNDS {
        factory.connect().await.unwrap();
    }
    stop.store(true, Ordering::SeqCst);
    flapper.await.unwrap();

    let set = factory.strategy().endpoint_set();
    assert_eq!(set.active().len() + set.inactive().len(), 2);
    assert_eq!(a.connections() + b.connections(), ROUNDS);
}
