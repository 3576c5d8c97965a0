//! DNS-SRV endpoint discovery (RFC 2782)
//!
//! Discovery URLs take the forms
//!
//! ```text
//! dns:
//! dns:?service
//! dns://[authority][/domain]
//! dns://[authority][/domain]?service
//! ```
//!
//! An empty authority (`dns://`, `dns:///example.org`) means the default
//! resolver.
//!
//! The SRV records found for the derived service name become the endpoint
//! list, ordered by priority then weight. The list is re-resolved once it is
//! older than the configured TTL.

use crate::endpoint::{Endpoint, Scheme};
use crate::endpoint_set::{EndpointSet, Promotion, Snapshot};
use crate::error::{LdapError, Result};
use crate::strategy::{attempt_order, ConnectionStrategy, StrategyKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default lifetime of a resolved endpoint list
pub const DEFAULT_DNS_SRV_TTL: Duration = Duration::from_secs(30 * 60);

/// How long a failed resolution is trusted before the next lookup
pub const DEFAULT_DNS_SRV_FAILURE_BACKOFF: Duration = Duration::from_secs(30);

const DEFAULT_SERVICE: &str = "_ldap._tcp";
const DNS_SCHEME: &str = "dns:";

/// One SRV resource record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

impl SrvRecord {
    pub fn new(priority: u16, weight: u16, port: u16, target: impl Into<String>) -> Self {
        Self {
            priority,
            weight,
            port,
            target: target.into(),
        }
    }
}

/// SRV lookup to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvQuery {
    /// Resolver part of the discovery URL, `dns:` for the system resolver
    pub resolver: String,
    /// Fully qualified service name, e.g. `_ldap._tcp.example.com`
    pub name: String,
}

/// Source of SRV records
pub trait SrvResolver: Send + Sync + fmt::Debug {
    fn resolve_srv(&self, query: &SrvQuery) -> Result<Vec<SrvRecord>>;
}

/// In-memory SRV table keyed by service name
#[derive(Debug, Default)]
pub struct StaticSrvResolver {
    records: RwLock<HashMap<String, Vec<SrvRecord>>>,
}

impl StaticSrvResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(self, name: impl Into<String>, records: Vec<SrvRecord>) -> Self {
        self.set_records(name, records);
        self
    }

    /// Replace the records published under `name`
    pub fn set_records(&self, name: impl Into<String>, records: Vec<SrvRecord>) {
        self.records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.into(), records);
    }
}

impl SrvResolver for StaticSrvResolver {
    fn resolve_srv(&self, query: &SrvQuery) -> Result<Vec<SrvRecord>> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&query.name)
            .cloned()
            .unwrap_or_default())
    }
}

/// Split a discovery URL into its resolver target and optional service name
pub fn parse_dns_url(url: &str) -> Result<(String, Option<String>)> {
    let url = url.trim();
    if !url.starts_with(DNS_SCHEME) {
        return Err(LdapError::Configuration(format!(
            "invalid DNS discovery URL '{url}'"
        )));
    }
    let (target, service) = match url.split_once('?') {
        Some((target, service)) => (target, Some(service)),
        None => (url, None),
    };
    if !target.starts_with("dns://") && target != DNS_SCHEME {
        return Err(LdapError::Configuration(format!(
            "invalid DNS discovery URL '{url}'"
        )));
    }
    let service = service.filter(|s| !s.is_empty()).map(str::to_string);
    Ok((target.to_string(), service))
}

/// SRV name to query for a parsed discovery URL.
///
/// A domain path that already starts with a service label
/// (`dns:///_ldap._tcp.example.org`) is queried as given.
pub fn srv_name(target: &str, service: Option<&str>, base_dn: Option<&str>) -> String {
    let domain = target
        .strip_prefix("dns://")
        .and_then(|rest| rest.split_once('/'))
        .map(|(_, domain)| domain.trim_matches('/'))
        .filter(|domain| !domain.is_empty());

    match (domain, service) {
        (Some(domain), None) if domain.starts_with('_') => domain.to_string(),
        (Some(domain), service) => {
            format!("{}.{}", service.unwrap_or(DEFAULT_SERVICE), domain)
        }
        (None, Some(service)) => service.to_string(),
        (None, None) => match base_dn.map(domain_of_dn).filter(|d| !d.is_empty()) {
            Some(domain) => format!("{DEFAULT_SERVICE}.{domain}"),
            None => DEFAULT_SERVICE.to_string(),
        },
    }
}

/// DNS domain named by the `dc=` components of a DN
fn domain_of_dn(dn: &str) -> String {
    dn.split(',')
        .filter_map(|rdn| {
            let (attr, value) = rdn.trim().split_once('=')?;
            attr.trim()
                .eq_ignore_ascii_case("dc")
                .then(|| value.trim().to_string())
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Order records by priority, then by descending weight, and turn them into
/// endpoints. A target of "." means the service is not offered there.
pub fn records_to_endpoints(mut records: Vec<SrvRecord>, scheme: Scheme) -> Vec<Endpoint> {
    records.sort_by(|a, b| a.priority.cmp(&b.priority).then(b.weight.cmp(&a.weight)));
    let mut endpoints: Vec<Endpoint> = Vec::with_capacity(records.len());
    for record in records {
        let host = record.target.trim_end_matches('.');
        if host.is_empty() {
            continue;
        }
        let endpoint = Endpoint::new(scheme, host, record.port);
        if !endpoints.contains(&endpoint) {
            endpoints.push(endpoint);
        }
    }
    endpoints
}

/// Settings of the DNS-SRV strategy
#[derive(Clone)]
pub struct DnsSrvOptions {
    pub resolver: Arc<dyn SrvResolver>,
    pub ttl: Duration,
    /// Build `ldaps://` endpoints instead of `ldap://`
    pub use_tls: bool,
    /// Domain fallback when a discovery URL names neither domain nor service
    pub base_dn: Option<String>,
    /// Quiet period after a failed resolution
    pub failure_backoff: Duration,
}

impl DnsSrvOptions {
    pub fn new(resolver: Arc<dyn SrvResolver>) -> Self {
        Self {
            resolver,
            ttl: DEFAULT_DNS_SRV_TTL,
            use_tls: false,
            base_dn: None,
            failure_backoff: DEFAULT_DNS_SRV_FAILURE_BACKOFF,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn with_base_dn(mut self, base_dn: impl Into<String>) -> Self {
        self.base_dn = Some(base_dn.into());
        self
    }

    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }
}

impl fmt::Debug for DnsSrvOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsSrvOptions")
            .field("ttl", &self.ttl)
            .field("use_tls", &self.use_tls)
            .field("base_dn", &self.base_dn)
            .field("failure_backoff", &self.failure_backoff)
            .finish_non_exhaustive()
    }
}

/// Endpoints discovered through SRV records, kept in priority order
#[derive(Debug)]
pub struct DnsSrvStrategy {
    queries: Vec<SrvQuery>,
    options: DnsSrvOptions,
    retry_interval: Option<Duration>,
    set: EndpointSet,
    resolved_at: Mutex<Option<Instant>>,
    /// No lookups before this time; set when a resolution fails
    backoff_until: Mutex<Option<Instant>>,
    refresh: Mutex<()>,
}

impl DnsSrvStrategy {
    /// Parse the discovery URLs and perform the first resolution.
    ///
    /// A failing first resolution leaves the set empty and is retried on the
    /// next call to `next_endpoints`.
    pub fn new(urls: &str, options: DnsSrvOptions, retry_interval: Option<Duration>) -> Result<Self> {
        let mut queries = Vec::new();
        for url in urls.split_whitespace() {
            let (resolver, service) = parse_dns_url(url)?;
            let name = srv_name(&resolver, service.as_deref(), options.base_dn.as_deref());
            queries.push(SrvQuery { resolver, name });
        }
        if queries.is_empty() {
            return Err(LdapError::Configuration(
                "no DNS discovery URLs configured".to_string(),
            ));
        }

        let strategy = Self {
            queries,
            options,
            retry_interval,
            set: EndpointSet::default(),
            resolved_at: Mutex::new(None),
            backoff_until: Mutex::new(None),
            refresh: Mutex::new(()),
        };
        strategy.refresh_if_stale(Instant::now());
        Ok(strategy)
    }

    /// Time of the last successful resolution
    pub fn resolved_at(&self) -> Option<Instant> {
        *self
            .resolved_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_stale(&self, now: Instant) -> bool {
        let backoff_until = *self
            .backoff_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if backoff_until.is_some_and(|until| now < until) {
            return false;
        }
        match self.resolved_at() {
            Some(at) => now.saturating_duration_since(at) >= self.options.ttl,
            None => true,
        }
    }

    /// Re-resolve if the list has outlived its TTL.
    ///
    /// One caller resolves at a time; callers that waited for it find the list
    /// fresh and return without resolving again.
    pub fn refresh_if_stale(&self, now: Instant) {
        if !self.is_stale(now) {
            return;
        }
        let _refresh = self
            .refresh
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !self.is_stale(now) {
            return;
        }

        match self.resolve() {
            Ok(endpoints) => {
                debug!(count = endpoints.len(), "resolved SRV endpoints");
                if let Err(e) = self.set.replace(endpoints) {
                    warn!(error = %e, "discarding SRV resolution");
                    return;
                }
                *self
                    .resolved_at
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Instant::now());
            }
            Err(e) => {
                warn!(
                    error = %e,
                    endpoints = self.set.len(),
                    backoff = ?self.options.failure_backoff,
                    "SRV resolution failed, keeping previous endpoints"
                );
                *self
                    .backoff_until
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) =
                    Some(Instant::now() + self.options.failure_backoff);
            }
        }
    }

    fn resolve(&self) -> Result<Vec<Endpoint>> {
        let scheme = if self.options.use_tls {
            Scheme::Ldaps
        } else {
            Scheme::Ldap
        };
        let mut last_error = None;
        let mut answered = false;
        for query in &self.queries {
            match self.options.resolver.resolve_srv(query) {
                Ok(records) if !records.is_empty() => {
                    return Ok(records_to_endpoints(records, scheme));
                }
                Ok(_) => {
                    debug!(name = %query.name, "no SRV records");
                    answered = true;
                }
                Err(e) => {
                    debug!(name = %query.name, error = %e, "SRV lookup failed");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(Vec::new()),
        }
    }
}

impl ConnectionStrategy for DnsSrvStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DnsSrv
    }

    fn endpoint_set(&self) -> &EndpointSet {
        &self.set
    }

    fn next_endpoints(&self) -> Vec<Endpoint> {
        let now = Instant::now();
        self.refresh_if_stale(now);
        let Snapshot { active, inactive } = self.set.snapshot();
        attempt_order(active, &inactive, self.retry_interval, now)
    }

    fn next_active(&self) -> Option<Endpoint> {
        self.refresh_if_stale(Instant::now());
        self.set.active().into_iter().next()
    }

    fn record_success(&self, endpoint: &Endpoint) {
        self.set.record_success(endpoint, Promotion::Restore);
    }

    fn record_failure(&self, endpoint: &Endpoint, time: Instant) {
        self.set.record_failure(endpoint, time);
    }
}
