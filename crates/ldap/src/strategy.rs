//! Connection strategies
//!
//! A strategy owns an [`EndpointSet`] and decides the order in which its
//! endpoints are tried. Every strategy offers the same contract:
//!
//! - `next_endpoints` lists the active endpoints in policy order followed by
//!   the inactive endpoints in failure order
//! - `record_success` clears an endpoint's failure history and reactivates it
//! - `record_failure` counts a failure and deactivates the endpoint
//! - `next_active` picks the next active endpoint to use
//!
//! The strategy never retries on its own; compensation for endpoint failures
//! belongs to the caller walking `next_endpoints`.

use crate::dns_srv::{DnsSrvOptions, DnsSrvStrategy};
use crate::endpoint::Endpoint;
use crate::endpoint_set::{EndpointEntry, EndpointSet, Promotion, Snapshot};
use crate::error::{LdapError, Result};
use rand::seq::{IndexedRandom, SliceRandom};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Endpoint selection policy shared by every connection of a factory
pub trait ConnectionStrategy: Send + Sync + fmt::Debug {
    fn kind(&self) -> StrategyKind;

    fn endpoint_set(&self) -> &EndpointSet;

    /// Endpoints to attempt, most preferred first
    fn next_endpoints(&self) -> Vec<Endpoint>;

    /// The next active endpoint per policy, if any is active
    fn next_active(&self) -> Option<Endpoint>;

    fn record_success(&self, endpoint: &Endpoint);

    fn record_failure(&self, endpoint: &Endpoint, time: Instant);
}

impl dyn ConnectionStrategy {
    /// Invoke `f` with the next active endpoint.
    ///
    /// Fails with `NoAvailableEndpoints` when every endpoint is inactive.
    pub fn do_with_next_active<R>(&self, f: impl FnOnce(&Endpoint) -> R) -> Result<R> {
        let endpoint = self
            .next_active()
            .ok_or(LdapError::NoAvailableEndpoints {
                attempted: 0,
                last_error: None,
            })?;
        Ok(f(&endpoint))
    }
}

/// The closed set of strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    #[default]
    ActivePassive,
    RoundRobin,
    Random,
    DnsSrv,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActivePassive => "active-passive",
            Self::RoundRobin => "round-robin",
            Self::Random => "random",
            Self::DnsSrv => "dns-srv",
        }
    }

    /// Parse the configuration string and build the strategy
    pub fn initialize(
        &self,
        urls: &str,
        options: &StrategyOptions,
    ) -> Result<Arc<dyn ConnectionStrategy>> {
        Ok(match self {
            Self::ActivePassive => Arc::new(ActivePassiveStrategy::new(urls, options)?),
            Self::RoundRobin => Arc::new(RoundRobinStrategy::new(urls, options)?),
            Self::Random => Arc::new(RandomStrategy::new(urls, options)?),
            Self::DnsSrv => {
                let dns = options.dns.clone().ok_or_else(|| {
                    LdapError::Configuration(
                        "dns-srv strategy requires an SRV resolver".to_string(),
                    )
                })?;
                Arc::new(DnsSrvStrategy::new(urls, dns, options.inactive_retry_interval)?)
            }
        })
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = LdapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active-passive" | "activepassive" => Ok(Self::ActivePassive),
            "round-robin" | "roundrobin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            "dns-srv" | "dns" => Ok(Self::DnsSrv),
            other => Err(LdapError::Configuration(format!(
                "unknown connection strategy '{other}'"
            ))),
        }
    }
}

/// Settings common to all strategies
#[derive(Debug, Clone, Default)]
pub struct StrategyOptions {
    /// Inactive endpoints whose last failure is more recent than this are
    /// left out of `next_endpoints`
    pub inactive_retry_interval: Option<Duration>,
    /// Required by the DNS-SRV strategy
    pub dns: Option<DnsSrvOptions>,
}

impl StrategyOptions {
    pub fn with_inactive_retry_interval(mut self, interval: Duration) -> Self {
        self.inactive_retry_interval = Some(interval);
        self
    }

    pub fn with_dns(mut self, dns: DnsSrvOptions) -> Self {
        self.dns = Some(dns);
        self
    }
}

/// Active entries in the given order, then inactive entries that are due
/// for another attempt
pub(crate) fn attempt_order(
    active: Vec<Arc<EndpointEntry>>,
    inactive: &[Arc<EndpointEntry>],
    retry_interval: Option<Duration>,
    now: Instant,
) -> Vec<Endpoint> {
    let due = |entry: &Arc<EndpointEntry>| match (retry_interval, entry.retry().failure_time()) {
        (Some(interval), Some(failed_at)) => now.saturating_duration_since(failed_at) >= interval,
        _ => true,
    };
    active
        .iter()
        .chain(inactive.iter().filter(|e| due(e)))
        .map(|e| e.endpoint().clone())
        .collect()
}

/// Always prefers the first configured endpoint that is still active
#[derive(Debug)]
pub struct ActivePassiveStrategy {
    set: EndpointSet,
    retry_interval: Option<Duration>,
}

impl ActivePassiveStrategy {
    pub fn new(urls: &str, options: &StrategyOptions) -> Result<Self> {
        Ok(Self {
            set: EndpointSet::new(Endpoint::parse_list(urls)?)?,
            retry_interval: options.inactive_retry_interval,
        })
    }
}

impl ConnectionStrategy for ActivePassiveStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ActivePassive
    }

    fn endpoint_set(&self) -> &EndpointSet {
        &self.set
    }

    fn next_endpoints(&self) -> Vec<Endpoint> {
        let Snapshot { active, inactive } = self.set.snapshot();
        attempt_order(active, &inactive, self.retry_interval, Instant::now())
    }

    fn next_active(&self) -> Option<Endpoint> {
        self.set.active().into_iter().next()
    }

    fn record_success(&self, endpoint: &Endpoint) {
        self.set.record_success(endpoint, Promotion::Restore);
    }

    fn record_failure(&self, endpoint: &Endpoint, time: Instant) {
        self.set.record_failure(endpoint, time);
    }
}

/// Rotates the starting endpoint on every selection
#[derive(Debug)]
pub struct RoundRobinStrategy {
    set: EndpointSet,
    retry_interval: Option<Duration>,
    cursor: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new(urls: &str, options: &StrategyOptions) -> Result<Self> {
        Ok(Self {
            set: EndpointSet::new(Endpoint::parse_list(urls)?)?,
            retry_interval: options.inactive_retry_interval,
            cursor: AtomicUsize::new(0),
        })
    }
}

impl ConnectionStrategy for RoundRobinStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RoundRobin
    }

    fn endpoint_set(&self) -> &EndpointSet {
        &self.set
    }

    fn next_endpoints(&self) -> Vec<Endpoint> {
        let Snapshot {
            mut active,
            inactive,
        } = self.set.snapshot();
        if !active.is_empty() {
            let start = self.cursor.fetch_add(1, Ordering::Relaxed) % active.len();
            active.rotate_left(start);
        }
        attempt_order(active, &inactive, self.retry_interval, Instant::now())
    }

    fn next_active(&self) -> Option<Endpoint> {
        let active = self.set.active();
        if active.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % active.len();
        active.into_iter().nth(index)
    }

    fn record_success(&self, endpoint: &Endpoint) {
        self.set.record_success(endpoint, Promotion::Append);
    }

    fn record_failure(&self, endpoint: &Endpoint, time: Instant) {
        self.set.record_failure(endpoint, time);
    }
}

/// Uniform choice among active endpoints
#[derive(Debug)]
pub struct RandomStrategy {
    set: EndpointSet,
    retry_interval: Option<Duration>,
}

impl RandomStrategy {
    pub fn new(urls: &str, options: &StrategyOptions) -> Result<Self> {
        Ok(Self {
            set: EndpointSet::new(Endpoint::parse_list(urls)?)?,
            retry_interval: options.inactive_retry_interval,
        })
    }
}

impl ConnectionStrategy for RandomStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Random
    }

    fn endpoint_set(&self) -> &EndpointSet {
        &self.set
    }

    fn next_endpoints(&self) -> Vec<Endpoint> {
        let Snapshot {
            mut active,
            inactive,
        } = self.set.snapshot();
        active.shuffle(&mut rand::rng());
        attempt_order(active, &inactive, self.retry_interval, Instant::now())
    }

    fn next_active(&self) -> Option<Endpoint> {
        self.set.active().choose(&mut rand::rng()).cloned()
    }

    fn record_success(&self, endpoint: &Endpoint) {
        self.set.record_success(endpoint, Promotion::Append);
    }

    fn record_failure(&self, endpoint: &Endpoint, time: Instant) {
        self.set.record_failure(endpoint, time);
    }
}
