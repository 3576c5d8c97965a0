//! Directory server endpoints
//!
//! An endpoint is the parsed form of one LDAP URL:
//!
//! ```text
//! scheme://host[:port][/base-dn]
//! ```
//!
//! Only the scheme, host, port and base DN are kept; the attribute, scope and
//! filter extensions of RFC 4516 are ignored.

use crate::error::{LdapError, Result};
use std::fmt;
use std::str::FromStr;
use url::{Host, Url};

/// Default port for `ldap://`
pub const LDAP_PORT: u16 = 389;
/// Default port for `ldaps://`
pub const LDAPS_PORT: u16 = 636;

/// URL scheme of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Ldap,
    Ldaps,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ldap => "ldap",
            Self::Ldaps => "ldaps",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Ldap => LDAP_PORT,
            Self::Ldaps => LDAPS_PORT,
        }
    }
}

/// One directory server address
///
/// Equality and hashing are structural over the parsed parts, so
/// `ldap://Directory.example.com` and `ldap://directory.example.com:389`
/// are the same endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    scheme: Scheme,
    host: String,
    port: u16,
    base_dn: Option<String>,
}

impl Endpoint {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into().to_ascii_lowercase(),
            port,
            base_dn: None,
        }
    }

    pub fn with_base_dn(mut self, base_dn: impl Into<String>) -> Self {
        let base_dn = base_dn.into();
        self.base_dn = if base_dn.is_empty() { None } else { Some(base_dn) };
        self
    }

    /// Parse a single LDAP URL
    pub fn parse(url: &str) -> Result<Self> {
        let trimmed = url.trim();
        let parsed = Url::parse(trimmed)
            .map_err(|e| LdapError::Configuration(format!("invalid LDAP URL '{trimmed}': {e}")))?;

        let scheme = match parsed.scheme() {
            "ldap" => Scheme::Ldap,
            "ldaps" => Scheme::Ldaps,
            other => {
                return Err(LdapError::Configuration(format!(
                    "unsupported scheme '{other}' in '{trimmed}'"
                )))
            }
        };

        let host = match parsed.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => {
                return Err(LdapError::Configuration(format!(
                    "missing host in '{trimmed}'"
                )))
            }
        };

        let port = parsed.port().unwrap_or_else(|| scheme.default_port());
        let path = parsed.path().trim_start_matches('/');
        let base_dn = if path.is_empty() {
            None
        } else {
            let decoded = urlencoding::decode(path).map_err(|e| {
                LdapError::Configuration(format!("invalid base DN in '{trimmed}': {e}"))
            })?;
            Some(decoded.into_owned())
        };

        Ok(Self {
            scheme,
            host: host.to_ascii_lowercase(),
            port,
            base_dn,
        })
    }

    /// Parse a space-separated list of LDAP URLs, preserving source order.
    ///
    /// The list must hold at least one URL and no URL twice.
    pub fn parse_list(urls: &str) -> Result<Vec<Self>> {
        let mut endpoints: Vec<Self> = Vec::new();
        for token in urls.split_whitespace() {
            let endpoint = Self::parse(token)?;
            if endpoints.contains(&endpoint) {
                return Err(LdapError::Configuration(format!(
                    "duplicate LDAP URL '{token}'"
                )));
            }
            endpoints.push(endpoint);
        }
        if endpoints.is_empty() {
            return Err(LdapError::Configuration(
                "no LDAP URLs configured".to_string(),
            ));
        }
        Ok(endpoints)
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn hostname(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_dn(&self) -> Option<&str> {
        self.base_dn.as_deref()
    }

    pub fn is_tls(&self) -> bool {
        self.scheme == Scheme::Ldaps
    }

    /// `host:port`, with IPv6 literals bracketed
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.authority())?;
        if let Some(ref base_dn) = self.base_dn {
            write!(f, "/{}", urlencoding::encode(base_dn))?;
        }
        Ok(())
    }
}

impl FromStr for Endpoint {
    type Err = LdapError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
