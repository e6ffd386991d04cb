//! Upstream servers and selection.
//!
//! Upstream URLs are normalized once, at pool construction: a missing scheme
//! defaults to `http://`, and hostnames are resolved so the reactor only
//! ever connects to already-resolved IPv4 addresses.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};

use thiserror::Error;
use url::Url;

use crate::config::Config;

/// Errors from pool construction and upstream selection.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("unsupported load balancer type: {0}")]
    UnsupportedPolicy(String),

    #[error("no upstream servers")]
    NoUpstreams,

    #[error("invalid upstream URL {url}: {reason}")]
    InvalidUpstream { url: String, reason: String },
}

/// One upstream endpoint with its already-resolved IPv4 address.
///
/// `authority` is the host\[:port\] text substituted into the forwarded
/// request's Host header; it carries a port exactly when the configured URL
/// did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    host: Ipv4Addr,
    port: u16,
    authority: String,
}

impl Backend {
    /// Parses and normalizes one configured upstream URL.
    pub fn from_url(raw: &str) -> Result<Self, PoolError> {
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        };

        let url = Url::parse(&with_scheme).map_err(|err| PoolError::InvalidUpstream {
            url: raw.to_string(),
            reason: err.to_string(),
        })?;

        let host = url.host_str().ok_or_else(|| PoolError::InvalidUpstream {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        })?;

        let port = url.port_or_known_default().unwrap_or(80);

        let ip = match host.parse::<Ipv4Addr>() {
            Ok(ip) => ip,
            Err(_) => {
                tracing::info!(host, "Resolving upstream hostname");
                resolve_first_ipv4(host, port).map_err(|reason| PoolError::InvalidUpstream {
                    url: raw.to_string(),
                    reason,
                })?
            }
        };

        let authority = match url.port() {
            Some(port) => format!("{ip}:{port}"),
            None => ip.to_string(),
        };

        Ok(Self {
            host: ip,
            port,
            authority,
        })
    }

    /// The address the reactor connects to.
    pub fn addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.host, self.port)
    }

    /// The Host header value for requests forwarded to this upstream.
    pub fn authority(&self) -> &str {
        &self.authority
    }
}

/// Resolves a hostname and keeps the first IPv4 address, as configured DNS
/// order dictates.
fn resolve_first_ipv4(host: &str, port: u16) -> Result<Ipv4Addr, String> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|err| format!("failed to resolve {host}: {err}"))?;

    addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| format!("no IPv4 addresses found for {host}"))
}

/// Pool of upstream servers with a selection policy.
///
/// Round-robin is the only policy: the i-th selection returns endpoint
/// `i mod N`. There is no health tracking and no skip-on-failure.
#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<Backend>,
    next: usize,
}

impl BackendPool {
    /// Builds a round-robin pool over explicit backends.
    pub fn new(backends: Vec<Backend>) -> Self {
        Self { backends, next: 0 }
    }

    /// Builds the pool from configuration, normalizing every upstream URL
    /// and checking the policy name.
    pub fn from_config(config: &Config) -> Result<Self, PoolError> {
        let mut backends = Vec::with_capacity(config.server.upstream_servers.len());
        for raw in &config.server.upstream_servers {
            let backend = Backend::from_url(raw)?;
            tracing::info!(upstream = %backend.authority(), "Added upstream server");
            backends.push(backend);
        }

        match config.server.load_balancer.as_str() {
            "round_robin" => Ok(Self::new(backends)),
            other => Err(PoolError::UnsupportedPolicy(other.to_string())),
        }
    }

    /// Selects the next upstream.
    pub fn select(&mut self) -> Result<Backend, PoolError> {
        if self.backends.is_empty() {
            return Err(PoolError::NoUpstreams);
        }
        let backend = self.backends[self.next].clone();
        self.next = (self.next + 1) % self.backends.len();
        Ok(backend)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
