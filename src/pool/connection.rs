//! Pooled connection representation and the HTTP transport behind it
//!
//! The pool itself is transport-agnostic: it manages [`PooledConnection`]
//! slots produced by a [`Connector`]. The production connector dials one
//! reqwest client per pooled slot, so one slot corresponds to one reusable
//! keep-alive connection to a host. Tests substitute a mock connector.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors raised by the transport layer
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request failed: {0}")]
    Request(String),
}

/// A raw response as seen by the pool: status, body, and the remote's
/// advertised keep-alive hint (if any)
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    pub keep_alive: Option<Duration>,
}

/// A single reusable connection-like transport bound to one destination
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues a GET request and reads the full body
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<RawResponse, TransportError>;
}

/// Factory that establishes new transports for a destination host
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// A connection owned by the pool
///
/// Only the pool holds these directly; callers borrow one through the
/// pool's acquire guard for the duration of a single request.
pub(crate) struct PooledConnection {
    pub(crate) id: u64,
    pub(crate) host: String,
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) created_at: Instant,
    pub(crate) last_used: Instant,
    pub(crate) keep_alive: Duration,
}

impl PooledConnection {
    pub(crate) fn new(
        id: u64,
        host: String,
        transport: Box<dyn Transport>,
        keep_alive: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            host,
            transport,
            created_at: now,
            last_used: now,
            keep_alive,
        }
    }

    /// Whether this idle connection should be reclaimed at `now`
    pub(crate) fn is_reclaimable(&self, now: Instant, idle_timeout: Duration) -> bool {
        let idle_for = now.saturating_duration_since(self.last_used);
        idle_for >= idle_timeout || idle_for >= self.keep_alive
    }
}

/// Production connector backed by reqwest
///
/// Each dialed transport is a dedicated client limited to a single idle
/// connection, so the pool's slot accounting maps one-to-one onto real
/// keep-alive connections.
pub struct HttpConnector {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl HttpConnector {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, host: &str) -> Result<Box<dyn Transport>, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.read_timeout)
            .pool_max_idle_per_host(1)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| TransportError::Connect(format!("{} ({})", e, host)))?;

        Ok(Box::new(HttpTransport { client }))
    }
}

struct HttpTransport {
    client: reqwest::Client,
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<RawResponse, TransportError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(classify_error)?;

        let status = response.status().as_u16();
        let keep_alive = response
            .headers()
            .get("keep-alive")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_keep_alive);

        let body = response.text().await.map_err(classify_error)?;

        Ok(RawResponse {
            status,
            body,
            keep_alive,
        })
    }
}

fn classify_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

/// Parses a `Keep-Alive: timeout=N` header value into a duration
///
/// Returns None when no timeout parameter is present, in which case the
/// pool falls back to its configured default keep-alive.
pub fn parse_keep_alive(value: &str) -> Option<Duration> {
    for param in value.split(',') {
        let mut parts = param.splitn(2, '=');
        let name = parts.next()?.trim();
        if name.eq_ignore_ascii_case("timeout") {
            let secs: u64 = parts.next()?.trim().parse().ok()?;
            return Some(Duration::from_secs(secs));
        }
    }
    None
}
