//! Page fetcher: one GET per borrowed pool connection
//!
//! The fetcher is the only component that touches the pool. It borrows a
//! connection for exactly one request and the borrow is released
//! unconditionally: the guard re-pools the connection on success and
//! discards it on transport failure, so a failed request can never leak a
//! slot.

use crate::config::CatalogConfig;
use crate::pool::{ConnectionPool, PoolError, TransportError};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Errors raised while fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL '{url}': {source}")]
    Url {
        url: String,
        source: url::ParseError,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unexpected HTTP status {status} for {url}")]
    Status { status: u16, url: String },
}

impl FetchError {
    /// Whether the owning task should treat this failure as an empty page
    /// rather than fail
    ///
    /// Transport and status failures degrade to "no content" so one bad
    /// page never aborts a run. Pool exhaustion and malformed URLs are
    /// hard failures surfaced through the task handle.
    pub fn degrades_to_empty(&self) -> bool {
        matches!(self, FetchError::Transport(_) | FetchError::Status { .. })
    }
}

/// Fetches pages through the shared connection pool with fixed headers
#[derive(Clone)]
pub struct PageFetcher {
    pool: Arc<ConnectionPool>,
    headers: Arc<Vec<(String, String)>>,
}

impl PageFetcher {
    /// Builds a fetcher carrying the catalog's user agent and optional
    /// session cookie on every request
    pub fn new(pool: Arc<ConnectionPool>, catalog: &CatalogConfig) -> Self {
        let mut headers = vec![("user-agent".to_string(), catalog.user_agent.clone())];
        if let Some(cookie) = &catalog.session_cookie {
            if !cookie.is_empty() {
                headers.push(("cookie".to_string(), cookie.clone()));
            }
        }

        Self {
            pool,
            headers: Arc::new(headers),
        }
    }

    /// Fetches `url` and returns the response body
    ///
    /// Acquires a connection for the URL's host, issues the GET, and
    /// releases the borrow either way. Non-2xx responses are reported as
    /// [`FetchError::Status`].
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let host = host_key(url).map_err(|source| FetchError::Url {
            url: url.to_string(),
            source,
        })?;

        let mut conn = self.pool.acquire(&host).await?;

        match conn.get(url, &self.headers).await {
            Ok(response) if (200..300).contains(&response.status) => {
                tracing::trace!(url, bytes = response.body.len(), "fetched page");
                Ok(response.body)
            }
            Ok(response) => {
                // The connection is still healthy; the guard re-pools it.
                tracing::debug!(url, status = response.status, "non-success status");
                Err(FetchError::Status {
                    status: response.status,
                    url: url.to_string(),
                })
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "transport failure");
                conn.discard();
                Err(FetchError::Transport(e))
            }
        }
    }
}

/// Pool key for a URL's destination: host plus explicit port when present
fn host_key(url: &str) -> Result<String, url::ParseError> {
    let parsed = Url::parse(url)?;
    let host = parsed.host_str().ok_or(url::ParseError::EmptyHost)?;
    match parsed.port() {
        Some(port) => Ok(format!("{}:{}", host, port)),
        None => Ok(host.to_string()),
    }
}
