//! Bounded keep-alive connection pool with background idle eviction
//!
//! The pool is the process-wide concurrency limiter for all outbound
//! traffic: it enforces a global connection cap and a per-destination cap,
//! hands out exclusive borrows with an acquisition timeout, and reclaims
//! idle or keep-alive-expired connections on a fixed background cycle. A
//! borrowed connection is never visible to the evictor; it re-enters the
//! idle set only when its guard is dropped.

use crate::config::PoolConfig;
use crate::pool::connection::{Connector, PooledConnection, RawResponse, TransportError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout_at;

/// Errors raised by the connection pool
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("timed out acquiring a connection for {host}")]
    AcquireTimeout { host: String },

    #[error("failed to establish a connection to {host}: {message}")]
    Connect { host: String, message: String },

    #[error("connection pool is shut down")]
    Closed,
}

/// Counters describing the pool's current occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently borrowed by in-flight requests
    pub in_use: usize,

    /// Connections parked in the idle set
    pub idle: usize,
}

struct PoolState {
    idle: HashMap<String, VecDeque<PooledConnection>>,
    idle_total: usize,
    in_use_total: usize,
    in_use_per_host: HashMap<String, usize>,
    closed: bool,
}

impl PoolState {
    fn new() -> Self {
        Self {
            idle: HashMap::new(),
            idle_total: 0,
            in_use_total: 0,
            in_use_per_host: HashMap::new(),
            closed: false,
        }
    }

    fn total(&self) -> usize {
        self.in_use_total + self.idle_total
    }

    fn in_use_for(&self, host: &str) -> usize {
        self.in_use_per_host.get(host).copied().unwrap_or(0)
    }

    /// Moves the most recently parked idle connection for `host` into the
    /// borrowed set
    fn take_idle(&mut self, host: &str) -> Option<PooledConnection> {
        let queue = self.idle.get_mut(host)?;
        let conn = queue.pop_back()?;
        if queue.is_empty() {
            self.idle.remove(host);
        }
        self.idle_total -= 1;
        self.in_use_total += 1;
        *self.in_use_per_host.entry(host.to_string()).or_insert(0) += 1;
        Some(conn)
    }

    /// Reserves a borrow slot before dialing, so concurrent acquirers
    /// cannot overshoot the caps while a connect is in flight
    fn reserve(&mut self, host: &str) {
        self.in_use_total += 1;
        *self.in_use_per_host.entry(host.to_string()).or_insert(0) += 1;
    }

    fn release_slot(&mut self, host: &str) {
        self.in_use_total -= 1;
        if let Some(count) = self.in_use_per_host.get_mut(host) {
            *count -= 1;
            if *count == 0 {
                self.in_use_per_host.remove(host);
            }
        }
    }

    /// Drops the longest-idle connection of any host to make room under
    /// the global cap. Returns false when the idle set is empty.
    fn evict_one_idle(&mut self) -> bool {
        let oldest_host = self
            .idle
            .iter()
            .filter_map(|(host, queue)| queue.front().map(|c| (host.clone(), c.last_used)))
            .min_by_key(|(_, last_used)| *last_used)
            .map(|(host, _)| host);

        let Some(host) = oldest_host else {
            return false;
        };

        if let Some(queue) = self.idle.get_mut(&host) {
            if let Some(conn) = queue.pop_front() {
                tracing::debug!(host = %conn.host, id = conn.id, "dropping idle connection to free a global slot");
                self.idle_total -= 1;
            }
            if queue.is_empty() {
                self.idle.remove(&host);
            }
        }
        true
    }
}

struct Shared {
    state: Mutex<PoolState>,
    notify: Notify,
}

impl Shared {
    /// Returns a borrowed connection to the idle set (or drops it when the
    /// pool has shut down) and wakes waiting acquirers
    fn release(&self, mut conn: PooledConnection) {
        {
            let mut state = self.state.lock().unwrap();
            state.release_slot(&conn.host);
            if !state.closed {
                conn.last_used = Instant::now();
                state.idle_total += 1;
                state
                    .idle
                    .entry(conn.host.clone())
                    .or_default()
                    .push_back(conn);
            }
        }
        self.notify.notify_waiters();
    }

    /// Frees a borrow slot without returning the connection, used when a
    /// request failed and the connection may be broken
    fn forget(&self, conn: PooledConnection) {
        {
            let mut state = self.state.lock().unwrap();
            state.release_slot(&conn.host);
        }
        tracing::debug!(host = %conn.host, id = conn.id, "discarding connection after transport failure");
        self.notify.notify_waiters();
    }

    /// Reclaims idle connections past their idle threshold or keep-alive
    /// expiry. Borrowed connections are not in the idle set and are never
    /// touched. Returns the number of connections closed.
    fn evict_idle(&self, now: Instant, idle_timeout: Duration) -> usize {
        let mut closed = 0;
        {
            let mut state = self.state.lock().unwrap();
            state.idle.retain(|_, queue| {
                queue.retain(|conn| {
                    if conn.is_reclaimable(now, idle_timeout) {
                        tracing::trace!(
                            host = %conn.host,
                            id = conn.id,
                            age_secs = now.saturating_duration_since(conn.created_at).as_secs(),
                            "evicting idle connection"
                        );
                        closed += 1;
                        false
                    } else {
                        true
                    }
                });
                !queue.is_empty()
            });
            state.idle_total -= closed;
        }
        if closed > 0 {
            self.notify.notify_waiters();
        }
        closed
    }
}

/// Bounded, host-keyed connection pool
///
/// Constructed once per process and shared (via `Arc`) by every fetch task.
/// [`ConnectionPool::shutdown`] stops the background evictor before the
/// idle set is drained.
pub struct ConnectionPool {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    next_id: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    evictor: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPool {
    /// Creates a pool and starts its background eviction cycle
    pub fn new(config: PoolConfig, connector: Arc<dyn Connector>) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState::new()),
            notify: Notify::new(),
        });

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let evictor_shared = Arc::clone(&shared);
        let idle_timeout = config.idle_timeout();
        let evict_interval = config.evict_interval();
        let evictor = tokio::spawn(async move {
            let mut interval = tokio::time::interval(evict_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let closed = evictor_shared.evict_idle(Instant::now(), idle_timeout);
                        if closed > 0 {
                            tracing::debug!(closed, "eviction cycle reclaimed idle connections");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        Self {
            shared,
            connector,
            config,
            next_id: AtomicU64::new(1),
            shutdown_tx,
            evictor: Mutex::new(Some(evictor)),
        }
    }

    /// Borrows a connection for `host`, reusing an idle one when possible
    /// and dialing a new one while the caps allow it
    ///
    /// Waits up to the configured acquisition timeout for a slot to free up;
    /// a saturated pool surfaces as [`PoolError::AcquireTimeout`].
    pub async fn acquire(&self, host: &str) -> Result<PooledConn, PoolError> {
        enum Action {
            Reuse(PooledConnection),
            Dial,
            Wait,
        }

        let deadline = tokio::time::Instant::now() + self.config.acquire_timeout();

        loop {
            // Register interest in release notifications before inspecting
            // the state, otherwise a release between the unlock and the
            // await below could be missed.
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let action = {
                let mut state = self.shared.state.lock().unwrap();
                if state.closed {
                    return Err(PoolError::Closed);
                }

                if let Some(conn) = state.take_idle(host) {
                    Action::Reuse(conn)
                } else if state.in_use_for(host) >= self.config.max_per_host {
                    Action::Wait
                } else if state.total() < self.config.max_connections {
                    state.reserve(host);
                    Action::Dial
                } else if state.evict_one_idle() {
                    // The global cap was reached but another host held an
                    // idle connection; its slot is now free.
                    state.reserve(host);
                    Action::Dial
                } else {
                    Action::Wait
                }
            };

            match action {
                Action::Reuse(conn) => {
                    tracing::trace!(host, id = conn.id, "reusing pooled connection");
                    return Ok(PooledConn::new(conn, Arc::clone(&self.shared)));
                }
                Action::Dial => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    match self.connector.connect(host).await {
                        Ok(transport) => {
                            tracing::debug!(host, id, "established new connection");
                            let conn = PooledConnection::new(
                                id,
                                host.to_string(),
                                transport,
                                self.config.default_keep_alive(),
                            );
                            return Ok(PooledConn::new(conn, Arc::clone(&self.shared)));
                        }
                        Err(e) => {
                            {
                                let mut state = self.shared.state.lock().unwrap();
                                state.release_slot(host);
                            }
                            self.shared.notify.notify_waiters();
                            return Err(PoolError::Connect {
                                host: host.to_string(),
                                message: e.to_string(),
                            });
                        }
                    }
                }
                Action::Wait => {
                    if timeout_at(deadline, notified).await.is_err() {
                        return Err(PoolError::AcquireTimeout {
                            host: host.to_string(),
                        });
                    }
                }
            }
        }
    }

    /// Runs one eviction sweep immediately (the background cycle does this
    /// on its own interval)
    pub fn evict_idle_now(&self, now: Instant) -> usize {
        self.shared.evict_idle(now, self.config.idle_timeout())
    }

    /// Current occupancy counters
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock().unwrap();
        PoolStats {
            in_use: state.in_use_total,
            idle: state.idle_total,
        }
    }

    /// Connections currently borrowed for a single host
    pub fn in_use_for(&self, host: &str) -> usize {
        self.shared.state.lock().unwrap().in_use_for(host)
    }

    /// Stops the evictor, closes the pool, and drains the idle set
    ///
    /// The evictor is joined before the idle connections are dropped so a
    /// sweep can never race the teardown.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.evictor.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("evictor task did not shut down cleanly: {}", e);
            }
        }

        let mut state = self.shared.state.lock().unwrap();
        state.closed = true;
        let drained = state.idle_total;
        state.idle.clear();
        state.idle_total = 0;
        drop(state);
        self.shared.notify.notify_waiters();

        tracing::debug!(drained, "connection pool shut down");
    }
}

/// Exclusive borrow of one pooled connection
///
/// Dropping the guard returns the connection to the idle set; call
/// [`PooledConn::discard`] instead when the connection may be broken.
pub struct PooledConn {
    conn: Option<PooledConnection>,
    shared: Arc<Shared>,
}

impl PooledConn {
    fn new(conn: PooledConnection, shared: Arc<Shared>) -> Self {
        Self {
            conn: Some(conn),
            shared,
        }
    }

    /// Issues a GET over the borrowed connection and records the remote's
    /// advertised keep-alive on it
    pub async fn get(
        &mut self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<RawResponse, TransportError> {
        // `conn` is Some until discard() or drop, neither of which can
        // happen while the guard is borrowed here.
        let conn = self.conn.as_mut().expect("guard holds its connection");
        let response = conn.transport.get(url, headers).await?;
        if let Some(keep_alive) = response.keep_alive {
            conn.keep_alive = keep_alive;
        }
        Ok(response)
    }

    /// Frees the borrow slot without re-pooling the connection
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.forget(conn);
        }
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.release(conn);
        }
    }
}
