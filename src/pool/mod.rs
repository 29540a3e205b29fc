//! Bounded connection pool with keep-alive tracking and idle eviction

pub mod connection;
pub mod manager;

pub use connection::{parse_keep_alive, Connector, HttpConnector, RawResponse, Transport, TransportError};
pub use manager::{ConnectionPool, PoolError, PoolStats, PooledConn};
