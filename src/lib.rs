//! Stacksift: a concurrent catalog crawler
//!
//! This crate crawls a catalog website, collects book listings that pass
//! configurable score/rating thresholds per category tag, deduplicates the
//! results concurrently, and exports one CSV file per criteria entry.

pub mod aggregate;
pub mod config;
pub mod crawler;
pub mod output;
pub mod pool;

use thiserror::Error;

/// Main error type for stacksift operations
#[derive(Debug, Error)]
pub enum SiftError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] pool::PoolError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] crawler::SubmitError),

    #[error("Export error: {0}")]
    Export(#[from] output::ExportError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for stacksift operations
pub type Result<T> = std::result::Result<T, SiftError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use aggregate::{Record, ResultAggregator};
pub use config::{Config, Criteria};
pub use crawler::{Coordinator, PageFetcher, TaskScheduler};
pub use pool::ConnectionPool;
