use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for stacksift
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub criteria: Vec<Criteria>,
}

/// Catalog site configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Base URL of the catalog site (e.g., "https://books.example.com")
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path of the taxonomy page listing all category tags
    #[serde(rename = "taxonomy-path")]
    pub taxonomy_path: String,

    /// Number of entries per result page, used to derive paged URLs
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Optional session cookie sent with every request
    #[serde(rename = "session-cookie")]
    pub session_cookie: Option<String>,
}

/// Connection pool configuration
///
/// Defaults follow the pool's intended production sizing: 500 connections
/// globally, 200 per destination, with a 5 second acquisition timeout and a
/// 30 second idle threshold swept every 5 seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of connections across all destinations
    #[serde(rename = "max-connections", default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum number of connections to a single destination host
    #[serde(rename = "max-per-host", default = "default_max_per_host")]
    pub max_per_host: usize,

    /// How long an acquire call waits for a free connection (milliseconds)
    #[serde(rename = "acquire-timeout-ms", default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// TCP connect timeout (milliseconds)
    #[serde(rename = "connect-timeout-ms", default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Read timeout for a whole response (milliseconds)
    #[serde(rename = "read-timeout-ms", default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Keep-alive duration assumed when the remote does not advertise one (seconds)
    #[serde(rename = "default-keep-alive-secs", default = "default_keep_alive_secs")]
    pub default_keep_alive_secs: u64,

    /// Idle duration after which a pooled connection is reclaimed (seconds)
    #[serde(rename = "idle-timeout-secs", default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Interval between background eviction sweeps (seconds)
    #[serde(rename = "evict-interval-secs", default = "default_evict_interval_secs")]
    pub evict_interval_secs: u64,
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn default_keep_alive(&self) -> Duration {
        Duration::from_secs(self.default_keep_alive_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn evict_interval(&self) -> Duration {
        Duration::from_secs(self.evict_interval_secs)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_per_host: default_max_per_host(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            default_keep_alive_secs: default_keep_alive_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            evict_interval_secs: default_evict_interval_secs(),
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker tasks processing fetch/parse jobs
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the pending-task queue; submissions beyond it are rejected
    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory where per-criteria CSV files are written
    pub directory: String,
}

/// One filter configuration: drives one crawl run and one output file
#[derive(Debug, Clone, Deserialize)]
pub struct Criteria {
    /// Category tag to crawl
    pub tag: String,

    /// Minimum score a record must reach (inclusive)
    #[serde(rename = "min-score")]
    pub min_score: f32,

    /// Minimum rating count a record must reach (inclusive)
    #[serde(rename = "min-count")]
    pub min_count: u32,
}

fn default_page_size() -> u32 {
    20
}

fn default_user_agent() -> String {
    "Chrome/83.0".to_string()
}

fn default_max_connections() -> usize {
    500
}

fn default_max_per_host() -> usize {
    200
}

fn default_acquire_timeout_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_read_timeout_ms() -> u64 {
    10_000
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_evict_interval_secs() -> u64 {
    5
}

fn default_workers() -> usize {
    3
}

fn default_queue_capacity() -> usize {
    1000
}
