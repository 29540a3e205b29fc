use crate::config::types::{CatalogConfig, Config, Criteria, PoolConfig, SchedulerConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_catalog_config(&config.catalog)?;
    validate_pool_config(&config.pool)?;
    validate_scheduler_config(&config.scheduler)?;
    validate_output_config(&config.output)?;
    validate_criteria(&config.criteria)?;
    Ok(())
}

/// Validates catalog configuration
fn validate_catalog_config(config: &CatalogConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if !config.taxonomy_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "taxonomy-path must start with '/', got '{}'",
            config.taxonomy_path
        )));
    }

    if config.page_size < 1 {
        return Err(ConfigError::Validation(format!(
            "page-size must be >= 1, got {}",
            config.page_size
        )));
    }

    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates connection pool configuration
fn validate_pool_config(config: &PoolConfig) -> Result<(), ConfigError> {
    if config.max_connections < 1 {
        return Err(ConfigError::Validation(format!(
            "max-connections must be >= 1, got {}",
            config.max_connections
        )));
    }

    if config.max_per_host < 1 || config.max_per_host > config.max_connections {
        return Err(ConfigError::Validation(format!(
            "max-per-host must be between 1 and max-connections ({}), got {}",
            config.max_connections, config.max_per_host
        )));
    }

    if config.acquire_timeout_ms < 1 {
        return Err(ConfigError::Validation(
            "acquire-timeout-ms must be >= 1".to_string(),
        ));
    }

    if config.evict_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "evict-interval-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates worker pool configuration
fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 {
        return Err(ConfigError::Validation(format!(
            "workers must be >= 1, got {}",
            config.workers
        )));
    }

    if config.queue_capacity < 1 {
        return Err(ConfigError::Validation(format!(
            "queue-capacity must be >= 1, got {}",
            config.queue_capacity
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &crate::config::types::OutputConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates criteria entries
///
/// Tags are interpolated into CSS attribute selectors when locating the
/// category anchor group, so characters that would terminate the selector
/// are rejected here.
fn validate_criteria(criteria: &[Criteria]) -> Result<(), ConfigError> {
    if criteria.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[criteria]] entry is required".to_string(),
        ));
    }

    for entry in criteria {
        if entry.tag.is_empty() {
            return Err(ConfigError::Validation(
                "criteria tag cannot be empty".to_string(),
            ));
        }

        if entry.tag.chars().any(|c| "\"'[]\\".contains(c)) {
            return Err(ConfigError::Validation(format!(
                "criteria tag '{}' contains selector metacharacters",
                entry.tag
            )));
        }

        if !entry.min_score.is_finite() || entry.min_score < 0.0 {
            return Err(ConfigError::Validation(format!(
                "min-score for tag '{}' must be a non-negative number",
                entry.tag
            )));
        }
    }

    Ok(())
}
