use crate::config::types::{
    CommonCrawlConfig, Config, RequestConfig, RunConfig, SourcesConfig, WaybackConfig,
};
use crate::ConfigError;
use chrono::NaiveDateTime;
use url::Url;

/// Short names of the supported archive sources
pub const KNOWN_SOURCES: &[&str] = &["wb", "cc"];

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_request_config(&config.request)?;
    validate_run_config(&config.run)?;
    validate_sources_config(&config.sources)?;
    validate_commoncrawl_config(&config.commoncrawl)?;
    validate_wayback_config(&config.wayback)?;
    Ok(())
}

/// Validates request configuration
fn validate_request_config(config: &RequestConfig) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    // zero attempts would never send a request
    if config.retries < 1 {
        return Err(ConfigError::Validation(format!(
            "retries must be >= 1, got {}",
            config.retries
        )));
    }

    Ok(())
}

/// Validates worker pool configuration
fn validate_run_config(config: &RunConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.drain_interval_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "drain-interval-secs must be >= 1, got {}",
            config.drain_interval_secs
        )));
    }

    if config.channel_capacity < 1 {
        return Err(ConfigError::Validation(format!(
            "channel-capacity must be >= 1, got {}",
            config.channel_capacity
        )));
    }

    Ok(())
}

/// Validates the enabled source list
fn validate_sources_config(config: &SourcesConfig) -> Result<(), ConfigError> {
    if config.enabled.is_empty() {
        return Err(ConfigError::Validation(
            "No archive sources provided".to_string(),
        ));
    }

    for name in &config.enabled {
        if !KNOWN_SOURCES.contains(&name.as_str()) {
            return Err(ConfigError::UnknownSource(name.clone()));
        }
    }

    Ok(())
}

fn validate_commoncrawl_config(config: &CommonCrawlConfig) -> Result<(), ConfigError> {
    validate_endpoint("commoncrawl.index-server", &config.index_server)?;
    validate_endpoint("commoncrawl.storage", &config.storage)?;

    if let Some(index) = &config.index {
        if index.trim().is_empty() {
            return Err(ConfigError::Validation(
                "commoncrawl.index cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_wayback_config(config: &WaybackConfig) -> Result<(), ConfigError> {
    validate_endpoint("wayback.index-server", &config.index_server)?;
    validate_endpoint("wayback.storage", &config.storage)?;
    Ok(())
}

/// Validates an endpoint URL (http or https only)
fn validate_endpoint(key: &str, value: &str) -> Result<(), ConfigError> {
    let url =
        Url::parse(value).map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", key, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            key, value
        )));
    }

    Ok(())
}

/// Validates a CDX date bound
///
/// Bounds are timestamp prefixes of 4 to 14 digits (`2019`, `201905`,
/// `20190522121421`); missing trailing fields are read as their minimum.
pub fn validate_date_bound(value: &str) -> Result<(), ConfigError> {
    if value.len() < 4 || value.len() > 14 || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::Validation(format!(
            "Date bound '{}' must be 4 to 14 digits (yyyyMMddhhmmss prefix)",
            value
        )));
    }

    // pad month and day with 01, time fields with 0
    const FILL: &str = "00000101000000";
    let padded = format!("{}{}", value, &FILL[value.len()..]);
    NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M%S")
        .map(|_| ())
        .map_err(|_| ConfigError::Validation(format!("Date bound '{}' is not a valid date", value)))
}
