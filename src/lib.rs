//! cdx-harvest: collects archived URL observations and files from web archives
//!
//! This crate queries CDX index servers (Common Crawl and the Wayback Machine),
//! pages through their results concurrently, normalizes them into one record
//! type, and retrieves the archived payload a record points to on demand.

pub mod config;
pub mod orchestrator;
pub mod output;
pub mod query;
pub mod record;
pub mod source;
pub mod transport;

use thiserror::Error;

/// Main error type for cdx-harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Server returned 500 status response for {url} (slow down)")]
    Overloaded { url: String },

    #[error("Server returned 503 status response for {url}")]
    Unavailable { url: String },

    #[error("Got {status} status response with empty body from {url}")]
    Status { url: String, status: u16 },

    #[error("Response body is empty for {url}")]
    EmptyBody { url: String },

    #[error("Performed {attempts} attempts, no result for {url}: {source}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        source: Box<HarvestError>,
    },

    #[error("Cannot decode JSON ({context}): {source}")]
    Json {
        context: String,
        source: serde_json::Error,
    },

    #[error("Cannot convert page count response value: {body:?}")]
    InvalidPageCount { body: String },

    #[error("Index server error: {0}")]
    IndexServer(String),

    #[error("Index response is empty")]
    EmptyResponse,

    #[error("Invalid {field} value in record: {value:?}")]
    InvalidRecord { field: &'static str, value: String },

    #[error("Cannot decode WARC: {0}")]
    Warc(#[from] source::WarcError),

    #[error("Index server returned no crawl indexes")]
    NoIndexes,

    #[error("Unknown crawl index: {0}")]
    UnknownIndex(String),

    #[error("Record for {url} has no owning source")]
    MissingSource { url: String },

    #[error("[{source_name}] {source}")]
    Source {
        source_name: String,
        source: Box<HarvestError>,
    },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true for server overload statuses that warrant a backoff and retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HarvestError::Overloaded { .. } | HarvestError::Unavailable { .. }
        )
    }

    /// Wraps this error with the name of the archive source it came from
    pub fn in_source(self, source_name: &str) -> Self {
        HarvestError::Source {
            source_name: source_name.to_string(),
            source: Box::new(self),
        }
    }
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

    #[error("Unknown archive source: {0}")]
    UnknownSource(String),
}

/// Result type alias for cdx-harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use orchestrator::{Orchestrator, Run, RunEvent, RunSummary};
pub use query::QueryDescriptor;
pub use record::CdxRecord;
pub use source::{ArchiveSource, CommonCrawl, SourceRef, Wayback};
pub use transport::Transport;
