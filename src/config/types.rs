use crate::source::SourceSettings;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for cdx-harvest
///
/// Every section and key is optional; missing values take the defaults
/// used against the public Common Crawl and Wayback servers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub request: RequestConfig,
    pub run: RunConfig,
    pub sources: SourcesConfig,
    pub commoncrawl: CommonCrawlConfig,
    pub wayback: WaybackConfig,
}

/// Per-request behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Request timeout in seconds, also the backoff after a 500/503
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Attempts per request
    pub retries: u32,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 3,
        }
    }
}

impl RequestConfig {
    /// Settings handed to every archive source
    pub fn settings(&self) -> SourceSettings {
        SourceSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            retries: self.retries,
        }
    }
}

/// Worker pool and channel sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of concurrent workers, each handles one pattern at a time
    pub workers: usize,

    /// How often the drain loop wakes up when no results arrive (seconds)
    #[serde(rename = "drain-interval-secs")]
    pub drain_interval_secs: u64,

    /// Capacity of the bounded record and error channels
    #[serde(rename = "channel-capacity")]
    pub channel_capacity: usize,

    /// Pause between saved files in file mode (seconds)
    #[serde(rename = "download-rate-secs")]
    pub download_rate_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            drain_interval_secs: 3,
            channel_capacity: 16,
            download_rate_secs: 5,
        }
    }
}

/// Which archive sources to query
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Short source names: `wb` (Wayback), `cc` (Common Crawl)
    pub enabled: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: vec!["wb".to_string(), "cc".to_string()],
        }
    }
}

/// Common Crawl endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommonCrawlConfig {
    /// Index server root, serves `collinfo.json` and `<index>-index`
    #[serde(rename = "index-server")]
    pub index_server: String,

    /// WARC storage root
    pub storage: String,

    /// Crawl index to query instead of the newest one
    pub index: Option<String>,
}

impl Default for CommonCrawlConfig {
    fn default() -> Self {
        Self {
            index_server: "https://index.commoncrawl.org/".to_string(),
            storage: "https://data.commoncrawl.org/".to_string(),
            index: None,
        }
    }
}

/// Wayback Machine endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WaybackConfig {
    /// CDX search endpoint
    #[serde(rename = "index-server")]
    pub index_server: String,

    /// Replay root
    pub storage: String,
}

impl Default for WaybackConfig {
    fn default() -> Self {
        Self {
            index_server: "https://web.archive.org/cdx/search/cdx".to_string(),
            storage: "https://web.archive.org/web".to_string(),
        }
    }
}
