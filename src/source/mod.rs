//! Archive sources
//!
//! Every web archive backend implements [`ArchiveSource`]. The trait covers
//! page count discovery, page retrieval, response parsing and file retrieval;
//! the page traversal itself (single page mode, limit early stop, streaming
//! onto channels) is shared through the provided `get_pages`/`fetch_pages`.
//!
//! Two backends exist:
//! - [`CommonCrawl`]: versioned crawl indexes, files stored in WARC containers
//! - [`Wayback`]: one continuous index, files served through replay

mod commoncrawl;
mod warc;
mod wayback;

pub use commoncrawl::{CommonCrawl, CrawlIndex};
pub use warc::{decompress, extract_payload, WarcError, WarcReader, WarcRecord};
pub use wayback::Wayback;

use crate::config::Config;
use crate::query::QueryDescriptor;
use crate::record::CdxRecord;
use crate::transport::Transport;
use crate::{ConfigError, HarvestError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// Shared handle to an archive source
///
/// Records carry one of these so a file can be retrieved from the source
/// that produced the record.
pub type SourceRef = Arc<dyn ArchiveSource>;

/// Request settings fixed for the lifetime of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSettings {
    /// Per-request timeout, also the backoff after an overload status
    pub timeout: Duration,

    /// Attempts per request
    pub retries: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 3,
        }
    }
}

/// Capabilities shared by all web archive backends
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Stable identifier, used in error messages and output file names
    fn name(&self) -> &str;

    /// Normalizes one raw index response into records owned by this source
    fn parse_response(&self, body: &[u8]) -> Result<Vec<CdxRecord>>;

    /// Asks the index server how many result pages exist for a pattern
    ///
    /// Page sizes differ between backends; callers only rely on the count.
    async fn num_pages(&self, pattern: &str) -> Result<u32>;

    /// Fetches and parses one result page
    async fn fetch_page(&self, query: &QueryDescriptor, page: u32) -> Result<Vec<CdxRecord>>;

    /// Retrieves the archived payload a record points to
    async fn get_file(&self, record: &CdxRecord) -> Result<Vec<u8>>;

    /// Number of pages a traversal of `query` will visit
    async fn page_count(&self, query: &QueryDescriptor) -> Result<u32> {
        if query.single_page {
            Ok(1)
        } else {
            self.num_pages(&query.pattern).await
        }
    }

    /// Fetches every page of a query and returns all records
    ///
    /// Pages are visited in increasing order. With a non-zero limit the
    /// traversal stops after the first page that brings the total to the
    /// limit; that page is kept whole, so the result may exceed the limit.
    async fn get_pages(&self, query: &QueryDescriptor) -> Result<Vec<CdxRecord>> {
        let pages = self.page_count(query).await?;
        let mut results = Vec::new();

        for page in 0..pages {
            let records = self.fetch_page(query, page).await?;
            results.extend(records);

            if query.limit_reached(results.len()) {
                tracing::debug!(
                    "[{}] limit {} reached after page {}",
                    self.name(),
                    query.limit,
                    page
                );
                break;
            }
        }

        Ok(results)
    }

    /// Streams a query's pages onto a channel, one send per page
    ///
    /// Follows the same traversal as [`ArchiveSource::get_pages`]. Failures
    /// are tagged with the source name and sent on `errors`. A failed page
    /// is skipped and the traversal moves on; only a failed page count ends
    /// it early.
    async fn fetch_pages(
        &self,
        query: &QueryDescriptor,
        records: mpsc::Sender<Vec<CdxRecord>>,
        errors: mpsc::Sender<HarvestError>,
    ) {
        let pages = match self.page_count(query).await {
            Ok(pages) => pages,
            Err(e) => {
                let _ = errors.send(e.in_source(self.name())).await;
                return;
            }
        };

        tracing::debug!("[{}] {} page(s) for {}", self.name(), pages, query.pattern);
        let mut fetched = 0;

        for page in 0..pages {
            match self.fetch_page(query, page).await {
                Ok(batch) => {
                    fetched += batch.len();
                    if records.send(batch).await.is_err() {
                        // receiver is gone, nobody wants the rest
                        return;
                    }
                    if query.limit_reached(fetched) {
                        break;
                    }
                }
                Err(e) => {
                    let _ = errors.send(e.in_source(self.name())).await;
                }
            }
        }
    }
}

/// Parses a base URL so that relative joins append to its path
pub(crate) fn directory_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Builds every source enabled in the configuration
///
/// Construction failures are fatal: a Common Crawl source that cannot list
/// its indexes would fail every query.
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `transport` - Transport shared by all sources
///
/// # Returns
///
/// * `Ok(Vec<SourceRef>)` - One handle per enabled source, in configuration order
/// * `Err(HarvestError)` - A source could not be constructed
pub async fn build_sources(config: &Config, transport: &Transport) -> Result<Vec<SourceRef>> {
    let settings = config.request.settings();
    let mut sources: Vec<SourceRef> = Vec::new();

    for name in &config.sources.enabled {
        match name.as_str() {
            "cc" => {
                tracing::info!("Initializing CommonCrawl");
                let source = CommonCrawl::new(transport.clone(), settings, &config.commoncrawl)
                    .await?;
                sources.push(source);
            }
            "wb" => {
                tracing::info!("Initializing Wayback");
                let source = Wayback::new(transport.clone(), settings, &config.wayback)?;
                sources.push(source);
            }
            other => {
                return Err(HarvestError::Config(ConfigError::UnknownSource(
                    other.to_string(),
                )))
            }
        }
    }

    Ok(sources)
}
