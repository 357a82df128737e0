//! Common Crawl index source
//!
//! Common Crawl publishes one immutable CDX index per crawl
//! (`CC-MAIN-2023-14`, ...). The list of indexes is read from
//! `collinfo.json` once, when the source is built; queries target the newest
//! index unless another one is picked explicitly.
//!
//! Index responses are newline-delimited JSON objects. Files are retrieved
//! with a byte-range read of the WARC container holding the capture.

use crate::config::CommonCrawlConfig;
use crate::query::QueryDescriptor;
use crate::record::CdxRecord;
use crate::source::{directory_url, extract_payload, ArchiveSource, SourceRef, SourceSettings};
use crate::transport::Transport;
use crate::{HarvestError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Weak};
use url::Url;

const NAME: &str = "commoncrawl";

/// One entry of `collinfo.json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CrawlIndex {
    pub id: String,
    pub name: String,
    pub timegate: String,
    #[serde(rename = "cdx-api")]
    pub cdx_api: String,
}

/// Page count discovery response (`showNumPages=true`)
///
/// The server also reports `pageSize` and `blocks`; only the count is used.
#[derive(Debug, Deserialize)]
struct NumPagesResponse {
    pages: u32,
}

/// Common Crawl archive source
///
/// Always lives behind an `Arc`; parsed records carry that same handle.
/// Instances targeting other indexes share the cached index list.
#[derive(Debug)]
pub struct CommonCrawl {
    this: Weak<CommonCrawl>,
    transport: Transport,
    settings: SourceSettings,
    index_server: Url,
    storage: Url,
    indexes: Arc<[CrawlIndex]>,
    index: String,
}

impl CommonCrawl {
    /// Builds the source and caches the crawl index list
    ///
    /// # Arguments
    ///
    /// * `transport` - Shared HTTP transport
    /// * `settings` - Timeout and retry settings for every request
    /// * `config` - Index server and storage endpoints, optional index override
    ///
    /// # Returns
    ///
    /// * `Ok(Arc<CommonCrawl>)` - Shared source targeting `config.index` or the newest index
    /// * `Err(HarvestError)` - The index list could not be fetched, was empty,
    ///   or does not contain the requested index
    pub async fn new(
        transport: Transport,
        settings: SourceSettings,
        config: &CommonCrawlConfig,
    ) -> Result<Arc<Self>> {
        let index_server = directory_url(&config.index_server)?;
        let storage = directory_url(&config.storage)?;

        let indexes = fetch_index_list(&transport, settings, &index_server).await?;
        let source = Self::with_cached_indexes(transport, settings, index_server, storage, indexes)?;

        let source = match config.index.as_deref() {
            Some(id) => source.with_index(id)?,
            None => source,
        };

        tracing::info!(
            "CommonCrawl ready: {} indexes available, using {}",
            source.indexes.len(),
            source.index
        );
        Ok(source)
    }

    fn with_cached_indexes(
        transport: Transport,
        settings: SourceSettings,
        index_server: Url,
        storage: Url,
        indexes: Vec<CrawlIndex>,
    ) -> Result<Arc<Self>> {
        let index = indexes
            .first()
            .map(|i| i.id.clone())
            .ok_or(HarvestError::NoIndexes)?;

        Ok(Self::assemble(
            transport,
            settings,
            index_server,
            storage,
            indexes.into(),
            index,
        ))
    }

    fn assemble(
        transport: Transport,
        settings: SourceSettings,
        index_server: Url,
        storage: Url,
        indexes: Arc<[CrawlIndex]>,
        index: String,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            transport,
            settings,
            index_server,
            storage,
            indexes,
            index,
        })
    }

    /// Returns a new source targeting another cached index
    pub fn with_index(&self, id: &str) -> Result<Arc<Self>> {
        if !self.indexes.iter().any(|i| i.id == id) {
            return Err(HarvestError::UnknownIndex(id.to_string()));
        }
        Ok(Self::assemble(
            self.transport.clone(),
            self.settings,
            self.index_server.clone(),
            self.storage.clone(),
            Arc::clone(&self.indexes),
            id.to_string(),
        ))
    }

    /// Crawl indexes listed when the source was built, newest first
    pub fn indexes(&self) -> &[CrawlIndex] {
        &self.indexes
    }

    /// The index queries are sent to
    pub fn index(&self) -> &str {
        &self.index
    }

    fn index_endpoint(&self, index: &str) -> Result<Url> {
        Ok(self.index_server.join(&format!("{}-index", index))?)
    }

    /// Page count for a pattern in a specific index
    pub async fn num_pages_in(&self, pattern: &str, index: &str) -> Result<u32> {
        let url = QueryDescriptor::num_pages_url(&self.index_endpoint(index)?, pattern);
        let body = self
            .transport
            .get(url.as_str(), self.settings.timeout, self.settings.retries)
            .await?;

        let response: NumPagesResponse =
            serde_json::from_slice(&body).map_err(|e| HarvestError::Json {
                context: format!("page count for {}", pattern),
                source: e,
            })?;
        Ok(response.pages)
    }

    fn owner(&self) -> Option<SourceRef> {
        self.this.upgrade().map(|source| source as SourceRef)
    }
}

async fn fetch_index_list(
    transport: &Transport,
    settings: SourceSettings,
    index_server: &Url,
) -> Result<Vec<CrawlIndex>> {
    let url = index_server.join("collinfo.json")?;
    let body = transport
        .get(url.as_str(), settings.timeout, settings.retries)
        .await?;

    serde_json::from_slice(&body).map_err(|e| HarvestError::Json {
        context: "crawl index list".to_string(),
        source: e,
    })
}

#[async_trait]
impl ArchiveSource for CommonCrawl {
    fn name(&self) -> &str {
        NAME
    }

    /// Parses newline-delimited JSON index lines
    ///
    /// One undecodable line fails the whole response. A `{"error": ...}`
    /// line reporting no captures yields no records.
    fn parse_response(&self, body: &[u8]) -> Result<Vec<CdxRecord>> {
        if body.is_empty() {
            return Err(HarvestError::EmptyResponse);
        }

        let owner = self.owner();
        let mut records = Vec::new();

        for line in body.split(|b| *b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let value: serde_json::Value =
                serde_json::from_slice(line).map_err(|e| HarvestError::Json {
                    context: format!("index line {:?}", String::from_utf8_lossy(line)),
                    source: e,
                })?;

            if let Some(message) = value.get("error").and_then(|m| m.as_str()) {
                if message.starts_with("No Captures found") {
                    tracing::debug!("[{}] {}", NAME, message);
                    continue;
                }
                return Err(HarvestError::IndexServer(message.to_string()));
            }

            let mut record: CdxRecord =
                serde_json::from_value(value).map_err(|e| HarvestError::Json {
                    context: format!("index line {:?}", String::from_utf8_lossy(line)),
                    source: e,
                })?;
            record.source = owner.clone();
            records.push(record);
        }

        Ok(records)
    }

    async fn num_pages(&self, pattern: &str) -> Result<u32> {
        self.num_pages_in(pattern, &self.index).await
    }

    async fn fetch_page(&self, query: &QueryDescriptor, page: u32) -> Result<Vec<CdxRecord>> {
        let url = query.request_url(&self.index_endpoint(&self.index)?, page);
        let body = self
            .transport
            .get(url.as_str(), self.settings.timeout, self.settings.retries)
            .await?;

        let records = self.parse_response(&body)?;
        tracing::debug!("[{}] page {}: {} records", NAME, page, records.len());
        Ok(records)
    }

    /// Reads the record's WARC container with a range request and returns
    /// the payload of its first content record
    async fn get_file(&self, record: &CdxRecord) -> Result<Vec<u8>> {
        let (offset, length) = record.offset_range()?;
        let url = self.storage.join(&record.filename)?;
        let end = offset
            .checked_add(length)
            .and_then(|end| end.checked_add(1))
            .ok_or_else(|| HarvestError::InvalidRecord {
                field: "length",
                value: record.length.clone(),
            })?;
        let range = format!("bytes={}-{}", offset, end);

        let body = self
            .transport
            .get_with_headers(
                url.as_str(),
                self.settings.timeout,
                self.settings.retries,
                &[("Range", range)],
            )
            .await?;

        Ok(extract_payload(&body)?)
    }
}
