//! Wayback Machine source
//!
//! The Wayback Machine keeps one continuously growing CDX index. Its JSON
//! output is an array of rows whose first row names the columns; files are
//! served as-is through the `id_` replay mode.

use crate::config::WaybackConfig;
use crate::query::QueryDescriptor;
use crate::record::CdxRecord;
use crate::source::{ArchiveSource, SourceRef, SourceSettings};
use crate::transport::Transport;
use crate::{HarvestError, Result};
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use url::Url;

const NAME: &str = "wayback";

/// Columns of a JSON row, in order: urlkey, timestamp, original, mimetype,
/// statuscode, digest, length
const COLUMNS: usize = 7;

/// Wayback Machine archive source
///
/// Always lives behind an `Arc`; parsed records carry that same handle.
#[derive(Debug)]
pub struct Wayback {
    this: Weak<Wayback>,
    transport: Transport,
    settings: SourceSettings,
    index_server: Url,
    storage: String,
}

impl Wayback {
    /// Builds the source; no request is made until a query runs
    pub fn new(
        transport: Transport,
        settings: SourceSettings,
        config: &WaybackConfig,
    ) -> Result<Arc<Self>> {
        let index_server = Url::parse(&config.index_server)?;
        Url::parse(&config.storage)?;

        Ok(Arc::new_cyclic(|this| Self {
            this: this.clone(),
            transport,
            settings,
            index_server,
            storage: config.storage.trim_end_matches('/').to_string(),
        }))
    }

    /// Replay URL serving the unmodified capture
    pub fn replay_url(&self, timestamp: &str, original: &str) -> String {
        format!("{}/{}id_/{}", self.storage, timestamp, original)
    }

    fn owner(&self) -> Option<SourceRef> {
        self.this.upgrade().map(|source| source as SourceRef)
    }
}

#[async_trait]
impl ArchiveSource for Wayback {
    fn name(&self) -> &str {
        NAME
    }

    /// Parses a JSON array of rows, skipping the header row
    ///
    /// Rows too short to map onto the fixed column order are skipped.
    fn parse_response(&self, body: &[u8]) -> Result<Vec<CdxRecord>> {
        let rows: Vec<Vec<String>> =
            serde_json::from_slice(body).map_err(|e| HarvestError::Json {
                context: "wayback results".to_string(),
                source: e,
            })?;

        let owner = self.owner();
        let mut records = Vec::with_capacity(rows.len().saturating_sub(1));

        for row in rows.into_iter().skip(1) {
            if row.len() < COLUMNS {
                tracing::warn!("[{}] skipping row with {} columns: {:?}", NAME, row.len(), row);
                continue;
            }

            let mut columns = row.into_iter();
            let mut next = || columns.next().unwrap_or_default();
            records.push(CdxRecord {
                urlkey: next(),
                timestamp: next(),
                original: next(),
                mime_type: next(),
                status_code: next(),
                digest: next(),
                length: next(),
                source: owner.clone(),
                ..CdxRecord::default()
            });
        }

        Ok(records)
    }

    /// The page count endpoint answers with a bare integer and a newline
    async fn num_pages(&self, pattern: &str) -> Result<u32> {
        let url = QueryDescriptor::num_pages_url(&self.index_server, pattern);
        let body = self
            .transport
            .get(url.as_str(), self.settings.timeout, self.settings.retries)
            .await?;

        let text = String::from_utf8_lossy(&body);
        let value = text.strip_suffix('\n').unwrap_or(&text);
        value
            .trim_end_matches('\r')
            .parse()
            .map_err(|_| HarvestError::InvalidPageCount {
                body: text.to_string(),
            })
    }

    async fn fetch_page(&self, query: &QueryDescriptor, page: u32) -> Result<Vec<CdxRecord>> {
        let url = query.request_url(&self.index_server, page);
        let body = self
            .transport
            .get(url.as_str(), self.settings.timeout, self.settings.retries)
            .await?;

        let records = self.parse_response(&body)?;
        tracing::debug!("[{}] page {}: {} records", NAME, page, records.len());
        Ok(records)
    }

    async fn get_file(&self, record: &CdxRecord) -> Result<Vec<u8>> {
        let url = self.replay_url(&record.timestamp, &record.original);
        self.transport
            .get(&url, self.settings.timeout, self.settings.retries)
            .await
    }
}
