//! Canonical archived-resource record
//!
//! Both index servers are normalized into [`CdxRecord`]. Field names on the
//! wire follow the Common Crawl line-delimited JSON format; Wayback rows are
//! mapped positionally by the Wayback source.

use crate::source::SourceRef;
use crate::{HarvestError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One observation of an archived resource
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct CdxRecord {
    /// SURT-ordered sort key assigned by the index server
    #[serde(default)]
    pub urlkey: String,

    /// 14-digit capture time (`yyyyMMddhhmmss`)
    #[serde(default)]
    pub timestamp: String,

    /// Original captured URL
    #[serde(default, rename = "url")]
    pub original: String,

    /// Declared MIME type
    #[serde(default, rename = "mime")]
    pub mime_type: String,

    /// MIME type detected by the crawler
    #[serde(default, rename = "mimedetected", alias = "mime-detected")]
    pub mime_detected: String,

    #[serde(default)]
    pub charset: String,

    #[serde(default)]
    pub languages: String,

    /// HTTP status code of the capture
    #[serde(default, rename = "status")]
    pub status_code: String,

    /// Content digest
    #[serde(default)]
    pub digest: String,

    /// Length of the stored container record
    #[serde(default)]
    pub length: String,

    /// Byte offset of the container record in its storage file
    #[serde(default)]
    pub offset: String,

    /// Storage file locator
    #[serde(default)]
    pub filename: String,

    /// Archive source that produced this record, used for file retrieval
    #[serde(skip)]
    pub source: Option<SourceRef>,
}

impl CdxRecord {
    /// Name of the owning source, if the record has one
    pub fn source_name(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.name())
    }

    /// Parses the capture timestamp
    pub fn captured_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.timestamp, "%Y%m%d%H%M%S").ok()
    }

    /// Parses the storage offset and length of the container record
    pub fn offset_range(&self) -> Result<(u64, u64)> {
        let offset = parse_number("offset", &self.offset)?;
        let length = parse_number("length", &self.length)?;
        Ok((offset, length))
    }

    /// Retrieves the archived payload through the owning source
    pub async fn fetch_file(&self) -> Result<Vec<u8>> {
        let source = self.source.as_ref().ok_or_else(|| HarvestError::MissingSource {
            url: self.original.clone(),
        })?;
        source.get_file(self).await
    }
}

fn parse_number(field: &'static str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| HarvestError::InvalidRecord {
            field,
            value: value.to_string(),
        })
}

impl fmt::Debug for CdxRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdxRecord")
            .field("urlkey", &self.urlkey)
            .field("timestamp", &self.timestamp)
            .field("original", &self.original)
            .field("mime_type", &self.mime_type)
            .field("status_code", &self.status_code)
            .field("digest", &self.digest)
            .field("length", &self.length)
            .field("offset", &self.offset)
            .field("filename", &self.filename)
            .field("source", &self.source_name())
            .finish()
    }
}
