//! Saving archived payloads to disk

use crate::record::CdxRecord;
use crate::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Extension for common MIME types; used for both saved files and `--ext`
const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("text/html", ".html"),
    ("text/plain", ".txt"),
    ("text/xml", ".xml"),
    ("application/xml", ".xml"),
    ("text/css", ".css"),
    ("text/csv", ".csv"),
    ("application/json", ".json"),
    ("application/javascript", ".js"),
    ("application/pdf", ".pdf"),
    ("application/zip", ".zip"),
    ("application/gzip", ".gz"),
    ("application/msword", ".doc"),
    ("image/jpeg", ".jpeg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("image/svg+xml", ".svg"),
];

/// Returns the file extension for a MIME type, including the leading dot
///
/// Parameters such as `; charset=utf-8` are ignored.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    MIME_EXTENSIONS
        .iter()
        .find(|(m, _)| *m == essence)
        .map(|(_, ext)| *ext)
}

/// Returns the MIME type for a file extension, with or without the dot
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    // first entry wins, so `xml` maps to text/xml
    MIME_EXTENSIONS
        .iter()
        .find(|(_, e)| e[1..] == ext || (ext == "jpg" && *e == ".jpeg"))
        .map(|(m, _)| *m)
}

/// Builds the on-disk name for a record's payload
///
/// The name is `<original>-<timestamp>-<source><ext>`, percent-escaped as a
/// whole so it is a single path component.
pub fn file_name(record: &CdxRecord) -> String {
    let ext = extension_for_mime(&record.mime_type).unwrap_or("");
    let raw = format!(
        "{}-{}-{}{}",
        record.original,
        record.timestamp,
        record.source_name().unwrap_or("unknown"),
        ext
    );
    urlencoding::encode(&raw).into_owned()
}

/// Writes archived payloads into an output directory
pub struct FileSaver {
    dir: PathBuf,
    rate: Duration,
}

impl FileSaver {
    /// Creates a saver, creating the output directory if needed
    pub async fn new(dir: impl Into<PathBuf>, rate: Duration) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir, rate })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Retrieves a record's payload through its source and writes it
    ///
    /// Returns the path and number of bytes written.
    pub async fn save(&self, record: &CdxRecord) -> Result<(PathBuf, usize)> {
        let body = record.fetch_file().await?;
        let path = self.dir.join(file_name(record));
        tokio::fs::write(&path, &body).await?;

        tracing::debug!("Saved {} ({} bytes)", path.display(), body.len());
        Ok((path, body.len()))
    }

    /// Waits out the download rate between files
    pub async fn pause(&self) {
        if !self.rate.is_zero() {
            tokio::time::sleep(self.rate).await;
        }
    }
}
