//! WARC container decoding
//!
//! Common Crawl stores captures in WARC files made of independently gzipped
//! records. A byte-range read of one record returns a gzip member wrapping a
//! frame of the form below. The range end is inclusive and one past the
//! record, so the read also carries the first two bytes of the next member.
//!
//!
//! ```text
//! WARC/1.0\r\n
//! WARC-Type: response\r\n
//! Content-Length: N\r\n
//! \r\n
//! <N bytes of block>\r\n\r\n
//! ```

use flate2::bufread::GzDecoder;
use std::io::Read;
use thiserror::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Record types that carry captured content
const CONTENT_TYPES: &[&str] = &["response", "resource", "conversion"];

/// Errors raised while decoding a WARC container
#[derive(Debug, Error)]
pub enum WarcError {
    #[error("gzip decode failed: {0}")]
    Gzip(#[from] std::io::Error),

    #[error("expected WARC version line, got {0:?}")]
    MissingVersion(String),

    #[error("record header is truncated")]
    TruncatedHeader,

    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("record has no Content-Length header")]
    MissingContentLength,

    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    #[error("record block truncated: expected {expected} bytes, got {actual}")]
    TruncatedBlock { expected: usize, actual: usize },

    #[error("container holds no content record")]
    NoContentRecord,
}

/// One decoded WARC record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarcRecord {
    /// Version line, e.g. `WARC/1.0`
    pub version: String,

    /// Named header fields in order of appearance
    pub headers: Vec<(String, String)>,

    /// Record block (`Content-Length` bytes)
    pub block: Vec<u8>,
}

impl WarcRecord {
    /// Looks up a header value, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn record_type(&self) -> Option<&str> {
        self.header("WARC-Type")
    }

    pub fn target_uri(&self) -> Option<&str> {
        self.header("WARC-Target-URI")
    }

    /// Returns true for records that carry captured content
    pub fn is_content(&self) -> bool {
        self.record_type()
            .map(|t| CONTENT_TYPES.iter().any(|c| t.eq_ignore_ascii_case(c)))
            .unwrap_or(false)
    }

    /// Returns the captured payload
    ///
    /// For HTTP responses this is the entity body after the HTTP header
    /// block; for anything else it is the block itself.
    pub fn payload(&self) -> &[u8] {
        let is_http = self
            .header("Content-Type")
            .map(|t| t.trim_start().starts_with("application/http"))
            .unwrap_or(false);

        if !is_http {
            return &self.block;
        }

        match find(&self.block, b"\r\n\r\n") {
            Some(end) => &self.block[end + 4..],
            None => match find(&self.block, b"\n\n") {
                Some(end) => &self.block[end + 2..],
                None => &[],
            },
        }
    }
}

/// Inflates a sequence of gzip members; data without a gzip header passes through
///
/// A failure in the first member is an error. Any later member that cannot
/// be inflated is a truncated tail left by the range read and ends decoding.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, WarcError> {
    if !data.starts_with(&GZIP_MAGIC) {
        return Ok(data.to_vec());
    }

    let mut inflated = Vec::new();
    let mut rest = data;
    let mut members = 0;

    while rest.starts_with(&GZIP_MAGIC) {
        let before = rest.len();
        let mut member = Vec::new();
        let mut decoder = GzDecoder::new(rest);

        if let Err(e) = decoder.read_to_end(&mut member) {
            if members == 0 {
                return Err(e.into());
            }
            tracing::trace!("Ignoring {} trailing bytes: {}", before, e);
            break;
        }

        inflated.extend_from_slice(&member);
        members += 1;
        rest = decoder.into_inner();

        if rest.len() == before {
            break;
        }
    }

    Ok(inflated)
}

/// Sequential reader over an inflated WARC stream
pub struct WarcReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WarcReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Reads one line, without its terminator
    fn read_line(&mut self) -> Option<&'a [u8]> {
        let data = self.data;
        if self.pos >= data.len() {
            return None;
        }
        let rest = &data[self.pos..];
        let (line, advance) = match rest.iter().position(|b| *b == b'\n') {
            Some(i) => (&rest[..i], i + 1),
            None => (rest, rest.len()),
        };
        self.pos += advance;
        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }

    fn skip_blank_lines(&mut self) {
        while self.pos < self.data.len() && matches!(self.data[self.pos], b'\r' | b'\n') {
            self.pos += 1;
        }
    }

    fn read_record(&mut self) -> Result<WarcRecord, WarcError> {
        let version_line = self.read_line().unwrap_or_default();
        let version = String::from_utf8_lossy(version_line).trim().to_string();
        if !version.starts_with("WARC/") {
            return Err(WarcError::MissingVersion(version));
        }

        let mut headers = Vec::new();
        loop {
            let line = self.read_line().ok_or(WarcError::TruncatedHeader)?;
            if line.is_empty() {
                break;
            }
            let line = String::from_utf8_lossy(line);
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| WarcError::MalformedHeader(line.to_string()))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let length_value = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("Content-Length"))
            .map(|(_, value)| value.clone())
            .ok_or(WarcError::MissingContentLength)?;
        let length: usize = length_value
            .parse()
            .map_err(|_| WarcError::InvalidContentLength(length_value.clone()))?;

        let available = self.data.len() - self.pos;
        if available < length {
            return Err(WarcError::TruncatedBlock {
                expected: length,
                actual: available,
            });
        }

        let block = self.data[self.pos..self.pos + length].to_vec();
        self.pos += length;

        Ok(WarcRecord {
            version,
            headers,
            block,
        })
    }
}

impl Iterator for WarcReader<'_> {
    type Item = Result<WarcRecord, WarcError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_blank_lines();
        if self.pos >= self.data.len() {
            return None;
        }

        let record = self.read_record();
        if record.is_err() {
            // framing is lost, stop after reporting
            self.pos = self.data.len();
        }
        Some(record)
    }
}

/// Decodes a container and returns the payload of its first content record
pub fn extract_payload(data: &[u8]) -> Result<Vec<u8>, WarcError> {
    let inflated = decompress(data)?;

    for record in WarcReader::new(&inflated) {
        let record = record?;
        if record.is_content() {
            return Ok(record.payload().to_vec());
        }
    }

    Err(WarcError::NoContentRecord)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
