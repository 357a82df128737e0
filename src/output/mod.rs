//! Output module for harvest results
//!
//! This module handles:
//! - Writing original URLs or JSON records as lines
//! - Saving archived payloads to disk
//! - Downloading payloads concurrently, one lane per source
//! - Recording run statistics

mod downloads;
mod files;
pub mod stats;

pub use downloads::{DownloadOutcome, DownloadPool};
pub use files::{extension_for_mime, file_name, mime_for_extension, FileSaver};
pub use stats::{print_statistics, HarvestStatistics};

use crate::record::CdxRecord;
use crate::{HarvestError, Result};
use std::io::Write;

/// Line format for the `url` output mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    /// One original URL per line
    Url,

    /// One JSON object per record
    Json,
}

/// Writes records as lines to any writer
pub struct LineWriter<W: Write> {
    out: W,
    format: LineFormat,
    written: u64,
}

impl<W: Write> LineWriter<W> {
    pub fn new(out: W, format: LineFormat) -> Self {
        Self {
            out,
            format,
            written: 0,
        }
    }

    /// Writes one batch of records
    pub fn write_batch(&mut self, batch: &[CdxRecord]) -> Result<()> {
        for record in batch {
            match self.format {
                LineFormat::Url => writeln!(self.out, "{}", record.original)?,
                LineFormat::Json => {
                    let line =
                        serde_json::to_string(record).map_err(|e| HarvestError::Json {
                            context: format!("encoding record for {}", record.original),
                            source: e,
                        })?;
                    writeln!(self.out, "{}", line)?;
                }
            }
            self.written += 1;
        }
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flushes and returns the inner writer
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}
