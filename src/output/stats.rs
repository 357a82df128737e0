//! Run statistics
//!
//! Counters are owned by the task draining the run; fetchers never touch
//! them directly.

use std::collections::BTreeMap;

/// Totals for one harvest run
#[derive(Debug, Clone, Default)]
pub struct HarvestStatistics {
    /// Records received, per source name
    pub records_by_source: BTreeMap<String, u64>,

    /// Errors reported by the run
    pub errors: u64,

    /// Files written to disk
    pub files_written: u64,

    /// Payload bytes downloaded
    pub bytes_downloaded: u64,

    /// Files that could not be retrieved or written
    pub file_failures: u64,
}

impl HarvestStatistics {
    /// Counts a batch of records under their owning source
    pub fn record_batch(&mut self, batch: &[crate::record::CdxRecord]) {
        for record in batch {
            let source = record.source_name().unwrap_or("unknown").to_string();
            *self.records_by_source.entry(source).or_insert(0) += 1;
        }
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn record_file(&mut self, bytes: usize) {
        self.files_written += 1;
        self.bytes_downloaded += bytes as u64;
    }

    pub fn record_file_failure(&mut self) {
        self.file_failures += 1;
    }

    pub fn total_records(&self) -> u64 {
        self.records_by_source.values().sum()
    }
}

/// Prints statistics to stderr in a formatted manner
///
/// Stdout is left to URL output.
pub fn print_statistics(stats: &HarvestStatistics) {
    eprintln!("=== Harvest Statistics ===\n");

    eprintln!("Records:");
    eprintln!("  Total: {}", stats.total_records());
    for (source, count) in &stats.records_by_source {
        eprintln!("  {}: {}", source, count);
    }
    eprintln!();

    if stats.files_written > 0 || stats.file_failures > 0 {
        eprintln!("Files:");
        eprintln!("  Written: {}", stats.files_written);
        eprintln!("  Failed: {}", stats.file_failures);
        eprintln!("  Downloaded: {} bytes", stats.bytes_downloaded);
        eprintln!();
    }

    eprintln!("Errors: {}", stats.errors);
}
