//! Concurrent file downloads
//!
//! Each archive source gets its own download lane: a task that retrieves and
//! saves that source's records one at a time, pausing for the download rate
//! between files. An overloaded source only slows down its own lane.
//! Outcomes flow back over a channel so counters stay with the consumer.

use crate::output::files::FileSaver;
use crate::record::CdxRecord;
use crate::HarvestError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Result of one file download
#[derive(Debug)]
pub enum DownloadOutcome {
    Saved {
        url: String,
        path: PathBuf,
        bytes: usize,
    },
    Failed {
        url: String,
        error: HarvestError,
    },
}

/// Spreads records over one download lane per source
pub struct DownloadPool {
    saver: Arc<FileSaver>,
    lanes: HashMap<String, mpsc::UnboundedSender<CdxRecord>>,
    outcomes_tx: Option<mpsc::UnboundedSender<DownloadOutcome>>,
    outcomes_rx: mpsc::UnboundedReceiver<DownloadOutcome>,
}

impl DownloadPool {
    pub fn new(saver: FileSaver) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Self {
            saver: Arc::new(saver),
            lanes: HashMap::new(),
            outcomes_tx: Some(outcomes_tx),
            outcomes_rx,
        }
    }

    /// Queues a record on its source's lane, starting the lane if needed
    ///
    /// Never waits, so the caller can keep draining the run. Records
    /// submitted after [`DownloadPool::close`] are dropped.
    pub fn submit(&mut self, record: CdxRecord) {
        let Some(outcomes) = self.outcomes_tx.as_ref() else {
            tracing::warn!("Download pool closed, dropping {}", record.original);
            return;
        };

        let lane = record.source_name().unwrap_or("unknown").to_string();
        let sender = self.lanes.entry(lane).or_insert_with_key(|lane| {
            let (tx, rx) = mpsc::unbounded_channel();
            tracing::debug!("Starting download lane for {}", lane);
            tokio::spawn(run_lane(rx, Arc::clone(&self.saver), outcomes.clone()));
            tx
        });

        // lanes only exit once their sender is dropped
        let _ = sender.send(record);
    }

    /// Number of open lanes
    pub fn lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Stops accepting records; lanes finish what is queued and exit
    pub fn close(&mut self) {
        self.lanes.clear();
        self.outcomes_tx = None;
    }

    /// Waits for the next outcome
    ///
    /// Returns `None` once the pool is closed and every lane has exited.
    pub async fn next_outcome(&mut self) -> Option<DownloadOutcome> {
        self.outcomes_rx.recv().await
    }
}

async fn run_lane(
    mut records: mpsc::UnboundedReceiver<CdxRecord>,
    saver: Arc<FileSaver>,
    outcomes: mpsc::UnboundedSender<DownloadOutcome>,
) {
    while let Some(record) = records.recv().await {
        let outcome = match saver.save(&record).await {
            Ok((path, bytes)) => DownloadOutcome::Saved {
                url: record.original,
                path,
                bytes,
            },
            Err(error) => DownloadOutcome::Failed {
                url: record.original,
                error,
            },
        };

        if outcomes.send(outcome).is_err() {
            return;
        }
        saver.pause().await;
    }
}
