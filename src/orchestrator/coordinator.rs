//! Run coordination
//!
//! This module contains the driver that spreads queries over a fixed pool of
//! workers and funnels everything they produce back to one consumer:
//! - Preloading and closing the query queue
//! - Spawning the worker pool
//! - Draining the shared record and error channels
//! - Detecting completion from the finished-worker count

use crate::config::RunConfig;
use crate::orchestrator::worker::{run_worker, RunContext};
use crate::query::QueryDescriptor;
use crate::record::CdxRecord;
use crate::source::SourceRef;
use crate::HarvestError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Something produced by a running harvest
#[derive(Debug)]
pub enum RunEvent {
    /// One page of records from one source
    Records(Vec<CdxRecord>),

    /// A failed query page, page count or file, tagged with its source
    Error(HarvestError),
}

/// Everything a run produced
#[derive(Debug, Default)]
pub struct RunSummary {
    pub records: Vec<CdxRecord>,
    pub errors: Vec<HarvestError>,
}

/// Fans queries out across archive sources with a bounded worker pool
pub struct Orchestrator {
    sources: Arc<[SourceRef]>,
    workers: usize,
    drain_interval: Duration,
    channel_capacity: usize,
}

impl Orchestrator {
    /// Creates an orchestrator over a set of sources
    ///
    /// # Arguments
    ///
    /// * `sources` - Archive sources every query is sent to
    /// * `workers` - Pool size; each worker handles one query at a time
    pub fn new(sources: Vec<SourceRef>, workers: usize) -> Self {
        Self {
            sources: sources.into(),
            workers: workers.max(1),
            drain_interval: Duration::from_secs(3),
            channel_capacity: 16,
        }
    }

    /// Creates an orchestrator sized from the run configuration
    pub fn from_config(sources: Vec<SourceRef>, config: &RunConfig) -> Self {
        Self::new(sources, config.workers)
            .with_drain_interval(Duration::from_secs(config.drain_interval_secs))
            .with_channel_capacity(config.channel_capacity)
    }

    /// Sets how often an idle drain loop re-checks for completion
    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    /// Sets the capacity of the record and error channels
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn sources(&self) -> &[SourceRef] {
        &self.sources
    }

    /// Starts a run over a set of queries
    ///
    /// The query queue is filled and closed before any worker starts, so
    /// each query is taken by exactly one worker and workers exit once the
    /// queue is empty. Must be called inside a tokio runtime.
    pub fn start(&self, queries: Vec<QueryDescriptor>) -> Run {
        let (query_tx, query_rx) = mpsc::channel(queries.len().max(1));
        for query in queries {
            // capacity covers every query and the receiver is alive
            let _ = query_tx.try_send(query);
        }
        drop(query_tx);

        let (records_tx, records_rx) = mpsc::channel(self.channel_capacity);
        let (errors_tx, errors_rx) = mpsc::channel(self.channel_capacity);
        let finished = Arc::new(AtomicUsize::new(0));

        let ctx = RunContext {
            records: records_tx,
            errors: errors_tx,
            finished: Arc::clone(&finished),
        };
        let queue = Arc::new(Mutex::new(query_rx));

        tracing::info!(
            "Starting {} workers over {} sources",
            self.workers,
            self.sources.len()
        );

        let handles = (0..self.workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&self.sources),
                    ctx.clone(),
                ))
            })
            .collect();

        Run {
            records: records_rx,
            errors: errors_rx,
            finished,
            pool_size: self.workers,
            drain_interval: self.drain_interval,
            handles,
        }
    }

    /// Runs a set of queries to completion and collects everything
    pub async fn run(&self, queries: Vec<QueryDescriptor>) -> RunSummary {
        self.start(queries).collect().await
    }
}

/// Handle to a started run
///
/// Records and errors must be consumed while the run is active: the
/// channels are bounded, so an idle consumer holds the workers back.
pub struct Run {
    records: mpsc::Receiver<Vec<CdxRecord>>,
    errors: mpsc::Receiver<HarvestError>,
    finished: Arc<AtomicUsize>,
    pool_size: usize,
    drain_interval: Duration,
    handles: Vec<JoinHandle<()>>,
}

impl Run {
    /// Number of workers that have left their consumption loop
    pub fn finished_workers(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// True once every worker has exited
    pub fn is_complete(&self) -> bool {
        if self.finished_workers() >= self.pool_size {
            return true;
        }

        // a panicked worker never reports in
        if self.handles.iter().all(|h| h.is_finished()) {
            tracing::warn!(
                "All worker tasks ended but only {}/{} reported completion",
                self.finished_workers(),
                self.pool_size
            );
            return true;
        }

        false
    }

    /// Waits for the next record batch or error
    ///
    /// Returns `None` once the run is complete and both channels are drained.
    /// While nothing arrives the loop wakes up every drain interval to
    /// re-check completion; an idle interval is not a failure.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        loop {
            if self.is_complete() {
                return tokio::select! {
                    Some(batch) = self.records.recv() => Some(RunEvent::Records(batch)),
                    Some(error) = self.errors.recv() => Some(RunEvent::Error(error)),
                    else => None,
                };
            }

            tokio::select! {
                Some(batch) = self.records.recv() => return Some(RunEvent::Records(batch)),
                Some(error) = self.errors.recv() => return Some(RunEvent::Error(error)),
                _ = tokio::time::sleep(self.drain_interval) => continue,
            }
        }
    }

    /// Drains the run and collects every record and error
    pub async fn collect(mut self) -> RunSummary {
        let mut summary = RunSummary::default();

        while let Some(event) = self.next_event().await {
            match event {
                RunEvent::Records(batch) => summary.records.extend(batch),
                RunEvent::Error(error) => {
                    tracing::warn!("{}", error);
                    summary.errors.push(error);
                }
            }
        }

        tracing::info!(
            "Run complete: {} records, {} errors",
            summary.records.len(),
            summary.errors.len()
        );
        summary
    }
}
