//! Worker loop and shared run state

use crate::query::QueryDescriptor;
use crate::record::CdxRecord;
use crate::source::SourceRef;
use crate::HarvestError;
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Query descriptors shared by all workers; closed once preloaded
pub(crate) type QueryQueue = Arc<Mutex<mpsc::Receiver<QueryDescriptor>>>;

/// Output channels and completion counter handed to every worker
#[derive(Clone)]
pub(crate) struct RunContext {
    pub records: mpsc::Sender<Vec<CdxRecord>>,
    pub errors: mpsc::Sender<HarvestError>,
    pub finished: Arc<AtomicUsize>,
}

/// Consumes queries until the queue is closed and drained
///
/// Each query is fanned out to every source at once; the worker waits for
/// all of them before taking the next query.
pub(crate) async fn run_worker(
    id: usize,
    queries: QueryQueue,
    sources: Arc<[SourceRef]>,
    ctx: RunContext,
) {
    tracing::debug!("Worker {} started", id);

    loop {
        // hold the lock only while waiting for the next query
        let next = queries.lock().await.recv().await;
        let Some(query) = next else {
            break;
        };

        tracing::info!("Worker {} fetching {}", id, query.pattern);
        let fetches = sources
            .iter()
            .map(|source| source.fetch_pages(&query, ctx.records.clone(), ctx.errors.clone()));
        join_all(fetches).await;
    }

    let finished = ctx.finished.fetch_add(1, Ordering::SeqCst) + 1;
    tracing::debug!("Worker {} exited ({} finished)", id, finished);
}
