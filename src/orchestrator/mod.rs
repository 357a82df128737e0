//! Orchestrator module for concurrent harvesting
//!
//! This module contains the run machinery, including:
//! - A fixed pool of workers consuming query descriptors
//! - Per-query fan-out to every configured archive source
//! - Shared record and error channels drained by one consumer
//! - Completion tracking through the finished-worker count

mod coordinator;
mod worker;

pub use coordinator::{Orchestrator, Run, RunEvent, RunSummary};

use crate::config::Config;
use crate::query::QueryDescriptor;
use crate::source::build_sources;
use crate::transport::Transport;
use crate::Result;

/// Runs a complete harvest
///
/// This is the main entry point for library users. It will:
/// 1. Build the HTTP transport
/// 2. Build every enabled archive source
/// 3. Run all queries through the worker pool
/// 4. Collect records and errors
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `queries` - One descriptor per input pattern
///
/// # Returns
///
/// * `Ok(RunSummary)` - The run finished; per-query failures are in `errors`
/// * `Err(HarvestError)` - A source could not be constructed
///
/// # Example
///
/// ```no_run
/// use cdx_harvest::config::Config;
/// use cdx_harvest::orchestrator::harvest;
/// use cdx_harvest::query::QueryDescriptor;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queries = vec![QueryDescriptor::new("example.com/*").with_limit(100)];
/// let summary = harvest(&Config::default(), queries).await?;
/// println!("{} records", summary.records.len());
/// # Ok(())
/// # }
/// ```
pub async fn harvest(config: &Config, queries: Vec<QueryDescriptor>) -> Result<RunSummary> {
    let transport = Transport::new()?;
    let sources = build_sources(config, &transport).await?;
    let orchestrator = Orchestrator::from_config(sources, &config.run);
    Ok(orchestrator.run(queries).await)
}
