//! cdx-harvest main entry point
//!
//! This is the command-line interface for collecting archived URLs and files
//! from the Wayback Machine and Common Crawl.

use cdx_harvest::config::{load_or_default, validate, validate_date_bound, Config};
use cdx_harvest::output::{
    mime_for_extension, print_statistics, DownloadOutcome, DownloadPool, FileSaver,
    HarvestStatistics, LineFormat, LineWriter,
};
use cdx_harvest::source::build_sources;
use cdx_harvest::transport::Transport;
use cdx_harvest::{Orchestrator, QueryDescriptor, RunEvent};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// cdx-harvest: collects URLs and files from web archives
///
/// Queries the CDX indexes of the Wayback Machine and Common Crawl for
/// one or more URL patterns, with filters, limits and collapsing applied
/// on the server side.
#[derive(Parser, Debug)]
#[command(name = "cdx-harvest")]
#[command(version = "1.0.0")]
#[command(about = "Collects URLs and files from web archives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to TOML configuration file
    #[arg(long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Filter to apply, repeatable (e.g. "mimetype:application/pdf")
    #[arg(short, long = "filter", global = true)]
    filters: Vec<String>,

    /// Get only unique URLs
    #[arg(short, long, global = true)]
    collapse: bool,

    /// Get only status 200 captures
    #[arg(long, global = true)]
    successful: bool,

    /// File extensions to search for, comma separated (e.g. pdf,xml)
    #[arg(short, long = "ext", global = true, value_delimiter = ',')]
    extensions: Vec<String>,

    /// Request timeout in seconds
    #[arg(short, long, global = true)]
    timeout: Option<u64>,

    /// Attempts per request
    #[arg(short, long, global = true)]
    retries: Option<u32>,

    /// Maximum records per query and source (0 for no limit)
    #[arg(short, long, global = true, default_value_t = 0)]
    limit: u32,

    /// Number of concurrent workers
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Archive sources to query, comma separated (wb, cc)
    #[arg(short, long, global = true, value_delimiter = ',')]
    sources: Vec<String>,

    /// Earliest capture time (4-14 digit timestamp prefix)
    #[arg(long, global = true, value_parser = parse_date_bound)]
    from: Option<String>,

    /// Latest capture time (4-14 digit timestamp prefix)
    #[arg(long, global = true, value_parser = parse_date_bound)]
    to: Option<String>,

    /// Common Crawl index to query (default: newest)
    #[arg(long, global = true)]
    index: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect URLs from web archives for the given patterns
    #[command(visible_alias = "collect")]
    Url {
        /// URL patterns to query (e.g. "example.com/*")
        #[arg(required = true)]
        patterns: Vec<String>,

        /// Path to the output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write one JSON record per line instead of bare URLs
        #[arg(long)]
        json: bool,
    },

    /// Download archived files for the given patterns
    #[command(visible_alias = "download")]
    File {
        /// URL patterns to query (e.g. "example.com/*")
        #[arg(required = true)]
        patterns: Vec<String>,

        /// Directory to save files into
        #[arg(short, long)]
        dir: PathBuf,

        /// Seconds to wait between saved files
        #[arg(long)]
        rate: Option<u64>,
    },
}

fn parse_date_bound(value: &str) -> Result<String, String> {
    validate_date_bound(value)
        .map(|_| value.to_string())
        .map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match build_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let filters = build_filters(&cli)?;

    match &cli.command {
        Command::Url {
            patterns,
            output,
            json,
        } => {
            let queries = build_queries(&cli, patterns, &filters);
            let format = if *json { LineFormat::Json } else { LineFormat::Url };
            handle_url(&config, queries, output.as_ref(), format).await?;
        }
        Command::File {
            patterns,
            dir,
            rate,
        } => {
            let queries = build_queries(&cli, patterns, &filters);
            let rate = Duration::from_secs(rate.unwrap_or(config.run.download_rate_secs));
            handle_file(&config, queries, dir, rate).await?;
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr so stdout carries only harvested URLs.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("cdx_harvest=info,warn"),
            1 => EnvFilter::new("cdx_harvest=debug,info"),
            2 => EnvFilter::new("cdx_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the configuration file and applies command-line overrides
fn build_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    if let Some(path) = &cli.config {
        tracing::info!("Loading configuration from: {}", path.display());
    }
    let mut config = load_or_default(cli.config.as_deref())?;

    if let Some(timeout) = cli.timeout {
        config.request.timeout_secs = timeout;
    }
    if let Some(retries) = cli.retries {
        config.request.retries = retries;
    }
    if let Some(workers) = cli.workers {
        config.run.workers = workers;
    }
    if !cli.sources.is_empty() {
        config.sources.enabled = cli.sources.clone();
    }
    if let Some(index) = &cli.index {
        config.commoncrawl.index = Some(index.clone());
    }

    validate(&config)?;
    Ok(config)
}

/// Collects explicit filters plus those implied by `--ext` and `--successful`
fn build_filters(cli: &Cli) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut filters = cli.filters.clone();

    for ext in &cli.extensions {
        let mime = mime_for_extension(ext).ok_or_else(|| {
            format!(
                "No MIME type found for '{}', please use '--filter' with the matching MIME type",
                ext
            )
        })?;
        filters.push(format!("mimetype:{}", mime));
    }

    if cli.successful {
        filters.push("statuscode:200".to_string());
    }

    Ok(filters)
}

fn build_queries(cli: &Cli, patterns: &[String], filters: &[String]) -> Vec<QueryDescriptor> {
    patterns
        .iter()
        .map(|pattern| {
            let mut query = QueryDescriptor::new(pattern.as_str())
                .with_filters(filters.to_vec())
                .with_limit(cli.limit)
                .with_date_range(cli.from.clone(), cli.to.clone());
            if cli.collapse {
                query = query.with_collapse("urlkey");
            }
            query
        })
        .collect()
}

async fn build_orchestrator(config: &Config) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let transport = Transport::new()?;
    let sources = match build_sources(config, &transport).await {
        Ok(sources) => sources,
        Err(e) => {
            tracing::error!("Cannot initialize archive sources: {}", e);
            return Err(e.into());
        }
    };
    Ok(Orchestrator::from_config(sources, &config.run))
}

/// Handles the `url` mode: writes each record as a line
async fn handle_url(
    config: &Config,
    queries: Vec<QueryDescriptor>,
    output: Option<&PathBuf>,
    format: LineFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let out: Box<dyn Write> = match output {
        Some(path) => Box::new(std::io::BufWriter::new(std::fs::File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = LineWriter::new(out, format);
    let mut stats = HarvestStatistics::default();

    let orchestrator = build_orchestrator(config).await?;
    let mut run = orchestrator.start(queries);

    while let Some(event) = run.next_event().await {
        match event {
            RunEvent::Records(batch) => {
                stats.record_batch(&batch);
                writer.write_batch(&batch)?;
            }
            RunEvent::Error(e) => {
                stats.record_error();
                tracing::warn!("{}", e);
            }
        }
    }

    writer.finish()?;
    tracing::info!(
        "Collected {} records with {} errors",
        stats.total_records(),
        stats.errors
    );
    Ok(())
}

/// Handles the `file` mode: retrieves and saves each record's payload
///
/// Downloads run on one lane per source while this task keeps draining the
/// run, so a slow archive does not hold back the others.
async fn handle_file(
    config: &Config,
    queries: Vec<QueryDescriptor>,
    dir: &PathBuf,
    rate: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let saver = FileSaver::new(dir.clone(), rate).await?;
    let mut pool = DownloadPool::new(saver);
    let mut stats = HarvestStatistics::default();

    let orchestrator = build_orchestrator(config).await?;
    let mut run = orchestrator.start(queries);
    let mut draining = true;

    loop {
        tokio::select! {
            event = run.next_event(), if draining => match event {
                Some(RunEvent::Records(batch)) => {
                    stats.record_batch(&batch);
                    for record in batch {
                        pool.submit(record);
                    }
                }
                Some(RunEvent::Error(e)) => {
                    stats.record_error();
                    tracing::warn!("{}", e);
                }
                None => {
                    draining = false;
                    pool.close();
                }
            },
            outcome = pool.next_outcome() => match outcome {
                Some(DownloadOutcome::Saved { path, bytes, .. }) => {
                    stats.record_file(bytes);
                    tracing::info!("Saved {}", path.display());
                }
                Some(DownloadOutcome::Failed { url, error }) => {
                    stats.record_file_failure();
                    tracing::warn!("Cannot save {}: {}", url, error);
                }
                None => break,
            },
        }
    }

    print_statistics(&stats);
    Ok(())
}
