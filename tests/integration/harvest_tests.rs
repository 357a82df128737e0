//! Integration tests for the orchestrator
//!
//! These tests drive complete runs over in-memory sources and over a
//! wiremock-backed Wayback source.

use async_trait::async_trait;
use cdx_harvest::config::Config;
use cdx_harvest::orchestrator::harvest;
use cdx_harvest::output::{DownloadOutcome, DownloadPool, FileSaver, HarvestStatistics};
use cdx_harvest::source::{ArchiveSource, SourceRef};
use cdx_harvest::{CdxRecord, HarvestError, Orchestrator, QueryDescriptor, Result, RunEvent};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGES: u32 = 2;
const PER_PAGE: usize = 3;

/// In-memory source answering every query with fixed pages
#[derive(Clone)]
struct FakeSource {
    name: &'static str,
    failing_pattern: Option<&'static str>,
    file_delay: Duration,
    page_requests: Arc<AtomicUsize>,
}

impl FakeSource {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            failing_pattern: None,
            file_delay: Duration::ZERO,
            page_requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing_on(mut self, pattern: &'static str) -> Self {
        self.failing_pattern = Some(pattern);
        self
    }

    fn with_file_delay(mut self, delay: Duration) -> Self {
        self.file_delay = delay;
        self
    }
}

#[async_trait]
impl ArchiveSource for FakeSource {
    fn name(&self) -> &str {
        self.name
    }

    fn parse_response(&self, body: &[u8]) -> Result<Vec<CdxRecord>> {
        let owner: SourceRef = Arc::new(self.clone());
        Ok(String::from_utf8_lossy(body)
            .lines()
            .map(|line| CdxRecord {
                original: line.to_string(),
                timestamp: "20200101000000".to_string(),
                mime_type: "text/plain".to_string(),
                source: Some(owner.clone()),
                ..CdxRecord::default()
            })
            .collect())
    }

    async fn num_pages(&self, pattern: &str) -> Result<u32> {
        if self.failing_pattern == Some(pattern) {
            return Err(HarvestError::InvalidPageCount {
                body: "oops".to_string(),
            });
        }
        Ok(PAGES)
    }

    async fn fetch_page(&self, query: &QueryDescriptor, page: u32) -> Result<Vec<CdxRecord>> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let body = (0..PER_PAGE)
            .map(|i| format!("{}/{}/{}/{}", self.name, query.pattern, page, i))
            .collect::<Vec<_>>()
            .join("\n");
        self.parse_response(body.as_bytes())
    }

    async fn get_file(&self, record: &CdxRecord) -> Result<Vec<u8>> {
        tokio::time::sleep(self.file_delay).await;
        Ok(format!("payload of {}", record.original).into_bytes())
    }
}

fn orchestrator(sources: Vec<SourceRef>, workers: usize) -> Orchestrator {
    Orchestrator::new(sources, workers).with_drain_interval(Duration::from_millis(20))
}

#[tokio::test]
async fn test_every_query_reaches_every_source() {
    let sources: Vec<SourceRef> = vec![
        Arc::new(FakeSource::new("alpha")),
        Arc::new(FakeSource::new("beta")),
    ];
    let queries = vec![
        QueryDescriptor::new("one.example/*"),
        QueryDescriptor::new("two.example/*"),
    ];

    let summary = orchestrator(sources, 3).run(queries).await;

    // 2 queries x 2 sources x 6 records each
    assert!(summary.errors.is_empty());
    assert_eq!(summary.records.len(), 24);
    assert_eq!(PAGES as usize * PER_PAGE, 6);

    let unique: HashSet<&str> = summary.records.iter().map(|r| r.original.as_str()).collect();
    assert_eq!(unique.len(), summary.records.len());
}

#[tokio::test]
async fn test_failing_source_does_not_affect_others() {
    let sources: Vec<SourceRef> = vec![
        Arc::new(FakeSource::new("alpha").failing_on("two.example/*")),
        Arc::new(FakeSource::new("beta")),
    ];
    let queries = vec![
        QueryDescriptor::new("one.example/*"),
        QueryDescriptor::new("two.example/*"),
    ];

    let summary = orchestrator(sources, 2).run(queries).await;

    assert_eq!(summary.errors.len(), 1);
    match &summary.errors[0] {
        HarvestError::Source { source_name, .. } => assert_eq!(source_name, "alpha"),
        other => panic!("expected a tagged error, got {:?}", other),
    }
    assert_eq!(summary.records.len(), 3 * PAGES as usize * PER_PAGE);
}

#[tokio::test]
async fn test_limit_stops_each_traversal() {
    let source = FakeSource::new("alpha");
    let requests = Arc::clone(&source.page_requests);
    let sources: Vec<SourceRef> = vec![Arc::new(source)];

    let queries = vec![QueryDescriptor::new("one.example/*").with_limit(2)];
    let summary = orchestrator(sources, 1).run(queries).await;

    assert_eq!(requests.load(Ordering::SeqCst), 1);
    assert_eq!(summary.records.len(), PER_PAGE);
}

#[tokio::test]
async fn test_more_workers_than_queries() {
    let sources: Vec<SourceRef> = vec![Arc::new(FakeSource::new("alpha"))];
    let queries = vec![QueryDescriptor::new("one.example/*").single_page()];

    let mut run = orchestrator(sources, 8).start(queries);
    assert_eq!(run.pool_size(), 8);

    let mut records = 0;
    while let Some(event) = run.next_event().await {
        if let RunEvent::Records(batch) = event {
            records += batch.len();
        }
    }

    assert!(run.is_complete());
    assert_eq!(run.finished_workers(), 8);
    assert_eq!(records, PER_PAGE);
}

#[tokio::test]
async fn test_empty_query_list_completes() {
    let sources: Vec<SourceRef> = vec![Arc::new(FakeSource::new("alpha"))];
    let summary = orchestrator(sources, 4).run(Vec::new()).await;

    assert!(summary.records.is_empty());
    assert!(summary.errors.is_empty());
}

#[tokio::test]
async fn test_saving_files_from_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let saver = FileSaver::new(dir.path(), Duration::ZERO).await.unwrap();
    let mut stats = HarvestStatistics::default();

    let sources: Vec<SourceRef> = vec![Arc::new(FakeSource::new("alpha"))];
    let queries = vec![QueryDescriptor::new("one.example/*").single_page()];
    let mut run = orchestrator(sources, 1).start(queries);

    while let Some(event) = run.next_event().await {
        match event {
            RunEvent::Records(batch) => {
                stats.record_batch(&batch);
                for record in &batch {
                    let (path, bytes) = saver.save(record).await.unwrap();
                    assert!(path.starts_with(dir.path()));
                    stats.record_file(bytes);
                }
            }
            RunEvent::Error(_) => stats.record_error(),
        }
    }

    assert_eq!(stats.files_written, PER_PAGE as u64);
    assert_eq!(stats.records_by_source.get("alpha"), Some(&(PER_PAGE as u64)));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), PER_PAGE);

    let name = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .find(|n| n.starts_with("alpha%2Fone.example"))
        .unwrap();
    assert!(name.ends_with("-20200101000000-alpha.txt"));

    let content = std::fs::read_to_string(dir.path().join(&name)).unwrap();
    assert!(content.starts_with("payload of alpha/one.example/*/0/"));
}

#[tokio::test]
async fn test_slow_source_does_not_hold_back_downloads() {
    let dir = tempfile::tempdir().unwrap();
    let saver = FileSaver::new(dir.path(), Duration::ZERO).await.unwrap();
    let mut pool = DownloadPool::new(saver);
    let mut stats = HarvestStatistics::default();

    let sources: Vec<SourceRef> = vec![
        Arc::new(FakeSource::new("slow").with_file_delay(Duration::from_millis(500))),
        Arc::new(FakeSource::new("fast")),
    ];
    let queries = vec![QueryDescriptor::new("one.example/*").single_page()];
    let mut run = orchestrator(sources, 2).start(queries);

    let mut saved = Vec::new();
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
                Some(RunEvent::Error(_)) => stats.record_error(),
                None => {
                    draining = false;
                    pool.close();
                }
            },
            outcome = pool.next_outcome() => match outcome {
                Some(DownloadOutcome::Saved { url, bytes, .. }) => {
                    stats.record_file(bytes);
                    saved.push(url);
                }
                Some(DownloadOutcome::Failed { .. }) => stats.record_file_failure(),
                None => break,
            },
        }
    }

    assert_eq!(stats.files_written, 2 * PER_PAGE as u64);
    assert_eq!(stats.file_failures, 0);

    // every fast download lands while the slow lane is still on its first file
    let first_slow = saved.iter().position(|u| u.starts_with("slow/")).unwrap();
    assert_eq!(first_slow, PER_PAGE);
    assert!(saved[..PER_PAGE].iter().all(|u| u.starts_with("fast/")));
}

#[tokio::test]
async fn test_harvest_from_config() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cdx/search/cdx"))
        .and(query_param("showNumPages", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string("1\n"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/cdx/search/cdx"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[["urlkey","timestamp","original","mimetype","statuscode","digest","length"],
["com,example)/","20200101000000","http://example.com/","text/html","200","AAA","1000"],
["com,example)/a","20200102000000","http://example.com/a","text/html","200","BBB","2000"]]"#,
        ))
        .mount(&mock_server)
        .await;

    let mut config = Config::default();
    config.sources.enabled = vec!["wb".to_string()];
    config.wayback.index_server = format!("{}/cdx/search/cdx", mock_server.uri());
    config.wayback.storage = format!("{}/web", mock_server.uri());
    config.run.workers = 2;
    config.run.drain_interval_secs = 1;
    config.request.timeout_secs = 2;

    let summary = harvest(&config, vec![QueryDescriptor::new("example.com/*")])
        .await
        .unwrap();

    assert!(summary.errors.is_empty());
    assert_eq!(summary.records.len(), 2);
    assert!(summary
        .records
        .iter()
        .all(|r| r.source_name() == Some("wayback")));
}
