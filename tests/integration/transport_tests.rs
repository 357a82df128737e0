//! Integration tests for the retrying transport
//!
//! These tests use wiremock to check attempt counts and status handling
//! against a real HTTP server.

use cdx_harvest::transport::Transport;
use cdx_harvest::HarvestError;
use std::time::{Duration, Instant};
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_millis(300);

#[tokio::test]
async fn test_unavailable_exhausts_exact_attempts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let transport = Transport::new().unwrap();
    let url = format!("{}/busy", mock_server.uri());

    let started = Instant::now();
    let result = transport.get(&url, TIMEOUT, 3).await;
    let elapsed = started.elapsed();

    match result {
        Err(HarvestError::RetriesExhausted {
            attempts, source, ..
        }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, HarvestError::Unavailable { .. }));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }

    // backoff after the first two attempts only
    assert!(elapsed >= TIMEOUT * 2);
    assert!(elapsed < TIMEOUT * 3 + Duration::from_millis(250));
}

#[tokio::test]
async fn test_overloaded_then_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = Transport::new().unwrap();
    let url = format!("{}/flaky", mock_server.uri());

    let body = transport.get(&url, TIMEOUT, 3).await.unwrap();
    assert_eq!(body, b"recovered");
}

#[tokio::test]
async fn test_empty_ok_body_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = Transport::new().unwrap();
    let url = format!("{}/empty", mock_server.uri());

    let result = transport.get(&url, TIMEOUT, 5).await;
    assert!(matches!(result, Err(HarvestError::EmptyBody { .. })));
}

#[tokio::test]
async fn test_non_ok_status_with_body_is_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/partial"))
        .respond_with(ResponseTemplate::new(206).set_body_string("partial content"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = Transport::new().unwrap();
    let url = format!("{}/partial", mock_server.uri());

    let body = transport.get(&url, TIMEOUT, 3).await.unwrap();
    assert_eq!(body, b"partial content");
}

#[tokio::test]
async fn test_empty_error_status_is_retried_without_backoff() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&mock_server)
        .await;

    let transport = Transport::new().unwrap();
    let url = format!("{}/missing", mock_server.uri());

    let result = transport.get(&url, Duration::from_secs(5), 2).await;
    match result {
        Err(HarvestError::RetriesExhausted { source, .. }) => {
            assert!(matches!(*source, HarvestError::Status { status: 404, .. }));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_zero_retries_makes_one_attempt() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/once"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = Transport::new().unwrap();
    let url = format!("{}/once", mock_server.uri());

    let result = transport.get(&url, TIMEOUT, 0).await;
    assert!(matches!(
        result,
        Err(HarvestError::RetriesExhausted { attempts: 1, .. })
    ));
}

#[tokio::test]
async fn test_requests_carry_user_agent_and_extra_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/headers"))
        .and(header_exists("user-agent"))
        .and(header("range", "bytes=10-20"))
        .respond_with(ResponseTemplate::new(206).set_body_string("ok"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = Transport::new().unwrap();
    let url = format!("{}/headers", mock_server.uri());

    let body = transport
        .get_with_headers(&url, TIMEOUT, 1, &[("Range", "bytes=10-20".to_string())])
        .await
        .unwrap();
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let transport = Transport::new().unwrap();
    let url = format!("{}/slow", mock_server.uri());

    let result = transport.get(&url, Duration::from_millis(200), 1).await;
    match result {
        Err(HarvestError::RetriesExhausted { source, .. }) => {
            assert!(matches!(*source, HarvestError::Timeout { .. }));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
}
