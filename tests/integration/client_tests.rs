//! Rate-limited client behavior against a mock upstream

use crate::{manual_clock, start_time, test_client};
use osh_harvest::client::ClientError;
use osh_harvest::clock::Clock;
use osh_harvest::credentials::CredentialPool;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_success_sends_bearer_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .and(header("authorization", "Bearer token-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "widget"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(CredentialPool::from_tokens(["token-a"], manual_clock()));
    let url = format!("{}/repos/acme/widget", mock_server.uri());

    let body: Value = client
        .get_json(&url)
        .await
        .expect("Request failed")
        .expect("Body is not JSON");

    assert_eq!(body["name"], "widget");
}

#[tokio::test]
async fn test_rate_limit_headers_update_pool() {
    let mock_server = MockServer::start().await;
    let reset = start_time() + chrono::Duration::hours(1);

    Mock::given(method("GET"))
        .and(path("/rate"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-remaining", "41")
                .insert_header("x-ratelimit-limit", "60")
                .insert_header("x-ratelimit-reset", reset.timestamp().to_string().as_str())
                .set_body_json(json!({})),
        )
        .mount(&mock_server)
        .await;

    let pool = CredentialPool::from_tokens(["token-a"], manual_clock());
    let client = test_client(pool.clone());

    let response = client
        .get(&format!("{}/rate", mock_server.uri()))
        .await
        .expect("Request failed");

    assert_eq!(response.usage.remaining, Some(41));
    let status = &pool.snapshot()[0];
    assert_eq!(status.remaining, Some(41));
    assert_eq!(status.reset_at, Some(reset));
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(CredentialPool::from_tokens(["token-a"], manual_clock()));
    let result = client
        .get(&format!("{}/repos/acme/gone", mock_server.uri()))
        .await;

    assert!(matches!(result, Err(ClientError::NotFound { .. })));
}

#[tokio::test]
async fn test_unprocessable_is_fatal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .respond_with(ResponseTemplate::new(422))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(CredentialPool::from_tokens(["token-a"], manual_clock()));
    let result = client
        .get(&format!("{}/repos/acme/widget", mock_server.uri()))
        .await;

    assert!(matches!(result, Err(ClientError::Fatal { status: 422, .. })));
}

#[tokio::test]
async fn test_server_error_is_retried_after_backoff() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "widget"})))
        .mount(&mock_server)
        .await;

    let clock = manual_clock();
    let client = test_client(CredentialPool::from_tokens(["token-a"], clock.clone()));

    let response = client
        .get(&format!("{}/repos/acme/widget", mock_server.uri()))
        .await
        .expect("Retry did not recover");

    assert_eq!(response.status, 200);
    assert!(clock.total_slept() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = test_client(CredentialPool::from_tokens(["token-a"], manual_clock()));
    let result = client.get(&format!("{}/flaky", mock_server.uri())).await;

    match result {
        Err(ClientError::RetriesExhausted {
            attempts,
            last_error,
            ..
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last_error, "HTTP 503");
        }
        other => panic!("Expected RetriesExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_non_idempotent_request_gets_one_attempt() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(CredentialPool::from_tokens(["token-a"], manual_clock()));
    let result = client
        .request(Method::POST, &format!("{}/graphql", mock_server.uri()))
        .await;

    assert!(matches!(
        result,
        Err(ClientError::RetriesExhausted { attempts: 1, .. })
    ));
}

#[tokio::test]
async fn test_rejected_token_rotates_to_next() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .and(header("authorization", "Bearer token-a"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .and(header("authorization", "Bearer token-b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "widget"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let pool = CredentialPool::from_tokens(["token-a", "token-b"], manual_clock());
    let client = test_client(pool.clone());

    let response = client
        .get(&format!("{}/repos/acme/widget", mock_server.uri()))
        .await
        .expect("Second token should succeed");

    assert_eq!(response.status, 200);
    assert_eq!(pool.valid_count(), 1);
    assert!(!pool.snapshot()[0].valid);
}

#[tokio::test]
async fn test_every_token_rejected_exhausts_pool() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&mock_server)
        .await;

    let pool = CredentialPool::from_tokens(["token-a", "token-b"], manual_clock());
    let client = test_client(pool.clone());

    let result = client
        .get(&format!("{}/repos/acme/widget", mock_server.uri()))
        .await;

    assert!(matches!(result, Err(ClientError::PoolExhausted)));
    assert_eq!(pool.valid_count(), 0);
}

#[tokio::test]
async fn test_throttled_response_waits_for_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "5"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&mock_server)
        .await;

    let clock = manual_clock();
    let client = test_client(CredentialPool::from_tokens(["token-a"], clock.clone()));

    client
        .get(&format!("{}/repos/acme/widget", mock_server.uri()))
        .await
        .expect("Request after cooldown failed");

    assert!(clock.total_slept() >= Duration::from_secs(5));
    assert!(clock.now() >= start_time() + chrono::Duration::seconds(5));
}

#[tokio::test]
async fn test_exhausted_token_rotates_without_waiting() {
    let mock_server = MockServer::start().await;
    let reset = start_time() + chrono::Duration::hours(1);

    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .and(header("authorization", "Bearer token-a"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.timestamp().to_string().as_str()),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .and(header("authorization", "Bearer token-b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let clock = manual_clock();
    let pool = CredentialPool::from_tokens(["token-a", "token-b"], clock.clone());
    let client = test_client(pool.clone());

    client
        .get(&format!("{}/repos/acme/widget", mock_server.uri()))
        .await
        .expect("Rotation to the second token failed");

    assert_eq!(clock.total_slept(), Duration::ZERO);
    assert_eq!(pool.snapshot()[0].remaining, Some(0));
    assert_eq!(pool.valid_count(), 2);
}

#[tokio::test]
async fn test_quota_beyond_wait_limit_defers() {
    let mock_server = MockServer::start().await;
    let reset = start_time() + chrono::Duration::hours(1);

    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.timestamp().to_string().as_str()),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(CredentialPool::from_tokens(["token-a"], manual_clock()));
    let result = client
        .get(&format!("{}/repos/acme/widget", mock_server.uri()))
        .await;

    match result {
        Err(ClientError::QuotaDeferred { ready_at }) => assert_eq!(ready_at, reset),
        other => panic!("Expected QuotaDeferred, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_json_is_reported_separately() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&mock_server)
        .await;

    let client = test_client(CredentialPool::from_tokens(["token-a"], manual_clock()));
    let result = client
        .get_json::<Value>(&format!("{}/broken", mock_server.uri()))
        .await
        .expect("Transport should succeed");

    assert!(result.is_err());
}
