//! Upstream client behaviour against a fake API

use super::support::{fast_policy, fast_registry};
use coinalyze_exporter::fetcher::{
    CredentialPool, FetcherError, HistoryFetcher, RateLimitedClient, RetryPolicy,
};
use coinalyze_exporter::registry::QueryContext;
use coinalyze_exporter::Interval;
use serde_json::json;
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FROM: i64 = 1_704_067_200;
const TO: i64 = 1_704_153_599;

fn params() -> QueryContext<'static> {
    QueryContext {
        symbol: "BTCUSDT_PERP.A",
        interval: Interval::OneHour,
        from: FROM,
        to: TO,
    }
}

fn client(server: &MockServer, keys: &str, policy: RetryPolicy) -> RateLimitedClient {
    RateLimitedClient::new(
        format!("{}/v1", server.uri()),
        CredentialPool::from_delimited(keys).unwrap(),
        fast_registry(),
    )
    .unwrap()
    .with_policy(policy)
}

#[tokio::test]
async fn test_request_shape_and_wrapped_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/open-interest-history"))
        .and(header("authorization", "Bearer key-a"))
        .and(header("accept", "application/json"))
        .and(query_param("symbols", "BTCUSDT_PERP.A"))
        .and(query_param("interval", "1hour"))
        .and(query_param("from", FROM.to_string().as_str()))
        .and(query_param("to", TO.to_string().as_str()))
        .and(query_param("convert_to_usd", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "history": [{"t": 1, "v": 5}, {"t": 2, "v": 6}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = client(&server, "key-a", fast_policy())
        .fetch("oi", &params())
        .await
        .unwrap();
    assert_eq!(payload.len(), 2);
    assert_eq!(payload.records()[1]["v"], json!(6));
}

#[tokio::test]
async fn test_credentials_rotate_per_call() {
    let server = MockServer::start().await;
    for key in ["a", "b"] {
        Mock::given(method("GET"))
            .and(header("authorization", format!("Bearer {key}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(2)
            .mount(&server)
            .await;
    }

    let client = client(&server, "a,b", fast_policy());
    for _ in 0..4 {
        let payload = client.fetch("fr", &params()).await.unwrap();
        assert!(payload.is_empty());
    }
}

#[tokio::test]
async fn test_fallback_path_called_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/get-ohlcv-history"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/ohlcv-history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"symbol": "BTCUSDT_PERP.A", "history": [{"t": 1}, {"t": 2}, {"t": 3}]}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let payload = client(&server, "k", fast_policy())
        .fetch("ohlcv", &params())
        .await
        .unwrap();
    assert_eq!(payload.len(), 3);
}

#[tokio::test]
async fn test_not_found_on_last_path_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/funding-rate-history"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, "k", fast_policy())
        .fetch("fr", &params())
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::UpstreamError(404)), "{err:?}");
}

#[tokio::test]
async fn test_auth_rejection_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, "k", fast_policy())
        .fetch("oi", &params())
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::AuthRejected(401)), "{err:?}");
}

#[tokio::test]
async fn test_other_client_error_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, "k", fast_policy())
        .fetch("liq", &params())
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::UpstreamError(400)), "{err:?}");
}

#[tokio::test]
async fn test_rate_limit_wait_is_clamped_to_floor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0.01"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"history": [1, 2, 3]})))
        .expect(1)
        .mount(&server)
        .await;

    let policy = fast_policy();
    let floor = policy.rate_limit_floor;
    let started = Instant::now();
    let payload = client(&server, "k", policy)
        .fetch("ls", &params())
        .await
        .unwrap();

    assert!(started.elapsed() >= floor, "waited {:?}", started.elapsed());
    assert_eq!(payload.len(), 3);
}

#[tokio::test]
async fn test_huge_retry_after_is_capped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1e15"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"t": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let policy = fast_policy();
    let cap = policy.rate_limit_max;
    let payload = tokio::time::timeout(
        cap + Duration::from_secs(5),
        client(&server, "k", policy).fetch("oi", &params()),
    )
    .await
    .expect("capped wait should finish")
    .unwrap();
    assert_eq!(payload.len(), 1);
}

#[tokio::test]
async fn test_server_errors_exhaust_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server, "k", fast_policy())
        .fetch("pfr", &params())
        .await
        .unwrap_err();
    match err {
        FetcherError::ExhaustedRetries {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("503"));
        }
        other => panic!("Expected ExhaustedRetries, got {other:?}"),
    }
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"t": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let payload = client(&server, "k", fast_policy())
        .fetch("oi", &params())
        .await
        .unwrap();
    assert_eq!(payload.len(), 1);
}

#[tokio::test]
async fn test_timeout_counts_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        max_attempts: 2,
        ..fast_policy()
    };
    let err = client(&server, "k", policy)
        .with_timeout(Duration::from_millis(50))
        .unwrap()
        .fetch("oi", &params())
        .await
        .unwrap_err();
    assert!(
        matches!(err, FetcherError::ExhaustedRetries { attempts: 2, .. }),
        "{err:?}"
    );
}

#[tokio::test]
async fn test_non_json_success_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, "k", fast_policy())
        .fetch("oi", &params())
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::InvalidResponse(_)), "{err:?}");
}

#[tokio::test]
async fn test_unknown_category() {
    let server = MockServer::start().await;
    let err = client(&server, "k", fast_policy())
        .fetch("cvd", &params())
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::UnknownCategory(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}
