//! BrsClient behaviour against a mock HTTP provider

use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;
use symbol_etl::api::{BrsClient, FetchError, HistoryProvider};
use symbol_etl::models::DataType;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{logging, test_config, test_data};

async fn client_for(server: &MockServer, extra: &[(&str, &str)]) -> BrsClient {
    let config = test_config(&format!("{}/History.php", server.uri()), extra);
    BrsClient::new(&config).expect("client builds")
}

#[tokio::test]
async fn test_fetch_sends_key_type_and_symbol() {
    logging::init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/History.php"))
        .and(query_param("key", "test_key"))
        .and(query_param("type", "0"))
        .and(query_param("l18", "فملی"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            test_data::price_json("1404-06-01", "12:29:59", 1000)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, &[]).await;
    let records = client.fetch_history("فملی", DataType::Price).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["pc"], "1000");
}

#[tokio::test]
async fn test_bad_request_is_not_retried() {
    logging::init_test_logging();
    logging::log_test_step("HTTP 400 short-circuits the retry loop");
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, &[]).await;
    let err = client.fetch_history("AAA", DataType::Deals).await.unwrap_err();

    assert!(err.is_rejection());
    assert_matches!(err, FetchError::Rejected { status: 400, data_type: DataType::Deals, .. });
}

#[tokio::test]
async fn test_server_errors_exhaust_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(5)
        .mount(&server)
        .await;

    let client = client_for(&server, &[]).await;
    let err = client.fetch_history("AAA", DataType::Price).await.unwrap_err();

    assert_matches!(err, FetchError::RetriesExhausted { attempts: 5, .. });
}

#[tokio::test]
async fn test_timeouts_are_retried_then_reported() {
    logging::init_test_logging();
    logging::log_test_step("Slow responses time out on every attempt");
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let client = client_for(&server, &[("FETCH_MAX_ATTEMPTS", "2")]).await;
    let err = client.fetch_history("AAA", DataType::Price).await.unwrap_err();

    assert_matches!(err, FetchError::RetriesExhausted { attempts: 2, .. });
    let received = server.received_requests().await.unwrap_or_default();
    assert_eq!(received.len(), 2);
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            test_data::deal_json("1404-06-01", 12)
        ])))
        .mount(&server)
        .await;

    let client = client_for(&server, &[]).await;
    let records = client.fetch_history("AAA", DataType::Deals).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 3);
}

#[tokio::test]
async fn test_invalid_json_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server, &[]).await;
    let records = client.fetch_history("AAA", DataType::Price).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_wrapped_object_body_is_unwrapped() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "data": [
                test_data::price_json("1404-06-01", "12:29:59", 1000),
                test_data::price_json("1404-06-02", "12:29:59", 1010)
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, &[]).await;
    let records = client.fetch_history("AAA", DataType::Price).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["date"], "1404-06-02");
}

#[tokio::test]
async fn test_curl_mode_adds_flag() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("curl", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, &[("BRSAPI_CURL", "true")]).await;
    client.fetch_history("AAA", DataType::Price).await.unwrap();
}
