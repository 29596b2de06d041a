// Integration tests for `TelemetryClient` using wiremock.
#![allow(clippy::unwrap_used)]

use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use roomsense_api::{Error, TelemetryClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, TelemetryClient) {
    let server = MockServer::start().await;
    let base = Url::parse(&format!("{}/api", server.uri())).unwrap();
    let client = TelemetryClient::new(base, &TransportConfig::default()).unwrap();
    (server, client)
}

fn reading(device_id: &str, room: &str, ts: &str) -> serde_json::Value {
    json!({
        "device_id": device_id,
        "room": room,
        "temperature": 21.5,
        "humidity": 40.0,
        "pressure": 1012.0,
        "timestamp": ts
    })
}

// ── Snapshot endpoint ───────────────────────────────────────────────

#[tokio::test]
async fn fetch_latest_parses_readings() {
    let (server, client) = setup().await;

    let body = json!([
        reading("esp32-01", "Lab", "2026-03-01T12:00:00Z"),
        reading("esp32-02", "Kitchen", "2026-03-01T12:00:05Z"),
    ]);

    Mock::given(method("GET"))
        .and(path("/api/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let readings = client.fetch_latest().await.unwrap();

    assert_eq!(readings.len(), 2);
    assert_eq!(readings[0].device_id, "esp32-01");
    assert_eq!(readings[0].room, "Lab");
    assert_eq!(readings[1].device_id, "esp32-02");
}

#[tokio::test]
async fn fetch_latest_empty_array_is_ok() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let readings = client.fetch_latest().await.unwrap();
    assert!(readings.is_empty());
}

#[tokio::test]
async fn fetch_latest_ignores_server_computed_online() {
    let (server, client) = setup().await;

    let mut entry = reading("esp32-01", "Lab", "2026-03-01T12:00:00Z");
    entry["online"] = json!(false);

    Mock::given(method("GET"))
        .and(path("/api/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([entry])))
        .mount(&server)
        .await;

    let readings = client.fetch_latest().await.unwrap();
    assert_eq!(readings.len(), 1);
}

#[tokio::test]
async fn fetch_latest_non_2xx_is_an_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/latest"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = client.fetch_latest().await;

    match result {
        Err(Error::Status { status }) => {
            assert_eq!(status, 503);
        }
        other => panic!("expected Status error, got: {other:?}"),
    }
}

#[tokio::test]
async fn fetch_latest_malformed_body_yields_no_partial_data() {
    let (server, client) = setup().await;

    // Second element is missing required fields: the whole snapshot fails.
    let body = json!([
        reading("esp32-01", "Lab", "2026-03-01T12:00:00Z"),
        { "device_id": "esp32-02" },
    ]);

    Mock::given(method("GET"))
        .and(path("/api/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let result = client.fetch_latest().await;

    assert!(
        matches!(result, Err(Error::Deserialization { .. })),
        "expected Deserialization error, got: {result:?}"
    );
}

#[tokio::test]
async fn fetch_latest_connection_refused_is_transient() {
    // Point at a closed port
    let base = Url::parse("http://127.0.0.1:1/api").unwrap();
    let client = TelemetryClient::new(base, &TransportConfig::default()).unwrap();

    let err = client.fetch_latest().await.unwrap_err();
    assert!(err.is_transient(), "connection refusal should be transient: {err:?}");
}

// ── Health endpoint ─────────────────────────────────────────────────

#[tokio::test]
async fn health_online() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "online" })))
        .mount(&server)
        .await;

    assert!(client.check_health().await.unwrap());
}

#[tokio::test]
async fn health_reports_not_online() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "degraded" })))
        .mount(&server)
        .await;

    assert!(!client.check_health().await.unwrap());
}

#[tokio::test]
async fn health_non_2xx_is_an_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert!(client.check_health().await.is_err());
}
