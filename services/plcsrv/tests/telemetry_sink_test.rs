//! Telemetry sink integration tests
//!
//! Verifies the wire shape of the reading POST against a capturing stub and
//! the `SinkUnavailable` classification of delivery failures.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use serde_json::Value;

use plcsrv::core::sink::{ReadingSink, TelemetrySink};
use plcsrv::{AgentError, Reading};

type Captured = Arc<Mutex<Vec<Value>>>;

async fn spawn_sink_server(status: StatusCode) -> (String, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let state = Arc::clone(&captured);

    let router = Router::new()
        .route(
            "/api/logs",
            post(
                move |State(captured): State<Captured>, Json(body): Json<Value>| async move {
                    captured.lock().unwrap().push(body);
                    status
                },
            ),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{}/api/logs", addr), captured)
}

fn reading() -> Reading {
    let mut reading = Reading::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
    reading.insert("current", 3.2);
    reading.insert("temperature", 25.5);
    reading
}

#[tokio::test]
async fn test_post_body_is_flat_json() {
    let (url, captured) = spawn_sink_server(StatusCode::OK).await;
    let sink = TelemetrySink::new(url).unwrap();

    sink.send("EQ-1", &reading()).await.unwrap();

    let bodies = captured.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["equipment_id"], "EQ-1");
    assert_eq!(body["timestamp"], "2025-06-01T12:00:00.000Z");
    assert_eq!(body["current"], 3.2);
    assert_eq!(body["temperature"], 25.5);
    // Keys without a value this cycle are absent, not null or zero
    assert!(body.get("pressure").is_none());
}

#[tokio::test]
async fn test_http_error_is_sink_unavailable() {
    let (url, _captured) = spawn_sink_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    let sink = TelemetrySink::new(url).unwrap();

    let err = sink.send("EQ-1", &reading()).await.unwrap_err();
    assert!(matches!(err, AgentError::SinkUnavailable(_)));
}

#[tokio::test]
async fn test_unreachable_sink_is_sink_unavailable() {
    let sink = TelemetrySink::new("http://127.0.0.1:1/api/logs").unwrap();
    let err = sink.send("EQ-1", &reading()).await.unwrap_err();
    assert!(matches!(err, AgentError::SinkUnavailable(_)));
}
