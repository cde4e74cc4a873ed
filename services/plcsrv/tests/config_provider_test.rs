//! Configuration provider integration tests
//!
//! Runs the provider against a stub registry served by axum on an ephemeral
//! port: identity-precedence lookup, point-list assembly, cache refresh and
//! cache fallback.

use std::collections::HashMap;
use std::path::PathBuf;

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use plcsrv::core::config::provider::{ConfigProvider, ConfigSource};
use plcsrv::core::identity::DeviceIdentity;
use plcsrv::{AgentError, AgentSettings, Manufacturer, PlcDataType};

const KNOWN_SERIAL: &str = "10000000abcdef12";
const KNOWN_MAC: &str = "b8:27:eb:12:34:56";

fn identity() -> DeviceIdentity {
    DeviceIdentity {
        hardware_serial: KNOWN_SERIAL.to_string(),
        mac_address: KNOWN_MAC.to_string(),
        ip_address: "192.168.1.23".to_string(),
        hostname: "edge-01".to_string(),
    }
}

fn equipment_record() -> Value {
    json!({
        "equipment_id": "EQ-7",
        "manufacturer": "keyence",
        "series": "KV-8000 (Modbus)",
        "ip": "192.168.1.23",
        "plc_ip": "192.168.0.42",
        "port": 5000,
        "modbus_port": 1502,
        "interval": 2000,
        "status": "ok",
        "hostname": "edge-01",
        "mac_address": KNOWN_MAC,
    })
}

/// Stub registry: matches either on serial or (configurably) only on MAC.
fn registry(match_on: &'static str) -> Router {
    let search = move |Query(params): Query<HashMap<String, String>>| async move {
        let matched = match match_on {
            "serial" => params.get("cpu_serial_number").map(String::as_str) == Some(KNOWN_SERIAL),
            "mac" => params.get("mac_address").map(String::as_str) == Some(KNOWN_MAC),
            _ => false,
        };
        if matched {
            Ok(Json(equipment_record()))
        } else {
            Err(StatusCode::NOT_FOUND)
        }
    };

    let configs = |Path(equipment_id): Path<String>| async move {
        assert_eq!(equipment_id, "EQ-7");
        Json(json!([
            {
                "data_type": "temperature",
                "enabled": true,
                "address": "DM101",
                "scale_factor": 10,
                "plc_data_type": "word"
            },
            {
                "data_type": "flag",
                "enabled": true,
                "address": "R10.3",
                "scale_factor": 0,
                "plc_data_type": "bit"
            },
            {
                "data_type": "error_code",
                "enabled": false,
                "address": "DM300",
                "scale_factor": 1,
                "plc_data_type": "word"
            }
        ]))
    };

    Router::new()
        .route("/api/equipment/search", get(search))
        .route("/api/equipment/{id}/plc_configs", get(configs))
}

async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn settings(base_url: String, cache_path: PathBuf) -> AgentSettings {
    AgentSettings {
        config_source_url: base_url,
        cache_path,
        ..AgentSettings::default()
    }
}

#[tokio::test]
async fn test_fetch_assembles_configuration() {
    let base = spawn_server(registry("serial")).await;
    let dir = tempfile::tempdir().unwrap();
    let provider =
        ConfigProvider::new(&settings(base, dir.path().join("cache.json"))).unwrap();

    let config = provider.fetch(&identity()).await.unwrap();

    assert_eq!(config.equipment_id, "EQ-7");
    assert_eq!(config.manufacturer, Manufacturer::Keyence);
    assert_eq!(config.transport_host, "192.168.0.42");
    // Keyence takes its port from modbus_port, not the MC port
    assert_eq!(config.transport_port, 1502);
    assert_eq!(config.interval_ms, 2000);
    assert_eq!(config.data_points.len(), 3);

    let temp = &config.data_points["temperature"];
    assert_eq!(temp.address, "DM101");
    assert_eq!(temp.scale_factor, 10);
    assert_eq!(temp.plc_data_type, PlcDataType::Word);
    assert!(temp.enabled);

    // scale_factor 0 in the registry is normalized to 1
    assert_eq!(config.data_points["flag"].scale_factor, 1);
    assert!(!config.data_points["error_code"].enabled);
}

#[tokio::test]
async fn test_lookup_falls_through_precedence_chain() {
    // Registry only knows the MAC; the serial lookup 404s first
    let base = spawn_server(registry("mac")).await;
    let dir = tempfile::tempdir().unwrap();
    let provider =
        ConfigProvider::new(&settings(base, dir.path().join("cache.json"))).unwrap();

    let config = provider.fetch(&identity()).await.unwrap();
    assert_eq!(config.equipment_id, "EQ-7");
}

#[tokio::test]
async fn test_cache_covers_registry_outage() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache.json");

    // First fetch populates the cache
    let base = spawn_server(registry("serial")).await;
    let provider = ConfigProvider::new(&settings(base, cache.clone())).unwrap();
    provider.fetch(&identity()).await.unwrap();
    assert!(cache.exists());

    // New provider pointing at a dead registry serves the cached copy
    let dead = settings("http://127.0.0.1:1".to_string(), cache);
    let provider = ConfigProvider::new(&dead).unwrap();
    let config = provider.fetch(&identity()).await.unwrap();
    assert_eq!(config.equipment_id, "EQ-7");
    assert_eq!(config.data_points.len(), 3);
}

#[tokio::test]
async fn test_sentinel_serial_matches_a_registered_record() {
    // A device without a CPU serial reports the fixed sentinel; a registry
    // record keyed to that sentinel must still be found
    let sentinel = plcsrv::core::identity::FALLBACK_SERIAL;
    let search = move |Query(params): Query<HashMap<String, String>>| async move {
        if params.get("cpu_serial_number").map(String::as_str) == Some(sentinel) {
            Ok(Json(equipment_record()))
        } else {
            Err(StatusCode::NOT_FOUND)
        }
    };
    let configs = |Path(_id): Path<String>| async move { Json(json!([])) };
    let router = Router::new()
        .route("/api/equipment/search", get(search))
        .route("/api/equipment/{id}/plc_configs", get(configs));

    let base = spawn_server(router).await;
    let dir = tempfile::tempdir().unwrap();
    let provider =
        ConfigProvider::new(&settings(base, dir.path().join("cache.json"))).unwrap();

    let id = DeviceIdentity {
        hardware_serial: sentinel.to_string(),
        ..identity()
    };
    let config = provider.fetch(&id).await.unwrap();
    assert_eq!(config.equipment_id, "EQ-7");
    // Empty registry point list falls back to the canonical default set
    assert_eq!(config.data_points.len(), 6);
}

#[tokio::test]
async fn test_no_registry_and_no_cache_is_config_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let dead = settings(
        "http://127.0.0.1:1".to_string(),
        dir.path().join("cache.json"),
    );
    let provider = ConfigProvider::new(&dead).unwrap();

    let err = provider.fetch(&identity()).await.unwrap_err();
    assert!(matches!(err, AgentError::ConfigUnavailable(_)));
}

#[tokio::test]
async fn test_unmatched_identity_without_cache_is_config_unavailable() {
    // Registry is up but knows nothing about this device
    let base = spawn_server(registry("nothing")).await;
    let dir = tempfile::tempdir().unwrap();
    let provider =
        ConfigProvider::new(&settings(base, dir.path().join("cache.json"))).unwrap();

    let err = provider.fetch(&identity()).await.unwrap_err();
    assert!(matches!(err, AgentError::ConfigUnavailable(_)));
}
