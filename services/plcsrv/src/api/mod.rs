//! Health/stats API
//!
//! Two read-only routes for external health checks: `/health` for liveness
//! probes and `/stats` for the full failure-statistics snapshot. The agent
//! is observed only through this surface; it takes no commands over HTTP.

use std::sync::{Arc, RwLock};

use axum::{extract::State, routing::get, Json, Router};
use errors::AgentResult;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::identity::DeviceIdentity;
use crate::core::scheduler::StateCell;
use crate::core::stats::FailureTracker;

#[derive(Clone)]
pub struct ApiState {
    pub identity: DeviceIdentity,
    pub stats: Arc<FailureTracker>,
    pub state: Arc<StateCell>,
    pub equipment_id: Arc<RwLock<Option<String>>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .with_state(state)
}

/// Serve until the cancellation token fires.
pub async fn serve(bind: &str, state: ApiState, token: CancellationToken) -> AgentResult<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Health API listening on {}", bind);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    Ok(())
}

async fn health(State(state): State<ApiState>) -> Json<Value> {
    let snapshot = state.stats.snapshot();
    Json(json!({
        "status": "ok",
        "state": state.state.get(),
        "consecutive_failures": snapshot.consecutive_failures,
        "last_success": snapshot.last_success,
    }))
}

async fn stats(State(state): State<ApiState>) -> Json<Value> {
    let equipment_id = state
        .equipment_id
        .read()
        .ok()
        .and_then(|slot| slot.clone());
    Json(json!({
        "identity": state.identity,
        "equipment_id": equipment_id,
        "state": state.state.get(),
        "statistics": state.stats.snapshot(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_state() -> ApiState {
        ApiState {
            identity: DeviceIdentity {
                hardware_serial: "serial-1".to_string(),
                mac_address: "aa:bb:cc:dd:ee:ff".to_string(),
                ip_address: "192.168.1.50".to_string(),
                hostname: "edge-test".to_string(),
            },
            stats: Arc::new(FailureTracker::new()),
            state: Arc::new(StateCell::default()),
            equipment_id: Arc::new(RwLock::new(Some("EQ-9".to_string()))),
        }
    }

    #[tokio::test]
    async fn test_health_reports_statistics() {
        let state = api_state();
        state.stats.record_connection_failure();

        let Json(body) = health(State(state)).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["consecutive_failures"], 1);
        assert_eq!(body["state"], "idle");
        assert!(body["last_success"].is_null());
    }

    #[tokio::test]
    async fn test_stats_includes_identity_and_equipment() {
        let Json(body) = stats(State(api_state())).await;
        assert_eq!(body["identity"]["hardware_serial"], "serial-1");
        assert_eq!(body["equipment_id"], "EQ-9");
        assert_eq!(body["statistics"]["read_errors"], 0);
    }
}
