//! Health and metrics endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::metrics::{MetricsSnapshot, ResourceUsage};
use crate::ocr::OcrProvider;
use crate::session::SessionView;
use crate::state::AppState;

/// Create the observability router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `healthy`, or `degraded` when temp files cannot be created
    pub status: &'static str,
    pub active_sessions: usize,
    pub total_requests: u64,
    pub total_errors: u64,
    pub version: &'static str,
    pub engine: &'static str,
    pub ocr_provider: OcrProvider,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let dispatcher = state.dispatcher();
    let snapshot = dispatcher.metrics().snapshot();

    let temp_dir = dispatcher.pipeline().temp_dir().to_path_buf();
    let writable = tokio::task::spawn_blocking(move || tempfile::tempfile_in(&temp_dir).is_ok())
        .await
        .unwrap_or(false);

    if !writable {
        tracing::warn!(
            temp_dir = %dispatcher.pipeline().temp_dir().display(),
            "Temp directory is not writable"
        );
    }

    Json(HealthResponse {
        status: if writable { "healthy" } else { "degraded" },
        active_sessions: dispatcher.registry().len(),
        total_requests: snapshot.total_requests,
        total_errors: snapshot.total_errors,
        version: env!("CARGO_PKG_VERSION"),
        engine: dispatcher.pipeline().engine_name(),
        ocr_provider: dispatcher.pipeline().ocr().provider_type(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub counters: MetricsSnapshot,
    pub open_sessions: Vec<SessionView>,
    pub process: ResourceUsage,
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let dispatcher = state.dispatcher();

    Json(MetricsResponse {
        counters: dispatcher.metrics().snapshot(),
        open_sessions: dispatcher.registry().snapshot(),
        process: state.sampler().sample(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::MockProvider;
    use crate::testing::test_state;
    use axum_test::TestServer;
    use serde_json::Value;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_health_reports_counters() {
        let temp = TempDir::new().unwrap();
        let state = test_state(temp.path(), MockProvider::new("x"));
        let (id, _rx) = state.dispatcher().connect();
        state
            .dispatcher()
            .handle_message(&id, r#"{"jsonrpc":"2.0","id":1,"method":"nope"}"#)
            .await
            .unwrap();

        let server = TestServer::new(router().with_state(state.clone())).unwrap();
        let body: Value = server.get("/health").await.json();

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["activeSessions"], 1);
        assert_eq!(body["totalRequests"], 1);
        assert_eq!(body["totalErrors"], 1);
        assert_eq!(body["engine"], "lopdf");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_health_degraded_without_temp_dir() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("gone");
        let state = test_state(&missing, MockProvider::new("x"));

        let server = TestServer::new(router().with_state(state)).unwrap();
        let body: Value = server.get("/health").await.json();

        assert_eq!(body["status"], "degraded");
    }

    #[tokio::test]
    async fn test_metrics_snapshot() {
        let temp = TempDir::new().unwrap();
        let state = test_state(temp.path(), MockProvider::new("x"));
        let (id, _rx) = state.dispatcher().connect();
        state
            .dispatcher()
            .handle_message(&id, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .await
            .unwrap();

        let server = TestServer::new(router().with_state(state.clone())).unwrap();
        let body: Value = server.get("/metrics").await.json();

        assert_eq!(body["totalRequests"], 1);
        assert_eq!(body["inFlight"], 0);
        assert_eq!(body["sessions"][id.to_string()]["requests"], 1);
        assert_eq!(body["openSessions"][0]["id"], id.to_string());
        assert_eq!(body["openSessions"][0]["state"], "connecting");
        assert_eq!(body["process"]["pid"], std::process::id());
    }
}
