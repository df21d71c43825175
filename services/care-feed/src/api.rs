use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::health::HealthChecker;
use crate::patient::PatientDetails;
use crate::runtime::CareFeeds;

pub struct ApiState {
    pub feeds: Arc<CareFeeds>,
    pub health: HealthChecker,
    pub metrics_enabled: bool,
}

pub type SharedState = Arc<ApiState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/appointments", get(handle_appointments))
        .route("/appointments/:id", get(handle_patient))
        .route("/notifications", get(handle_notifications))
        .route("/notifications/:id/read", post(handle_mark_read))
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn start_server(
    state: SharedState,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn handle_appointments(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.feeds.appointments.view())
}

async fn handle_patient(State(state): State<SharedState>, Path(id): Path<i64>) -> Response {
    match PatientDetails::lookup(&state.feeds.appointments, id) {
        Some(details) => (StatusCode::OK, Json(details)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("appointment {} not found", id) })),
        )
            .into_response(),
    }
}

async fn handle_notifications(State(state): State<SharedState>) -> impl IntoResponse {
    let view = state.feeds.notifications.view();
    let unread = view.records.iter().filter(|n| !n.read).count();
    Json(json!({
        "records": view.records,
        "loading": view.loading,
        "unread": unread,
    }))
}

async fn handle_mark_read(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    match state.feeds.notifications.mark_read(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

async fn handle_health(State(state): State<SharedState>) -> Response {
    let backend = state.health.check_backend().await;
    let status = if backend.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = Json(json!({
        "status": if backend.healthy { "healthy" } else { "degraded" },
        "service": "care-feed",
        "demo": state.feeds.is_demo(),
        "backend": backend,
        "timestamp": chrono::Utc::now(),
    }));
    (status, body).into_response()
}

async fn handle_stats(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.feeds.stats())
}

async fn handle_metrics(State(state): State<SharedState>) -> Response {
    if !state.metrics_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CareFeedConfig;
    use crate::notice::RecordingNoticeSink;

    async fn demo_state() -> SharedState {
        let feeds = CareFeeds::start(&CareFeedConfig::default(), true, Arc::new(RecordingNoticeSink::new()))
            .await
            .unwrap();
        feeds.appointments.wait_until_loaded().await;
        feeds.notifications.wait_until_loaded().await;
        let feeds = Arc::new(feeds);
        Arc::new(ApiState {
            health: HealthChecker::new(feeds.service()),
            feeds,
            metrics_enabled: true,
        })
    }

    #[tokio::test]
    async fn test_patient_lookup_status() {
        let state = demo_state().await;

        let found = handle_patient(State(state.clone()), Path(1)).await;
        assert_eq!(found.status(), StatusCode::OK);

        let missing = handle_patient(State(state), Path(404)).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mark_read_status() {
        let state = demo_state().await;
        let unread = state
            .feeds
            .notifications
            .view()
            .records
            .into_iter()
            .find(|n| !n.read)
            .unwrap();

        let ok = handle_mark_read(State(state.clone()), Path(unread.id.clone())).await;
        assert_eq!(ok.status(), StatusCode::NO_CONTENT);
        assert!(state.feeds.notifications.get(&unread.id).unwrap().read);

        let missing = handle_mark_read(State(state), Path("missing".to_string())).await;
        assert_eq!(missing.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let state = demo_state().await;
        assert_eq!(handle_health(State(state.clone())).await.status(), StatusCode::OK);
        assert_eq!(handle_metrics(State(state)).await.status(), StatusCode::OK);
    }
}
