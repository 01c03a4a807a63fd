//! HTTP surface: health, metrics and the signaling WebSocket

use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use huddle_core::config::ServerConfig;
use huddle_sfu::SessionCoordinator;

use crate::websocket;

/// Shared state of every HTTP handler
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SessionCoordinator>,
    pub server: Arc<ServerConfig>,
}

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.server.allowed_origins);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route(&state.server.ws_path, get(websocket::websocket_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "peers": state.coordinator.peer_count(),
        "rooms": state.coordinator.room_count(),
    }))
}

async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        huddle_core::metrics::gather(),
    )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|e| warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin"))
                .ok()
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use huddle_sfu::{EngineConfig, LocalMediaEngine, SfuConfig};
    use tower::ServiceExt;

    fn router() -> Router {
        let engine = Arc::new(LocalMediaEngine::new(EngineConfig::default()));
        create_router(AppState {
            coordinator: Arc::new(SessionCoordinator::new(engine, SfuConfig::default())),
            server: Arc::new(ServerConfig::default()),
        })
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"status": "ok", "peers": 0, "rooms": 0}));
    }

    #[tokio::test]
    async fn test_metrics_are_exposed() {
        huddle_core::metrics::SIGNALING_MESSAGES
            .with_label_values(&["joinRoom"])
            .inc();
        let response = router()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("huddle_signaling_messages_total"));
    }

    #[tokio::test]
    async fn test_signaling_path_requires_upgrade() {
        let response = router()
            .oneshot(Request::get("/mediasoup").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
