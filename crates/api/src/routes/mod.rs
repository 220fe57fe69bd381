//! HTTP and WebSocket routes

pub mod health;
pub mod queue;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{state::AppState, websocket::ws_handler};

/// Create all routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let api_routes = Router::new().route("/queue", get(queue::get_queue));

    Router::new()
        .route("/ws", get(ws_handler))
        .merge(health_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LogFormat, StoreBackend};
    use crate::queue::{EngineSettings, QueueEngine};
    use crate::websocket::WebSocketState;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use ticketline_shared::{MemoryQueueStore, UserId};
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config {
            bind_address: "127.0.0.1:0".to_string(),
            store_backend: StoreBackend::Memory,
            database_url: None,
            database_max_connections: 1,
            serving_capacity: 2,
            reservation_grace: Duration::from_secs(600),
            log_format: LogFormat::Pretty,
        }
    }

    async fn test_state(store: MemoryQueueStore) -> AppState {
        let config = test_config();
        let ws_state = WebSocketState::new();
        let store = Arc::new(store);
        let (queue, _task) = QueueEngine::start(
            store.clone(),
            ws_state.clone(),
            EngineSettings::from(&config),
        )
        .await
        .unwrap();
        AppState::new(config, queue, ws_state, store)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_queue_endpoint_reports_snapshot() {
        let state = test_state(MemoryQueueStore::new()).await;
        for user in ["a", "b", "c"] {
            state.queue.reserve(UserId::from(user)).await.unwrap();
        }

        let (status, body) = get_json(create_router(state), "/api/queue").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"currentNumbers": [1, 2], "waiting": 1}));
    }

    #[tokio::test]
    async fn test_health_reports_store_status() {
        let store = MemoryQueueStore::new();
        let state = test_state(store.clone()).await;
        let app = create_router(state);

        let (status, body) = get_json(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["store"], "healthy");
        assert_eq!(body["active_connections"], 0);

        store.set_fail_writes(true);
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_probes() {
        let app = create_router(test_state(MemoryQueueStore::new()).await);

        for uri in ["/health/live", "/health/ready"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }
}
