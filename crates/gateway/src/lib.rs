//! HTTP API gateway for mnemo.
//!
//! Exposes the AI chat API (session management and the SSE chat endpoint)
//! under `/api/v1/ai`, plus an unauthenticated health check.
//!
//! Built on Axum for high performance async HTTP.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use mnemo_agent::ChatService;
use mnemo_config::AppConfig;

/// Build the full router.
///
/// Layers applied:
/// - Bearer token authentication on all `/api/v1/ai` routes
/// - CORS restricted to the local web UI
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(api_state: api_v1::SharedApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(HeaderValue::from_static(
            "http://localhost:8080",
        )))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1/ai", api_v1::ai_router(api_state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server and serve until the process exits.
pub async fn start(config: &AppConfig, chat: Arc<ChatService>) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    if config.gateway.users.is_empty() {
        warn!("No [[gateway.users]] configured; every API request will be rejected");
    }
    if !chat.is_configured() {
        warn!("No API key configured; chat requests will answer 503");
    }

    let api_state = Arc::new(api_v1::ApiState::new(chat, &config.gateway.users));
    let app = build_router(api_state);

    info!(addr = %addr, users = config.gateway.users.len(), "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use mnemo_config::AgentConfig;
    use mnemo_store::InMemoryStore;
    use tower::ServiceExt;

    fn test_state() -> api_v1::SharedApiState {
        let store = InMemoryStore::new();
        let chat = ChatService::new(
            Arc::new(store.clone()),
            Arc::new(store),
            "mock-model",
            AgentConfig::default(),
        );
        Arc::new(api_v1::ApiState::new(Arc::new(chat), &[]))
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state());

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_is_nested_and_authenticated() {
        let app = build_router(test_state());

        let req = Request::builder()
            .uri("/api/v1/ai/sessions")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
