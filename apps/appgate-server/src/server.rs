//! HTTP Server implementation

use anyhow::{Context, Result};
use appgate_core::ServerConfig;
use appgate_webhook::{webhook_router, Gateway};
use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct Server {
    config: ServerConfig,
    gateway: Arc<Gateway>,
}

impl Server {
    pub fn new(config: ServerConfig, gateway: Arc<Gateway>) -> Self {
        Self { config, gateway }
    }

    pub async fn run(self) -> Result<()> {
        let addr = self.config.address();
        let app = build_http_router(self.gateway);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {addr}"))?;

        info!("HTTP server listening on {}", addr);

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        Ok(())
    }
}

/// Service routes first; every other path goes to the webhook gateway
pub fn build_http_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(webhook_router(gateway))
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

// Route handlers

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": "appgate",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use appgate_webhook::{sign, SignatureAlgorithm, WebhookVerifier};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn create_router() -> Router {
        let gateway = Gateway::builder(WebhookVerifier::new("development").unwrap()).build();
        build_http_router(Arc::new(gateway))
    }

    #[tokio::test]
    async fn test_root_handler() {
        let response = root().await;
        assert_eq!(response.0["service"], "appgate");
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = create_router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_route_is_mounted() {
        let body = r#"{"zen":"Keep it logically awesome."}"#;
        let request = Request::builder()
            .method("POST")
            .uri("/api/github/webhooks")
            .header("x-github-event", "ping")
            .header(
                "x-hub-signature-256",
                sign(body.as_bytes(), b"development", SignatureAlgorithm::HmacSha256),
            )
            .body(Body::from(body))
            .unwrap();

        let response = create_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unsigned_delivery_is_unauthorized() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/github/webhooks")
            .header("x-github-event", "ping")
            .body(Body::from("{}"))
            .unwrap();

        let response = create_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
