//! Webhook gateway
//!
//! Turns one inbound request into a [`ResponseDirective`]. Verification
//! failures are rejected so the platform redelivers. Everything after a
//! successful verification is acknowledged, whatever the handlers do.

use crate::events::{VerifiedEvent, WebhookRequest};
use crate::router::{EventFilter, EventHandler, EventRouter, RouterResult};
use crate::signature::WebhookVerifier;
use appgate_auth::PlatformClient;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_WEBHOOK_PATH: &str = "/api/github/webhooks";

/// Largest payload the platform sends for a single delivery
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Why a delivery was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    BadSignature,
    MissingEventHeader,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadSignature => "bad signature",
            Self::MissingEventHeader => "missing event header",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadSignature => StatusCode::UNAUTHORIZED,
            Self::MissingEventHeader => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the transport should answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDirective {
    Ok,
    Rejected(RejectReason),
    NotFound,
}

impl ResponseDirective {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Ok => StatusCode::OK,
            Self::Rejected(reason) => reason.status_code(),
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ResponseDirective {
    fn into_response(self) -> Response {
        let body = match self {
            Self::Ok => "ok",
            Self::Rejected(reason) => reason.as_str(),
            Self::NotFound => "not found",
        };
        (self.status_code(), body).into_response()
    }
}

/// How verified events reach the handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Handlers finish before the delivery is acknowledged
    #[default]
    Inline,
    /// Dispatch is spawned and the delivery acknowledged immediately
    Detached,
}

/// Verification, parsing and dispatch for one webhook path
pub struct Gateway {
    path: String,
    dispatch_mode: DispatchMode,
    max_body_bytes: usize,
    verifier: WebhookVerifier,
    router: Arc<EventRouter>,
    platform: Option<Arc<PlatformClient>>,
}

impl Gateway {
    pub fn builder(verifier: WebhookVerifier) -> GatewayBuilder {
        GatewayBuilder {
            path: DEFAULT_WEBHOOK_PATH.to_string(),
            dispatch_mode: DispatchMode::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            verifier,
            router: EventRouter::new(),
            platform: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.dispatch_mode
    }

    /// Request body limit applied by [`webhook_router`]
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Platform client owning the installation token cache, if configured
    pub fn platform(&self) -> Option<&Arc<PlatformClient>> {
        self.platform.as_ref()
    }

    /// Handle one request
    pub async fn handle(&self, request: WebhookRequest) -> ResponseDirective {
        if request.path != self.path {
            debug!(path = %request.path, "Request outside webhook path");
            return ResponseDirective::NotFound;
        }

        if request.method != Method::POST {
            return ResponseDirective::Ok;
        }

        let delivery_id = request.delivery_id().map(str::to_string);

        if let Err(e) = self.verifier.verify_headers(&request.body, &request.headers) {
            warn!(
                delivery_id = delivery_id.as_deref().unwrap_or("-"),
                error = %e,
                "Webhook signature verification failed"
            );
            return ResponseDirective::Rejected(RejectReason::BadSignature);
        }

        let Some(event_type) = request.event_type() else {
            warn!(
                delivery_id = delivery_id.as_deref().unwrap_or("-"),
                "Webhook delivery has no event header"
            );
            return ResponseDirective::Rejected(RejectReason::MissingEventHeader);
        };

        let event = match VerifiedEvent::from_verified_body(
            event_type,
            delivery_id.as_deref(),
            &request.body,
        ) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    delivery_id = delivery_id.as_deref().unwrap_or("-"),
                    event = %event_type,
                    error = %e,
                    "Dropping unparseable webhook payload"
                );
                return ResponseDirective::Ok;
            }
        };

        info!(
            delivery_id = delivery_id.as_deref().unwrap_or("-"),
            event = %event.key(),
            installation_id = event.installation_id,
            "Received webhook"
        );

        match self.dispatch_mode {
            DispatchMode::Inline => {
                let result = self.router.dispatch(&event).await;
                log_result(&result);
            }
            DispatchMode::Detached => {
                let router = self.router.clone();
                tokio::spawn(async move {
                    let result = router.dispatch(&event).await;
                    log_result(&result);
                });
            }
        }

        ResponseDirective::Ok
    }
}

fn log_result(result: &RouterResult) {
    let delivery_id = result.delivery_id.as_deref().unwrap_or("-");
    for failure in &result.failures {
        error!(
            delivery_id,
            event = %result.event_type,
            handler = %failure.handler,
            error = %failure.error,
            "Webhook handler failed"
        );
    }
    debug!(
        delivery_id,
        event = %result.event_type,
        invoked = result.invoked,
        failed = result.failures.len(),
        "Webhook dispatched"
    );
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("path", &self.path)
            .field("dispatch_mode", &self.dispatch_mode)
            .field("verifier", &self.verifier)
            .field("router", &self.router)
            .field("platform", &self.platform.is_some())
            .finish()
    }
}

/// Builder for [`Gateway`]
pub struct GatewayBuilder {
    path: String,
    dispatch_mode: DispatchMode,
    max_body_bytes: usize,
    verifier: WebhookVerifier,
    router: EventRouter,
    platform: Option<Arc<PlatformClient>>,
}

impl GatewayBuilder {
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn platform(mut self, platform: Arc<PlatformClient>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Register a handler; see [`EventRouter::on`]
    pub fn on(mut self, filter: impl Into<EventFilter>, handler: Arc<dyn EventHandler>) -> Self {
        self.router.on(filter, handler);
        self
    }

    /// Replace the handler table
    pub fn router(mut self, router: EventRouter) -> Self {
        self.router = router;
        self
    }

    pub fn build(self) -> Gateway {
        Gateway {
            path: self.path,
            dispatch_mode: self.dispatch_mode,
            max_body_bytes: self.max_body_bytes,
            verifier: self.verifier,
            router: Arc::new(self.router),
            platform: self.platform,
        }
    }
}

/// Serve the gateway as the fallback of an axum router
///
/// The body limit replaces axum's 2 MB default with the gateway's own.
pub fn webhook_router(gateway: Arc<Gateway>) -> Router {
    let limit = gateway.max_body_bytes();
    Router::new()
        .fallback(handle_webhook)
        .layer(DefaultBodyLimit::max(limit))
        .with_state(gateway)
}

async fn handle_webhook(
    State(gateway): State<Arc<Gateway>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ResponseDirective {
    let request = WebhookRequest::new(method, uri.path(), headers, body);
    gateway.handle(request).await
}
