//! Webhook gateway for appgate
//!
//! This crate turns raw webhook deliveries into dispatched events:
//! - Signature verification (HMAC-SHA256, legacy HMAC-SHA1)
//! - Payload parsing into [`VerifiedEvent`]s
//! - Ordered, failure-isolated dispatch to registered handlers
//! - The [`Gateway`] request contract and its axum adapter
//!
//! # Example
//!
//! ```rust,ignore
//! use appgate_webhook::{Gateway, WebhookVerifier, webhook_router};
//! use std::sync::Arc;
//!
//! let verifier = WebhookVerifier::new("development")?;
//! let gateway = Gateway::builder(verifier)
//!     .path("/api/github/webhooks")
//!     .on("issues.opened", Arc::new(IssueGreeter::new(platform.clone())))
//!     .build();
//!
//! let app = webhook_router(Arc::new(gateway));
//! ```

// Module order matters due to dependencies
pub mod signature;
pub mod events;
pub mod router;
pub mod gateway;

pub use signature::*;
pub use events::*;
pub use router::*;
pub use gateway::*;

use appgate_auth::{AuthError, PlatformError};
use thiserror::Error;

/// Webhook errors
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Signature verification failed: {0}")]
    Verification(String),

    #[error("Invalid payload: {0}")]
    Parse(String),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Platform call failed: {0}")]
    Platform(#[from] PlatformError),

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, WebhookError>;
