//! Authentication error types

use std::time::Duration;
use thiserror::Error;

/// Result type alias for token operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Private key material problems.
///
/// Raised at startup when the minter is constructed; a key that goes bad
/// later is reported per request as [`AuthError::Key`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// A required identity field was empty
    #[error("Missing {0}")]
    Missing(&'static str),

    /// The PEM could not be parsed as an RSA private key
    #[error("Invalid private key: {0}")]
    InvalidPem(String),

    /// Key file could not be read
    #[error("Unreadable private key at {path}: {message}")]
    Unreadable { path: String, message: String },

    /// Signing the assertion failed
    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Installation token acquisition errors.
///
/// `Clone` so a single refresh outcome can be handed to every caller that
/// waited on it.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    /// The token endpoint answered with a non-success status
    #[error("Token exchange for installation {installation_id} rejected ({status}): {message}")]
    Rejected {
        installation_id: u64,
        status: u16,
        message: String,
    },

    /// Transport failure talking to the token endpoint
    #[error("Network error during token exchange: {0}")]
    Network(String),

    /// The exchange did not finish within the configured bound
    #[error("Token exchange timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint answered 2xx with a body we could not use
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Key material failed at mint time
    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    /// The shared refresh task ended without producing a result
    #[error("Token refresh aborted: {0}")]
    RefreshAborted(String),
}

impl AuthError {
    /// Whether retrying the same request later can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AuthError::Rejected { status, .. } => *status == 429 || *status >= 500,
            AuthError::Network(_) | AuthError::Timeout(_) | AuthError::RefreshAborted(_) => true,
            AuthError::InvalidResponse(_) | AuthError::Key(_) => false,
        }
    }

    /// Get error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Rejected { .. } => "TOKEN_REJECTED",
            AuthError::Network(_) => "NETWORK_ERROR",
            AuthError::Timeout(_) => "TOKEN_EXCHANGE_TIMEOUT",
            AuthError::InvalidResponse(_) => "INVALID_TOKEN_RESPONSE",
            AuthError::Key(_) => "KEY_ERROR",
            AuthError::RefreshAborted(_) => "REFRESH_ABORTED",
        }
    }
}

/// Errors from installation-scoped REST calls
#[derive(Error, Debug)]
pub enum PlatformError {
    /// No usable installation token
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The platform API answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
