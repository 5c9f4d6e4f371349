//! App assertion minting
//!
//! Produces the short-lived RS256 JWT that identifies the app itself (not an
//! installation). The platform only accepts these for token exchange and
//! refuses any whose lifetime exceeds ten minutes.

use crate::error::KeyError;
use crate::identity::AppIdentity;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Longest assertion lifetime the platform accepts, in seconds
pub const MAX_ASSERTION_TTL_SECS: i64 = 600;

/// App assertion claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer (app id)
    pub iss: String,
}

/// A signed, time-bounded app assertion
#[derive(Debug, Clone)]
pub struct SignedAssertion {
    token: SecretString,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SignedAssertion {
    /// The encoded JWT, for use as a bearer credential
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.issued_at && now < self.expires_at
    }
}

/// Signs app assertions with the app's private key
pub struct CredentialMinter {
    app_id: String,
    encoding_key: EncodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for CredentialMinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialMinter")
            .field("app_id", &self.app_id)
            .field("encoding_key", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CredentialMinter {
    /// Create a minter issuing assertions with the maximum lifetime.
    ///
    /// The key is parsed here so malformed material fails at startup rather
    /// than on the first token request.
    pub fn new(identity: &AppIdentity) -> Result<Self, KeyError> {
        Self::with_ttl(identity, std::time::Duration::from_secs(600))
    }

    /// Create a minter with a custom lifetime, capped at [`MAX_ASSERTION_TTL_SECS`]
    pub fn with_ttl(identity: &AppIdentity, ttl: std::time::Duration) -> Result<Self, KeyError> {
        let encoding_key = EncodingKey::from_rsa_pem(identity.private_key_pem().as_bytes())
            .map_err(|e| KeyError::InvalidPem(e.to_string()))?;

        let max = Duration::seconds(MAX_ASSERTION_TTL_SECS);
        let ttl = Duration::from_std(ttl).unwrap_or(max).min(max);

        Ok(Self {
            app_id: identity.app_id().to_string(),
            encoding_key,
            ttl,
        })
    }

    /// Mint a fresh assertion valid from `now` for the configured lifetime
    pub fn mint(&self, now: DateTime<Utc>) -> Result<SignedAssertion, KeyError> {
        let expires_at = now + self.ttl;

        let claims = AssertionClaims {
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.app_id.clone(),
        };

        let token = encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| KeyError::Signing(e.to_string()))?;

        Ok(SignedAssertion {
            token: SecretString::new(token),
            issued_at: now,
            expires_at,
        })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
