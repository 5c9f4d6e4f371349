//! Application identity: app id plus signing key material

use crate::error::KeyError;
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;

/// The app's own identity, loaded once at startup.
#[derive(Clone)]
pub struct AppIdentity {
    app_id: String,
    private_key: SecretString,
}

impl std::fmt::Debug for AppIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppIdentity")
            .field("app_id", &self.app_id)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

impl AppIdentity {
    /// Build an identity from an app id and an inline PEM
    pub fn from_pem(app_id: impl Into<String>, pem: impl Into<String>) -> Result<Self, KeyError> {
        let app_id = app_id.into();
        if app_id.trim().is_empty() {
            return Err(KeyError::Missing("app id"));
        }

        let pem = pem.into();
        if pem.trim().is_empty() {
            return Err(KeyError::Missing("private key"));
        }

        Ok(Self {
            app_id,
            private_key: SecretString::new(pem),
        })
    }

    /// Build an identity from an app id and a PEM file on disk
    pub fn from_file(app_id: impl Into<String>, path: &Path) -> Result<Self, KeyError> {
        let pem = std::fs::read_to_string(path).map_err(|e| KeyError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_pem(app_id, pem)
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub(crate) fn private_key_pem(&self) -> &str {
        self.private_key.expose_secret()
    }
}
