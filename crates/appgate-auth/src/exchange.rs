//! Assertion-for-token exchange against the platform's token endpoint

use crate::error::{AuthError, Result};
use crate::minter::SignedAssertion;
use crate::token_cache::InstallationToken;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
pub const API_VERSION: &str = "2022-11-28";

/// Exchanges an app assertion for an installation-scoped token
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(
        &self,
        assertion: &SignedAssertion,
        installation_id: u64,
    ) -> Result<InstallationToken>;
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Token exchanger for the GitHub REST API
#[derive(Debug, Clone)]
pub struct GitHubTokenExchanger {
    http: Client,
    api_base_url: String,
    timeout: Duration,
}

impl GitHubTokenExchanger {
    pub fn new(api_base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            header::HeaderValue::from_static(API_VERSION),
        );

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(format!("appgate/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn endpoint(&self, installation_id: u64) -> String {
        format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base_url, installation_id
        )
    }

    fn map_transport_error(&self, error: reqwest::Error) -> AuthError {
        if error.is_timeout() {
            AuthError::Timeout(self.timeout)
        } else {
            AuthError::Network(error.to_string())
        }
    }
}

#[async_trait]
impl TokenExchanger for GitHubTokenExchanger {
    #[instrument(skip(self, assertion))]
    async fn exchange(
        &self,
        assertion: &SignedAssertion,
        installation_id: u64,
    ) -> Result<InstallationToken> {
        let response = self
            .http
            .post(self.endpoint(installation_id))
            .bearer_auth(assertion.token())
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read token response body".to_string());
            return Err(AuthError::Rejected {
                installation_id,
                status: status.as_u16(),
                message,
            });
        }

        let body: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        debug!(installation_id, expires_at = %body.expires_at, "Exchanged assertion for installation token");

        Ok(InstallationToken::new(
            installation_id,
            body.token,
            body.expires_at,
        ))
    }
}
