//! Installation-authenticated platform client
//!
//! [`PlatformClient`] is the factory handlers use to act as an installation.
//! Every call fetches its bearer token through the shared
//! [`InstallationTokenCache`], so handlers never see token lifecycles.

use crate::error::{AuthError, PlatformError};
use crate::exchange::API_VERSION;
use crate::token_cache::InstallationTokenCache;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// A comment created on an issue or pull request
#[derive(Debug, Clone, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub body: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest<'a> {
    body: &'a str,
}

/// Factory for installation-scoped API clients
#[derive(Debug, Clone)]
pub struct PlatformClient {
    http: Client,
    api_base_url: String,
    tokens: Arc<InstallationTokenCache>,
}

impl PlatformClient {
    pub fn new(
        tokens: Arc<InstallationTokenCache>,
        api_base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
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
            .build()?;

        Ok(Self {
            http,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// A client acting as the given installation
    pub fn installation(&self, installation_id: u64) -> InstallationClient {
        InstallationClient {
            platform: self.clone(),
            installation_id,
        }
    }

    pub fn token_cache(&self) -> &Arc<InstallationTokenCache> {
        &self.tokens
    }
}

/// API client bound to one installation
#[derive(Debug, Clone)]
pub struct InstallationClient {
    platform: PlatformClient,
    installation_id: u64,
}

impl InstallationClient {
    pub fn installation_id(&self) -> u64 {
        self.installation_id
    }

    /// Post a comment on an issue or pull request
    #[instrument(skip(self, body), fields(installation_id = self.installation_id))]
    pub async fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<IssueComment, PlatformError> {
        let token = self.platform.tokens.get_token(self.installation_id).await?;
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.platform.api_base_url, owner, repo, issue_number
        );

        let response = self
            .platform
            .http
            .post(url)
            .bearer_auth(token.token())
            .json(&CreateCommentRequest { body })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!(
                installation_id = self.installation_id,
                "Installation token refused by API; dropping cached token"
            );
            self.platform
                .tokens
                .invalidate_token(self.installation_id, token.token());
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PlatformError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let comment: IssueComment = response.json().await?;
        debug!(comment_id = comment.id, "Created issue comment");
        Ok(comment)
    }

    /// Fetch a token without making an API call, for callers using their own client
    pub async fn token(&self) -> Result<String, AuthError> {
        let token = self.platform.tokens.get_token(self.installation_id).await?;
        Ok(token.token().to_string())
    }
}
