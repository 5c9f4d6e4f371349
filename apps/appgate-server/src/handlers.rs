//! Event handlers shipped with the server

use appgate_auth::PlatformClient;
use appgate_webhook::{EventHandler, IssuesPayload, Result, VerifiedEvent, WebhookError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub const GREETING: &str = "Thanks for opening this issue!";

/// Comments on newly opened issues
pub struct IssueGreeter {
    platform: Arc<PlatformClient>,
    message: String,
}

impl IssueGreeter {
    pub fn new(platform: Arc<PlatformClient>) -> Self {
        Self::with_message(platform, GREETING)
    }

    pub fn with_message(platform: Arc<PlatformClient>, message: impl Into<String>) -> Self {
        Self {
            platform,
            message: message.into(),
        }
    }
}

#[async_trait]
impl EventHandler for IssueGreeter {
    async fn handle(&self, event: &VerifiedEvent) -> Result<()> {
        let payload: IssuesPayload = event.parse()?;
        let installation_id = payload
            .installation
            .map(|i| i.id)
            .ok_or_else(|| WebhookError::Parse("issues event has no installation".to_string()))?;

        let comment = self
            .platform
            .installation(installation_id)
            .create_comment(
                &payload.repository.owner.login,
                &payload.repository.name,
                payload.issue.number,
                &self.message,
            )
            .await?;

        info!(
            installation_id,
            issue = payload.issue.number,
            comment_id = comment.id,
            "Greeted new issue"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "issue-greeter"
    }
}

/// Logs installation lifecycle events and drops tokens of removed installations
pub struct InstallationTracker {
    platform: Arc<PlatformClient>,
}

impl InstallationTracker {
    pub fn new(platform: Arc<PlatformClient>) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl EventHandler for InstallationTracker {
    async fn handle(&self, event: &VerifiedEvent) -> Result<()> {
        let Some(installation_id) = event.installation_id else {
            return Ok(());
        };
        let action = event.action.as_deref().unwrap_or("unknown");

        if matches!(action, "deleted" | "suspend") {
            self.platform.token_cache().invalidate(installation_id);
        }

        info!(installation_id, action, "Installation event");
        Ok(())
    }

    fn name(&self) -> &str {
        "installation-tracker"
    }
}
