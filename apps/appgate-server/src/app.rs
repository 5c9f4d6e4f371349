//! Application wiring and initialization

use anyhow::{Context, Result};
use appgate_auth::{
    AppIdentity, CredentialMinter, GitHubTokenExchanger, InstallationTokenCache, PlatformClient,
    TokenCacheConfig,
};
use appgate_core::AppConfig;
use appgate_webhook::{DispatchMode, Gateway, WebhookVerifier};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cli::Args;
use crate::handlers::{InstallationTracker, IssueGreeter};
use crate::server::Server;

/// Timeout for REST calls made by handlers
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Main application
pub struct App {
    config: AppConfig,
    gateway: Arc<Gateway>,
}

impl App {
    /// Build the application; a missing secret or unusable key fails here
    pub fn build(args: &Args) -> Result<Self> {
        let config = load_config(args)?;
        let gateway = Arc::new(build_gateway(&config)?);

        Ok(Self { config, gateway })
    }

    /// Run the application
    pub async fn run(self) -> Result<()> {
        info!("Starting server");
        info!("HTTP address: {}", self.config.server.address());
        info!("Webhook path: {}", self.gateway.path());

        let server = Server::new(self.config.server, self.gateway);
        server.run().await?;

        Ok(())
    }
}

/// Load, override and validate configuration
pub fn load_config(args: &Args) -> Result<AppConfig> {
    let config = match &args.config {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AppConfig::load().context("Failed to load configuration")?,
    };

    let config = args.apply(config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Construct the gateway and everything it owns
pub fn build_gateway(config: &AppConfig) -> Result<Gateway> {
    let pem = config
        .app
        .private_key_pem()
        .context("Failed to read app private key")?;
    let identity = AppIdentity::from_pem(config.app.app_id.clone(), pem)
        .context("Invalid app identity")?;
    let minter = CredentialMinter::with_ttl(&identity, config.tokens.assertion_ttl())
        .context("App private key is not a usable RSA key")?;

    let exchanger =
        GitHubTokenExchanger::new(&config.app.api_base_url, config.tokens.exchange_timeout())
            .context("Failed to create token exchanger")?;

    let tokens = Arc::new(InstallationTokenCache::new(
        Arc::new(minter),
        Arc::new(exchanger),
        TokenCacheConfig {
            safety_margin: config.tokens.safety_margin(),
            exchange_timeout: config.tokens.exchange_timeout(),
        },
    ));

    let platform = Arc::new(
        PlatformClient::new(tokens, &config.app.api_base_url, API_TIMEOUT)
            .context("Failed to create platform client")?,
    );

    let verifier = WebhookVerifier::new(config.webhook.secret.clone())
        .context("Invalid webhook secret")?
        .allow_sha1(config.webhook.allow_sha1);

    let dispatch_mode = if config.webhook.detach_handlers {
        DispatchMode::Detached
    } else {
        DispatchMode::Inline
    };

    info!(
        app_id = %identity.app_id(),
        dispatch_mode = ?dispatch_mode,
        allow_sha1 = config.webhook.allow_sha1,
        "Initialized app credentials"
    );

    Ok(Gateway::builder(verifier)
        .path(config.webhook.path.clone())
        .dispatch_mode(dispatch_mode)
        .max_body_bytes(config.webhook.max_body_bytes)
        .platform(platform.clone())
        .on("issues.opened", Arc::new(IssueGreeter::new(platform.clone())))
        .on("installation", Arc::new(InstallationTracker::new(platform)))
        .build())
}
