//! Command-line argument parsing

use appgate_core::AppConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "appgate-server",
    about = "Webhook gateway for a GitHub App",
    version,
    long_about = "Receives signed webhook deliveries, dispatches them to event handlers \
                  and authenticates handler API calls as the app installation."
)]
pub struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// HTTP server port
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// GitHub App id
    #[arg(long, env = "APP_ID")]
    pub app_id: Option<String>,

    /// Shared secret used to sign webhook deliveries
    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,

    /// App private key PEM (literal `\n` sequences are accepted)
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Path to the app private key PEM file
    #[arg(long, env = "PRIVATE_KEY_PATH")]
    pub private_key_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        env = "LOG_LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: String,

    /// Enable JSON log format (useful for production)
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,
}

impl Args {
    /// Apply explicit flags over the loaded configuration
    pub fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(app_id) = &self.app_id {
            config = config.with_app_id(app_id.clone());
        }
        if let Some(secret) = &self.webhook_secret {
            config = config.with_webhook_secret(secret.clone());
        }
        if let Some(pem) = &self.private_key {
            config = config.with_private_key(pem.clone());
        }
        if let Some(path) = &self.private_key_path {
            config = config.with_private_key_path(path.display().to_string());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "appgate-server",
            "--port",
            "4000",
            "--app-id",
            "123",
            "--webhook-secret",
            "development",
            "--private-key-path",
            "/etc/appgate/key.pem",
        ]);

        let config = args.apply(AppConfig::load().unwrap());

        assert_eq!(config.server.port, 4000);
        assert_eq!(config.app.app_id, "123");
        assert_eq!(config.webhook.secret, "development");
        assert_eq!(
            config.app.private_key_path.as_deref(),
            Some("/etc/appgate/key.pem")
        );
    }
}
