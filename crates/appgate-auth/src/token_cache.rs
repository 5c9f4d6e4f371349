//! Installation token cache
//!
//! Serves installation tokens from memory until they come within a safety
//! margin of expiry, then refreshes them. Refreshes are single-flight per
//! installation id: every caller that finds the entry stale while a refresh is
//! running awaits that refresh instead of starting another exchange.
//!
//! The refresh itself runs as a spawned task, so a caller that goes away
//! (client disconnect, dropped request future) does not cancel an exchange
//! other callers are waiting on.

use crate::clock::{Clock, SystemClock};
use crate::error::{AuthError, Result};
use crate::exchange::TokenExchanger;
use crate::minter::CredentialMinter;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use secrecy::{ExposeSecret, SecretString};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An installation-scoped bearer credential
#[derive(Debug, Clone)]
pub struct InstallationToken {
    pub installation_id: u64,
    token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl InstallationToken {
    pub fn new(installation_id: u64, token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            installation_id,
            token: SecretString::new(token.into()),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    /// Whether the token outlives `now` by strictly more than `margin`
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - now > margin
    }
}

/// Token cache configuration
#[derive(Debug, Clone, Copy)]
pub struct TokenCacheConfig {
    /// Tokens expiring within this window are refreshed before use
    pub safety_margin: std::time::Duration,
    /// Bound on a single token exchange
    pub exchange_timeout: std::time::Duration,
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            safety_margin: std::time::Duration::from_secs(60),
            exchange_timeout: std::time::Duration::from_secs(10),
        }
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<InstallationToken>>>;

struct InFlight {
    generation: u64,
    refresh: RefreshFuture,
}

/// Per-installation token cache with single-flight refresh
pub struct InstallationTokenCache {
    minter: Arc<CredentialMinter>,
    exchanger: Arc<dyn TokenExchanger>,
    clock: Arc<dyn Clock>,
    config: TokenCacheConfig,
    margin: Duration,
    tokens: Arc<DashMap<u64, InstallationToken>>,
    in_flight: Arc<DashMap<u64, InFlight>>,
    generation: AtomicU64,
}

impl std::fmt::Debug for InstallationTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationTokenCache")
            .field("app_id", &self.minter.app_id())
            .field("config", &self.config)
            .field("cached", &self.tokens.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl InstallationTokenCache {
    pub fn new(
        minter: Arc<CredentialMinter>,
        exchanger: Arc<dyn TokenExchanger>,
        config: TokenCacheConfig,
    ) -> Self {
        Self::with_clock(minter, exchanger, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        minter: Arc<CredentialMinter>,
        exchanger: Arc<dyn TokenExchanger>,
        config: TokenCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let margin = Duration::from_std(config.safety_margin).unwrap_or(Duration::zero());
        Self {
            minter,
            exchanger,
            clock,
            config,
            margin,
            tokens: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Get a token for `installation_id` that is not within the safety
    /// margin of expiry, refreshing it first if needed.
    pub async fn get_token(&self, installation_id: u64) -> Result<InstallationToken> {
        if let Some(token) = self.fresh_token(installation_id) {
            debug!(installation_id, "Serving cached installation token");
            return Ok(token);
        }

        let refresh = match self.in_flight.entry(installation_id) {
            Entry::Occupied(entry) => {
                debug!(installation_id, "Joining in-flight token refresh");
                entry.get().refresh.clone()
            }
            Entry::Vacant(entry) => {
                // Another caller may have finished a refresh since the first check.
                if let Some(token) = self.fresh_token(installation_id) {
                    return Ok(token);
                }
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let refresh = self.spawn_refresh(installation_id, generation);
                entry.insert(InFlight {
                    generation,
                    refresh: refresh.clone(),
                });
                refresh
            }
        };

        refresh.await
    }

    /// Drop the cached token for an installation, e.g. after the API refused it
    pub fn invalidate(&self, installation_id: u64) {
        if self.tokens.remove(&installation_id).is_some() {
            info!(installation_id, "Invalidated cached installation token");
        }
    }

    /// Drop the cached token only if it is still `token`.
    ///
    /// A caller whose request was refused uses this so it cannot evict a
    /// token another caller has refreshed in the meantime.
    pub fn invalidate_token(&self, installation_id: u64, token: &str) -> bool {
        let removed = self
            .tokens
            .remove_if(&installation_id, |_, cached| cached.token() == token)
            .is_some();
        if removed {
            info!(installation_id, "Invalidated cached installation token");
        }
        removed
    }

    /// The cached entry for an installation, fresh or not
    pub fn peek(&self, installation_id: u64) -> Option<InstallationToken> {
        self.tokens.get(&installation_id).map(|t| t.clone())
    }

    /// Installation ids that currently have a cached entry
    pub fn cached_installations(&self) -> Vec<u64> {
        self.tokens.iter().map(|e| *e.key()).collect()
    }

    pub fn config(&self) -> &TokenCacheConfig {
        &self.config
    }

    fn fresh_token(&self, installation_id: u64) -> Option<InstallationToken> {
        let now = self.clock.now();
        self.tokens
            .get(&installation_id)
            .filter(|t| t.is_fresh(now, self.margin))
            .map(|t| t.clone())
    }

    fn spawn_refresh(&self, installation_id: u64, generation: u64) -> RefreshFuture {
        let minter = Arc::clone(&self.minter);
        let exchanger = Arc::clone(&self.exchanger);
        let clock = Arc::clone(&self.clock);
        let tokens = Arc::clone(&self.tokens);
        let in_flight = Arc::clone(&self.in_flight);
        let config = self.config;
        let margin = self.margin;

        let task = tokio::spawn(async move {
            let result = refresh(
                &minter,
                exchanger.as_ref(),
                clock.as_ref(),
                config,
                margin,
                installation_id,
            )
            .await;

            match &result {
                Ok(token) => {
                    info!(
                        installation_id,
                        expires_at = %token.expires_at,
                        "Refreshed installation token"
                    );
                    tokens.insert(installation_id, token.clone());
                }
                Err(e) => {
                    warn!(installation_id, error = %e, "Installation token refresh failed");
                    tokens.remove(&installation_id);
                }
            }

            in_flight.remove_if(&installation_id, |_, f| f.generation == generation);
            result
        });

        let in_flight = Arc::clone(&self.in_flight);
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    in_flight.remove_if(&installation_id, |_, f| f.generation == generation);
                    Err(AuthError::RefreshAborted(e.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }
}

async fn refresh(
    minter: &CredentialMinter,
    exchanger: &dyn TokenExchanger,
    clock: &dyn Clock,
    config: TokenCacheConfig,
    margin: Duration,
    installation_id: u64,
) -> Result<InstallationToken> {
    let assertion = minter.mint(clock.now())?;

    let token = tokio::time::timeout(
        config.exchange_timeout,
        exchanger.exchange(&assertion, installation_id),
    )
    .await
    .map_err(|_| AuthError::Timeout(config.exchange_timeout))??;

    if !token.is_fresh(clock.now(), margin) {
        return Err(AuthError::InvalidResponse(format!(
            "token for installation {} expires at {}, inside the safety margin",
            installation_id, token.expires_at
        )));
    }

    Ok(token)
}
