//! Host configuration resolution
//!
//! The agent's configuration lives on the host and is fetched from
//! `GET <host>/ingest/config`. Every successful fetch is persisted in the
//! local settings table, so a restart during a host outage comes up with
//! the last-known configuration instead of failing.
//!
//! Resolution priority: live fetch, then stored copy.

use crate::db::settings;
use anyhow::{Context, Result};
use medialib_common::config::AgentConfig;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{info, warn};

/// Default host port when the CLI argument is a bare IP or hostname.
pub const DEFAULT_HOST_PORT: u16 = 8765;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Normalize the CLI host argument into a base URL.
///
/// Accepts a full `http(s)://` URL or a bare host, which gets the
/// default scheme and port. Trailing slashes are stripped.
pub fn normalize_host_url(raw: &str) -> medialib_common::Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(medialib_common::Error::Config(
            "Empty host address".to_string(),
        ));
    }
    let base = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{}:{}", raw, DEFAULT_HOST_PORT)
    };
    Ok(base.trim_end_matches('/').to_string())
}

/// Fetches configuration from the host with a stored fallback.
pub struct ConfigSource {
    client: reqwest::Client,
    host_base: String,
    db: SqlitePool,
}

impl ConfigSource {
    pub fn new(host_base: String, db: SqlitePool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("building config HTTP client")?;
        Ok(Self {
            client,
            host_base,
            db,
        })
    }

    pub fn host_base(&self) -> &str {
        &self.host_base
    }

    /// Fetch fresh configuration from the host and persist it locally.
    pub async fn fetch(&self) -> Result<AgentConfig> {
        let url = format!("{}/ingest/config", self.host_base);
        let raw: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let cfg: AgentConfig =
            serde_json::from_value(raw.clone()).context("parsing host configuration")?;

        // Best-effort persistence; a failed write never fails the fetch.
        match serde_json::to_string(&raw) {
            Ok(json) => {
                if let Err(e) = settings::set(&self.db, settings::LAST_CONFIG_KEY, &json).await {
                    warn!(error = %e, "Failed to persist fetched configuration");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize fetched configuration"),
        }

        Ok(cfg)
    }

    /// The last successfully fetched configuration, if any.
    pub async fn cached(&self) -> Option<AgentConfig> {
        let stored = settings::get(&self.db, settings::LAST_CONFIG_KEY)
            .await
            .ok()
            .flatten()?;
        match serde_json::from_str(&stored) {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                warn!(error = %e, "Stored configuration is unreadable, ignoring");
                None
            }
        }
    }

    /// Live configuration when the host is reachable, otherwise the
    /// stored copy.
    pub async fn fetch_or_cached(&self) -> Result<AgentConfig> {
        match self.fetch().await {
            Ok(cfg) => Ok(cfg),
            Err(fetch_err) => match self.cached().await {
                Some(cfg) => {
                    info!(error = %fetch_err, "Host unreachable, using last-known configuration");
                    Ok(cfg)
                }
                None => Err(fetch_err.context("host unreachable and no cached configuration")),
            },
        }
    }
}
