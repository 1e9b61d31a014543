// src/config/mod.rs
pub mod feeds;

use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::config::feeds::{load_feeds_file, FeedSpec};
use crate::notify::discord::DEFAULT_API_BASE;

pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_FEED_NAME: &str = "Podcast";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub discord_token: String,
    pub discord_api_base: String,
    pub check_interval: Duration,
    pub http_timeout: Duration,
    pub thumbnail_url: Option<String>,
    pub metrics_addr: Option<SocketAddr>,
    pub feeds: Vec<FeedSpec>,
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn secs_var(key: &str, default: u64) -> Result<Duration> {
    let secs = match non_empty_var(key) {
        Some(v) => v
            .parse::<u64>()
            .with_context(|| format!("{key} must be a whole number of seconds, got {v:?}"))?,
        None => default,
    };
    if secs == 0 {
        bail!("{key} must be at least 1 second");
    }
    Ok(Duration::from_secs(secs))
}

/// Single feed from RSS_FEED_URL / CHANNEL_ID / FEED_NAME.
fn feed_from_env() -> Result<Vec<FeedSpec>> {
    let url = non_empty_var("RSS_FEED_URL")
        .ok_or_else(|| anyhow!("no feeds configured: set FEEDS_CONFIG_PATH or RSS_FEED_URL"))?;
    let channel = non_empty_var("CHANNEL_ID").ok_or_else(|| anyhow!("Missing CHANNEL_ID env var"))?;
    let channel_id = channel
        .parse::<u64>()
        .with_context(|| format!("CHANNEL_ID must be a numeric channel id, got {channel:?}"))?;
    let name = non_empty_var("FEED_NAME").unwrap_or_else(|| DEFAULT_FEED_NAME.to_string());
    Ok(vec![FeedSpec {
        name,
        url,
        channel_id,
    }])
}

impl RelayConfig {
    /// Read configuration from the process environment (call `dotenvy::dotenv()` first).
    pub fn from_env() -> Result<Self> {
        let discord_token =
            non_empty_var("DISCORD_TOKEN").ok_or_else(|| anyhow!("Missing DISCORD_TOKEN env var"))?;

        let feeds = match load_feeds_file()? {
            Some(feeds) => feeds,
            None => feed_from_env()?,
        };
        if feeds.is_empty() {
            bail!("feeds file lists no feeds");
        }

        let metrics_addr = non_empty_var("METRICS_ADDR")
            .map(|v| {
                v.parse::<SocketAddr>()
                    .with_context(|| format!("METRICS_ADDR must be host:port, got {v:?}"))
            })
            .transpose()?;

        Ok(Self {
            discord_token,
            discord_api_base: non_empty_var("DISCORD_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            check_interval: secs_var("CHECK_INTERVAL", DEFAULT_CHECK_INTERVAL_SECS)?,
            http_timeout: secs_var("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
            thumbnail_url: non_empty_var("THUMBNAIL_URL"),
            metrics_addr,
            feeds,
        })
    }
}
