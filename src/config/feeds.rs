// src/config/feeds.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_FEEDS_PATH: &str = "FEEDS_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
    pub channel_id: u64,
}

/// Load feeds from an explicit path. Supports TOML or JSON formats.
pub fn load_feeds_from(path: &Path) -> Result<Vec<FeedSpec>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feeds from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_feeds(&content, ext.as_str())
        .with_context(|| format!("parsing feeds file {}", path.display()))
}

/// Look for a feeds file:
/// 1) $FEEDS_CONFIG_PATH (must exist)
/// 2) config/feeds.toml
/// 3) config/feeds.json
///
/// `Ok(None)` means no file is configured.
pub fn load_feeds_file() -> Result<Option<Vec<FeedSpec>>> {
    if let Ok(p) = std::env::var(ENV_FEEDS_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_FEEDS_PATH} points to non-existent path"));
        }
        return load_feeds_from(&pb).map(Some);
    }
    for candidate in ["config/feeds.toml", "config/feeds.json"] {
        let p = PathBuf::from(candidate);
        if p.exists() {
            return load_feeds_from(&p).map(Some);
        }
    }
    Ok(None)
}

fn parse_feeds(s: &str, hint_ext: &str) -> Result<Vec<FeedSpec>> {
    let feeds = if hint_ext == "json" || s.trim_start().starts_with(['[', '{']) {
        parse_json(s)?
    } else {
        parse_toml(s)?
    };
    clean_list(feeds)
}

fn parse_toml(s: &str) -> Result<Vec<FeedSpec>> {
    #[derive(Deserialize)]
    struct TomlFeeds {
        feeds: Vec<FeedSpec>,
    }
    let v: TomlFeeds = toml::from_str(s)?;
    Ok(v.feeds)
}

fn parse_json(s: &str) -> Result<Vec<FeedSpec>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum JsonFeeds {
        Wrapped { feeds: Vec<FeedSpec> },
        Bare(Vec<FeedSpec>),
    }
    Ok(match serde_json::from_str::<JsonFeeds>(s)? {
        JsonFeeds::Wrapped { feeds } | JsonFeeds::Bare(feeds) => feeds,
    })
}

/// Trim fields, reject blanks, collapse repeated (url, channel) pairs.
fn clean_list(items: Vec<FeedSpec>) -> Result<Vec<FeedSpec>> {
    let mut out: Vec<FeedSpec> = Vec::with_capacity(items.len());
    for it in items {
        let spec = FeedSpec {
            name: it.name.trim().to_string(),
            url: it.url.trim().to_string(),
            channel_id: it.channel_id,
        };
        if spec.url.is_empty() {
            bail!("feed {:?} has an empty url", spec.name);
        }
        if spec.name.is_empty() {
            bail!("feed {} has an empty name", spec.url);
        }
        if spec.channel_id == 0 {
            bail!("feed {:?} has no channel_id", spec.name);
        }
        if out
            .iter()
            .any(|f| f.url == spec.url && f.channel_id == spec.channel_id)
        {
            tracing::warn!(target: "relay", feed = %spec.name, "duplicate feed entry ignored");
            continue;
        }
        out.push(spec);
    }
    Ok(out)
}
