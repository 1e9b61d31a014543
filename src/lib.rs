// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod config;
pub mod engine;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod reconcile;
pub mod scheduler;

// ---- Re-exports for stable public API ----
pub use crate::config::RelayConfig;
pub use crate::engine::{FeedSource, PassOutcome, PassReport, RelayEngine};
pub use crate::ingest::types::{FeedFetcher, NormalizedItem, RawEntry};
pub use crate::notify::{ChannelId, ChatChannel, EpisodeNotice};
pub use crate::scheduler::Scheduler;

use std::sync::Arc;

use crate::ingest::providers::rss::RssFeedProvider;
use crate::notify::discord::DiscordClient;

/// Wire the Discord client, the HTTP feed provider and every configured feed
/// into a scheduler. Performs no network I/O.
pub fn scheduler_from_config(cfg: &RelayConfig) -> anyhow::Result<Scheduler> {
    let discord = DiscordClient::new(cfg.discord_token.clone())
        .with_api_base(cfg.discord_api_base.clone())
        .with_timeout(cfg.http_timeout);
    let chat_budget = discord.call_budget();
    let chat: Arc<dyn ChatChannel> = Arc::new(discord);
    let fetcher: Arc<dyn FeedFetcher> = Arc::new(RssFeedProvider::http(cfg.http_timeout)?);

    let engine = RelayEngine::new(chat.clone(), fetcher, cfg.thumbnail_url.clone())
        .with_timeout(cfg.http_timeout)
        .with_chat_timeout(chat_budget);

    let feeds = cfg
        .feeds
        .iter()
        .map(|f| FeedSource::new(f.name.clone(), f.url.clone(), ChannelId(f.channel_id)))
        .collect();

    Ok(Scheduler::new(engine, chat, feeds, cfg.check_interval))
}
