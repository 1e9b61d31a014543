pub mod discord;

use anyhow::Result;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::types::NormalizedItem;

pub const COLOR_FREE: u32 = 0x2E_CC_71;
pub const COLOR_PREMIUM: u32 = 0xF1_C4_0F;
pub const NOTICE_DESCRIPTION: &str = "A new episode is now available!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discord snowflake; ordering follows creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryEmbed {
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: MessageId,
    pub content: Option<String>,
    pub embeds: Vec<HistoryEmbed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Everything a channel needs to render one episode announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeNotice {
    pub title: String,
    pub url: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<NoticeField>,
    pub thumbnail_url: Option<String>,
}

impl EpisodeNotice {
    pub fn from_item(item: &NormalizedItem, thumbnail_url: Option<&str>) -> Self {
        let mut fields = Vec::new();
        if let Some(published) = item.published {
            fields.push(NoticeField {
                name: "Published".into(),
                value: published.format("%B %d, %Y").to_string(),
                inline: true,
            });
        }
        if let Some(duration) = &item.duration {
            fields.push(NoticeField {
                name: "Duration".into(),
                value: duration.clone(),
                inline: true,
            });
        }

        Self {
            title: item.display_title(),
            url: item.link.clone(),
            description: NOTICE_DESCRIPTION.to_string(),
            color: if item.is_free { COLOR_FREE } else { COLOR_PREMIUM },
            fields,
            thumbnail_url: thumbnail_url.map(str::to_string),
        }
    }
}

/// The chat platform as the relay sees it.
#[async_trait::async_trait]
pub trait ChatChannel: Send + Sync {
    /// Resolves once the platform accepts requests with our credentials.
    async fn ready(&self) -> Result<()>;

    /// Up to `limit` messages with ids strictly greater than `after`
    /// (from the start of the channel when `None`), in any order.
    async fn history_page(
        &self,
        channel: ChannelId,
        after: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<HistoryMessage>>;

    async fn send(&self, channel: ChannelId, notice: &EpisodeNotice) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    Posted,
    NotPosted,
}

#[derive(Clone)]
pub struct Announcer {
    chat: Arc<dyn ChatChannel>,
    thumbnail_url: Option<String>,
    timeout: Duration,
}

impl Announcer {
    pub fn new(chat: Arc<dyn ChatChannel>, thumbnail_url: Option<String>) -> Self {
        Self {
            chat,
            thumbnail_url,
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one announcement. Failures are logged and reported, never raised.
    pub async fn announce(&self, channel: ChannelId, item: &NormalizedItem) -> Announcement {
        let notice = EpisodeNotice::from_item(item, self.thumbnail_url.as_deref());

        let res = tokio::time::timeout(self.timeout, self.chat.send(channel, &notice)).await;
        match res {
            Ok(Ok(())) => {
                counter!("relay_items_announced_total").increment(1);
                tracing::info!(target: "relay", %channel, title = %notice.title, "announced episode");
                Announcement::Posted
            }
            Ok(Err(e)) => {
                counter!("relay_send_failures_total").increment(1);
                tracing::warn!(target: "relay", %channel, title = %notice.title, error = ?e, "send failed");
                Announcement::NotPosted
            }
            Err(_) => {
                counter!("relay_send_failures_total").increment(1);
                tracing::warn!(
                    target: "relay",
                    %channel,
                    title = %notice.title,
                    timeout_secs = self.timeout.as_secs(),
                    "send timed out"
                );
                Announcement::NotPosted
            }
        }
    }
}
