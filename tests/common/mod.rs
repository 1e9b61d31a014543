// tests/common/mod.rs
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

use episode_relay::ingest::types::{RawLink, RawTag};
use episode_relay::notify::{HistoryEmbed, HistoryMessage, MessageId};
use episode_relay::{ChannelId, ChatChannel, EpisodeNotice, FeedFetcher, RawEntry};

/// In-memory channel store. Sent notices become embed messages in history.
#[derive(Default)]
pub struct MockChat {
    pub messages: Mutex<Vec<(ChannelId, HistoryMessage)>>,
    pub sent: Mutex<Vec<(ChannelId, EpisodeNotice)>>,
    pub fail_titles: Mutex<HashSet<String>>,
    pub history_down: Mutex<HashSet<ChannelId>>,
    pub history_stalled: Mutex<HashSet<ChannelId>>,
    pub stalled_titles: Mutex<HashSet<String>>,
    pub ready_failures: Mutex<u32>,
    next_id: Mutex<u64>,
}

impl MockChat {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1_000),
            ..Default::default()
        }
    }

    fn bump(&self) -> MessageId {
        let mut id = self.next_id.lock();
        *id += 1;
        MessageId(*id)
    }

    pub fn seed_embed(&self, channel: ChannelId, title: &str) {
        let id = self.bump();
        self.messages.lock().push((
            channel,
            HistoryMessage {
                id,
                content: None,
                embeds: vec![HistoryEmbed {
                    title: Some(title.to_string()),
                }],
            },
        ));
    }

    pub fn seed_text(&self, channel: ChannelId, text: &str) {
        let id = self.bump();
        self.messages.lock().push((
            channel,
            HistoryMessage {
                id,
                content: Some(text.to_string()),
                embeds: vec![],
            },
        ));
    }

    pub fn fail_sends_for(&self, title: &str) {
        self.fail_titles.lock().insert(title.to_string());
    }

    /// Sends for `title` never complete.
    pub fn stall_sends_for(&self, title: &str) {
        self.stalled_titles.lock().insert(title.to_string());
    }

    pub fn heal_sends(&self) {
        self.fail_titles.lock().clear();
        self.stalled_titles.lock().clear();
    }

    pub fn sent_titles(&self, channel: ChannelId) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, n)| n.title.clone())
            .collect()
    }

    pub fn delete_by_title(&self, channel: ChannelId, title: &str) {
        self.messages.lock().retain(|(c, m)| {
            !(*c == channel
                && m.embeds
                    .iter()
                    .any(|e| e.title.as_deref() == Some(title)))
        });
    }
}

#[async_trait]
impl ChatChannel for MockChat {
    async fn ready(&self) -> Result<()> {
        let mut left = self.ready_failures.lock();
        if *left > 0 {
            *left -= 1;
            return Err(anyhow!("gateway not ready"));
        }
        Ok(())
    }

    async fn history_page(
        &self,
        channel: ChannelId,
        after: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<HistoryMessage>> {
        if self.history_down.lock().contains(&channel) {
            return Err(anyhow!("history unavailable"));
        }
        let stalled = self.history_stalled.lock().contains(&channel);
        if stalled {
            std::future::pending::<()>().await;
        }
        let after = after.unwrap_or(MessageId(0));
        let mut page: Vec<HistoryMessage> = self
            .messages
            .lock()
            .iter()
            .filter(|(c, m)| *c == channel && m.id > after)
            .map(|(_, m)| m.clone())
            .collect();
        page.sort_by_key(|m| m.id);
        page.truncate(limit as usize);
        // Discord hands pages back newest-first.
        page.reverse();
        Ok(page)
    }

    async fn send(&self, channel: ChannelId, notice: &EpisodeNotice) -> Result<()> {
        if self.fail_titles.lock().contains(&notice.title) {
            return Err(anyhow!("HTTP 500"));
        }
        let stalled = self.stalled_titles.lock().contains(&notice.title);
        if stalled {
            std::future::pending::<()>().await;
        }
        let id = self.bump();
        self.messages.lock().push((
            channel,
            HistoryMessage {
                id,
                content: None,
                embeds: vec![HistoryEmbed {
                    title: Some(notice.title.clone()),
                }],
            },
        ));
        self.sent.lock().push((channel, notice.clone()));
        Ok(())
    }
}

/// Feed fetcher serving fixed entries per URL.
#[derive(Default)]
pub struct StaticFeeds {
    pub feeds: Mutex<Vec<(String, Vec<RawEntry>)>>,
    pub stalled: Mutex<HashSet<String>>,
}

impl StaticFeeds {
    pub fn set(&self, url: &str, entries: Vec<RawEntry>) {
        let mut feeds = self.feeds.lock();
        feeds.retain(|(u, _)| u != url);
        feeds.push((url.to_string(), entries));
    }

    /// Fetches of `url` never complete.
    pub fn stall(&self, url: &str) {
        self.stalled.lock().insert(url.to_string());
    }
}

#[async_trait]
impl FeedFetcher for StaticFeeds {
    async fn fetch(&self, url: &str) -> Result<Vec<RawEntry>> {
        let stalled = self.stalled.lock().contains(url);
        if stalled {
            std::future::pending::<()>().await;
        }
        self.feeds
            .lock()
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, e)| e.clone())
            .ok_or_else(|| anyhow!("404 for {url}"))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

pub fn entry(title: &str) -> RawEntry {
    RawEntry {
        title: Some(title.to_string()),
        link: Some(format!(
            "https://show.example.test/{}",
            title.to_lowercase().replace(' ', "-")
        )),
        ..Default::default()
    }
}

pub fn tagged(title: &str, tag: &str) -> RawEntry {
    RawEntry {
        tags: vec![RawTag {
            term: tag.to_string(),
        }],
        ..entry(title)
    }
}

pub fn linkless(title: &str) -> RawEntry {
    RawEntry {
        title: Some(title.to_string()),
        links: vec![RawLink { href: "  ".into() }],
        ..Default::default()
    }
}
