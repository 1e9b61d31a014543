//! # Relay Engine
//! One reconciliation pass for one feed/channel pair: rebuild the announced
//! set from channel history, fetch and normalize the feed, then announce the
//! missing episodes oldest-first.
//!
//! Failures never escape a pass; they show up in the returned `PassReport`.

use metrics::counter;
use std::sync::Arc;
use std::time::Duration;

use crate::history::{AnnouncedTitles, HistoryScanner};
use crate::ingest::normalize_entries;
use crate::ingest::types::FeedFetcher;
use crate::notify::{Announcement, Announcer, ChannelId, ChatChannel};
use crate::reconcile::missing_chronological;

/// A configured feed and the titles its channel already holds.
#[derive(Debug, Clone)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    pub channel: ChannelId,
    pub announced: AnnouncedTitles,
}

impl FeedSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>, channel: ChannelId) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            channel,
            announced: AnnouncedTitles::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed,
    HistoryUnavailable,
    FeedUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub feed: String,
    pub outcome: PassOutcome,
    pub fetched: usize,
    pub skipped_malformed: usize,
    pub announced: usize,
    pub failed: usize,
    pub duplicates: usize,
}

impl PassReport {
    fn new(feed: &str, outcome: PassOutcome) -> Self {
        Self {
            feed: feed.to_string(),
            outcome,
            fetched: 0,
            skipped_malformed: 0,
            announced: 0,
            failed: 0,
            duplicates: 0,
        }
    }
}

pub struct RelayEngine {
    scanner: HistoryScanner,
    fetcher: Arc<dyn FeedFetcher>,
    announcer: Announcer,
    timeout: Duration,
}

impl RelayEngine {
    pub fn new(
        chat: Arc<dyn ChatChannel>,
        fetcher: Arc<dyn FeedFetcher>,
        thumbnail_url: Option<String>,
    ) -> Self {
        Self {
            scanner: HistoryScanner::new(chat.clone()),
            fetcher,
            announcer: Announcer::new(chat, thumbnail_url),
            timeout: Duration::from_secs(20),
        }
    }

    /// Bound every remote call (history page, feed fetch, send).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.with_chat_timeout(timeout)
    }

    /// Bound history pages and sends only. Must cover the chat client's own
    /// retries, see `DiscordClient::call_budget`.
    pub fn with_chat_timeout(mut self, timeout: Duration) -> Self {
        self.scanner = self.scanner.with_timeout(timeout);
        self.announcer = self.announcer.with_timeout(timeout);
        self
    }

    pub fn with_history_retries(mut self, retries: u8) -> Self {
        self.scanner = self.scanner.with_retries(retries);
        self
    }

    pub async fn run_pass(&self, feed: &mut FeedSource) -> PassReport {
        counter!("relay_passes_total").increment(1);

        // The set must be complete before anything is compared against it.
        match self.scanner.scan(feed.channel).await {
            Ok(titles) => feed.announced = titles,
            Err(e) => {
                tracing::warn!(target: "relay", feed = %feed.name, error = ?e, "history unavailable, skipping feed");
                return PassReport::new(&feed.name, PassOutcome::HistoryUnavailable);
            }
        }

        let fetched = tokio::time::timeout(self.timeout, self.fetcher.fetch(&feed.url))
            .await
            .unwrap_or_else(|_| Err(anyhow::anyhow!("feed fetch timed out after {:?}", self.timeout)));
        let raw = match fetched {
            Ok(raw) => raw,
            Err(e) => {
                counter!("relay_feed_errors_total").increment(1);
                tracing::warn!(
                    target: "relay",
                    feed = %feed.name,
                    url = %feed.url,
                    fetcher = self.fetcher.name(),
                    error = ?e,
                    "feed unavailable, skipping"
                );
                return PassReport::new(&feed.name, PassOutcome::FeedUnavailable);
            }
        };

        let mut report = PassReport::new(&feed.name, PassOutcome::Completed);
        report.fetched = raw.len();

        let (items, skipped) = normalize_entries(&feed.name, &raw);
        report.skipped_malformed = skipped;
        counter!("relay_items_skipped_total").increment(skipped as u64);

        for item in missing_chronological(&items, &feed.announced) {
            let key = item.dedup_key();
            if feed.announced.contains(&key) {
                report.duplicates += 1;
                continue;
            }
            match self.announcer.announce(feed.channel, item).await {
                Announcement::Posted => {
                    feed.announced.insert(&key);
                    report.announced += 1;
                }
                Announcement::NotPosted => report.failed += 1,
            }
        }

        tracing::info!(
            target: "relay",
            feed = %feed.name,
            fetched = report.fetched,
            skipped = report.skipped_malformed,
            announced = report.announced,
            failed = report.failed,
            "pass complete"
        );
        report
    }
}
