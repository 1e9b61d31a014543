//! history.rs — rebuilds the set of already-announced titles from channel history.

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::notify::{ChannelId, ChatChannel, HistoryMessage, MessageId};

pub const PAGE_SIZE: u8 = 100;

/// Dedup key form of a title: trimmed and lowercased.
pub fn normalize_title(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Titles already present in a channel, keyed by `normalize_title`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnouncedTitles {
    inner: HashSet<String>,
}

impl AnnouncedTitles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, title: &str) -> bool {
        self.inner.contains(&normalize_title(title))
    }

    /// Returns false when the title was already present (or is blank).
    pub fn insert(&mut self, title: &str) -> bool {
        let key = normalize_title(title);
        if key.is_empty() {
            return false;
        }
        self.inner.insert(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for AnnouncedTitles {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for s in iter {
            set.insert(s.as_ref());
        }
        set
    }
}

/// Embed title when one is present, otherwise the raw message text.
pub fn extract_title(msg: &HistoryMessage) -> Option<String> {
    msg.embeds
        .iter()
        .filter_map(|e| e.title.as_deref())
        .map(str::trim)
        .find(|t| !t.is_empty())
        .or_else(|| msg.content.as_deref().map(str::trim).filter(|c| !c.is_empty()))
        .map(normalize_title)
}

pub struct HistoryScanner {
    chat: Arc<dyn ChatChannel>,
    timeout: Duration,
    max_retries: u8,
}

impl HistoryScanner {
    pub fn new(chat: Arc<dyn ChatChannel>) -> Self {
        Self {
            chat,
            timeout: Duration::from_secs(20),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    async fn page(&self, channel: ChannelId, after: Option<MessageId>) -> Result<Vec<HistoryMessage>> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = tokio::time::timeout(
                self.timeout,
                self.chat.history_page(channel, after, PAGE_SIZE),
            )
            .await
            .unwrap_or_else(|_| Err(anyhow::anyhow!("history page timed out after {:?}", self.timeout)));

            match res {
                Ok(page) => return Ok(page),
                Err(e) if attempt < self.max_retries => {
                    tracing::debug!(target: "relay", %channel, attempt, error = ?e, "history page failed, retrying");
                    tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1).min(6))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Read the whole channel, oldest first, and collect announced titles.
    pub async fn scan(&self, channel: ChannelId) -> Result<AnnouncedTitles> {
        let t0 = std::time::Instant::now();
        let mut titles = AnnouncedTitles::new();
        let mut after: Option<MessageId> = None;
        let mut messages = 0usize;

        loop {
            let mut page = self
                .page(channel, after)
                .await
                .inspect_err(|_| counter!("relay_history_errors_total").increment(1))
                .with_context(|| format!("reading history of channel {channel}"))?;
            let full_page = page.len() >= PAGE_SIZE as usize;
            page.sort_by_key(|m| m.id);

            for msg in &page {
                if let Some(title) = extract_title(msg) {
                    titles.insert(&title);
                }
            }
            messages += page.len();

            match page.last() {
                Some(last) if full_page => after = Some(last.id),
                _ => break,
            }
        }

        histogram!("relay_history_scan_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        tracing::debug!(target: "relay", %channel, messages, titles = titles.len(), "history scanned");
        Ok(titles)
    }
}
