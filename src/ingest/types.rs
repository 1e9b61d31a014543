// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Discord rejects embed titles longer than this (in characters).
pub const EMBED_TITLE_LIMIT: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawLink {
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTag {
    pub term: String,
}

/// One feed entry as the parser found it. Every field is optional; nothing
/// downstream of `normalize_entry` looks at this type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub links: Vec<RawLink>,
    pub published: Option<String>,
    pub published_parsed: Option<DateTime<Utc>>,
    pub itunes_duration: Option<String>,
    pub tags: Vec<RawTag>,
}

/// A feed entry that passed validation and is ready to be announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedItem {
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub duration: Option<String>,
    pub is_free: bool,
}

impl NormalizedItem {
    /// Title as it appears in the embed title (capped at `EMBED_TITLE_LIMIT` chars).
    pub fn display_title(&self) -> String {
        self.title.chars().take(EMBED_TITLE_LIMIT).collect()
    }

    /// Key used for deduplication against channel history.
    pub fn dedup_key(&self) -> String {
        crate::history::normalize_title(&self.display_title())
    }
}

#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Entries newest-first, as the feed lists them.
    async fn fetch(&self, url: &str) -> Result<Vec<RawEntry>>;
    fn name(&self) -> &'static str;
}
