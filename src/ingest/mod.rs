// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::ingest::types::{NormalizedItem, RawEntry};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

/// Why a raw entry cannot be announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unusable {
    MissingTitle,
    MissingLink,
}

impl std::fmt::Display for Unusable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unusable::MissingTitle => f.write_str("missing title"),
            Unusable::MissingLink => f.write_str("missing link"),
        }
    }
}

/// Clean a feed title: decode entities, strip tags, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Render whole seconds as `H:MM:SS` (one hour or more) or `M:SS`.
pub fn format_duration_secs(total: u64) -> String {
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Format an `itunes:duration` value. Integer seconds are rendered as a clock;
/// anything else ("12:34", "about an hour") is returned unchanged.
pub fn format_duration(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<u64>() {
        Ok(secs) => Some(format_duration_secs(secs)),
        Err(_) => Some(raw.to_string()),
    }
}

/// Free when a tag says so; without tags, fall back to the title; a feed whose
/// name mentions "public" is free throughout.
pub fn classify_free(feed_name: &str, entry: &RawEntry, title: &str) -> bool {
    let tagged_free = entry.tags.iter().any(|t| {
        let term = t.term.trim();
        term.eq_ignore_ascii_case("free") || term.eq_ignore_ascii_case("public")
    });
    if tagged_free {
        return true;
    }

    if entry.tags.is_empty() {
        let t = title.to_lowercase();
        if t.contains("free") || t.contains("unlocked") {
            return true;
        }
    }

    feed_name.to_lowercase().contains("public")
}

/// Parse RFC 2822 (RSS) or RFC 3339 (Atom) publication dates.
pub fn parse_published(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let parsed = OffsetDateTime::parse(s, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(s, &Rfc3339))
        .ok()
        .and_then(|dt| DateTime::from_timestamp(dt.unix_timestamp(), 0));
    // time rejects obsolete zone names such as "GMT"; chrono accepts them.
    parsed.or_else(|| {
        DateTime::parse_from_rfc2822(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

fn pick_link(entry: &RawEntry) -> Option<String> {
    entry
        .link
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .or_else(|| {
            entry
                .links
                .iter()
                .map(|l| l.href.trim())
                .find(|h| !h.is_empty())
        })
        .map(str::to_string)
}

/// The only way to build a `NormalizedItem`.
pub fn normalize_entry(feed_name: &str, entry: &RawEntry) -> Result<NormalizedItem, Unusable> {
    let title = entry
        .title
        .as_deref()
        .map(normalize_text)
        .filter(|t| !t.is_empty())
        .ok_or(Unusable::MissingTitle)?;

    let link = pick_link(entry).ok_or(Unusable::MissingLink)?;

    let published = entry
        .published_parsed
        .or_else(|| entry.published.as_deref().and_then(parse_published));

    let duration = entry.itunes_duration.as_deref().and_then(format_duration);
    let is_free = classify_free(feed_name, entry, &title);

    Ok(NormalizedItem {
        title,
        link,
        published,
        duration,
        is_free,
    })
}

/// Normalize a whole fetch, preserving order. Returns (items, skipped).
pub fn normalize_entries(feed_name: &str, entries: &[RawEntry]) -> (Vec<NormalizedItem>, usize) {
    let mut items = Vec::with_capacity(entries.len());
    let mut skipped = 0usize;
    for entry in entries {
        match normalize_entry(feed_name, entry) {
            Ok(item) => items.push(item),
            Err(reason) => {
                skipped += 1;
                tracing::debug!(
                    target: "relay",
                    feed = feed_name,
                    title = entry.title.as_deref().unwrap_or_default(),
                    %reason,
                    "skipping unusable entry"
                );
            }
        }
    }
    (items, skipped)
}
