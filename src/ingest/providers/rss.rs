// src/ingest/providers/rss.rs
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::parse_published;
use crate::ingest::types::{FeedFetcher, RawEntry, RawLink, RawTag};

const USER_AGENT: &str = concat!("episode-relay/", env!("CARGO_PKG_VERSION"));

// ---- RSS 2.0 ----

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    enclosure: Option<Enclosure>,
    #[serde(rename = "category", default)]
    categories: Vec<TextNode>,
    #[serde(rename = "itunes-title")]
    itunes_title: Option<String>,
    #[serde(rename = "itunes-duration")]
    itunes_duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}

// ---- Atom ----

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<TextNode>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
    #[serde(rename = "itunes-duration")]
    itunes_duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term", default)]
    term: String,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

impl From<Item> for RawEntry {
    fn from(it: Item) -> Self {
        let published_parsed = it.pub_date.as_deref().and_then(parse_published);
        RawEntry {
            title: non_empty(it.title).or(non_empty(it.itunes_title)),
            link: non_empty(it.link),
            links: it
                .enclosure
                .and_then(|e| e.url)
                .map(|href| vec![RawLink { href }])
                .unwrap_or_default(),
            published: it.pub_date,
            published_parsed,
            itunes_duration: non_empty(it.itunes_duration),
            tags: it
                .categories
                .into_iter()
                .filter(|c| !c.value.trim().is_empty())
                .map(|c| RawTag { term: c.value })
                .collect(),
        }
    }
}

impl From<AtomEntry> for RawEntry {
    fn from(en: AtomEntry) -> Self {
        // Atom: a link without rel is an alternate link.
        let link = en
            .links
            .iter()
            .find(|l| l.rel.as_deref().unwrap_or("alternate") == "alternate")
            .and_then(|l| l.href.clone());
        let published = en.published.or(en.updated);
        let published_parsed = published.as_deref().and_then(parse_published);
        RawEntry {
            title: en.title.map(|t| t.value),
            link: non_empty(link),
            links: en
                .links
                .into_iter()
                .filter_map(|l| l.href)
                .map(|href| RawLink { href })
                .collect(),
            published,
            published_parsed,
            itunes_duration: non_empty(en.itunes_duration),
            tags: en
                .categories
                .into_iter()
                .filter(|c| !c.term.trim().is_empty())
                .map(|c| RawTag { term: c.term })
                .collect(),
        }
    }
}

/// Parse an RSS 2.0 or Atom document into raw entries, in document order.
pub fn parse_feed(xml: &str) -> Result<Vec<RawEntry>> {
    let t0 = std::time::Instant::now();
    let xml_clean = flatten_prefixed_tags(&scrub_html_entities_for_xml(xml));

    let entries: Vec<RawEntry> = if xml_clean.contains("<rss") {
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;
        rss.channel.item.into_iter().map(RawEntry::from).collect()
    } else if xml_clean.contains("<feed") {
        let atom: AtomFeed = from_str(&xml_clean).context("parsing atom xml")?;
        atom.entry.into_iter().map(RawEntry::from).collect()
    } else {
        bail!("unrecognized feed format (expected <rss> or <feed>)");
    };

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("relay_feed_parse_ms").record(ms);
    Ok(entries)
}

/// Feed source over HTTP, or over a fixed document for tests and previews.
pub struct RssFeedProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client },
}

impl RssFeedProvider {
    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn http(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("building feed http client")?;
        Ok(Self {
            mode: Mode::Http { client },
        })
    }
}

#[async_trait]
impl FeedFetcher for RssFeedProvider {
    async fn fetch(&self, url: &str) -> Result<Vec<RawEntry>> {
        match &self.mode {
            Mode::Fixture(s) => parse_feed(s),
            Mode::Http { client } => {
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("GET {url}"))?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(anyhow!("feed {url} returned HTTP {status}"));
                }
                let body = resp.text().await.context("feed http .text()")?;
                parse_feed(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "rss"
    }
}

/// Rewrite HTML named entities as numeric references so the XML parser
/// accepts them. Names HTML does not know are kept as literal text.
fn scrub_html_entities_for_xml(s: &str) -> String {
    static RE_ENTITY: OnceCell<Regex> = OnceCell::new();
    let re = RE_ENTITY.get_or_init(|| Regex::new(r"&([A-Za-z][A-Za-z0-9]*);").unwrap());
    re.replace_all(s, |caps: &Captures| {
        let name = &caps[1];
        if matches!(name, "amp" | "lt" | "gt" | "quot" | "apos") {
            return caps[0].to_string();
        }
        let decoded = html_escape::decode_html_entities(&caps[0]);
        if *decoded == caps[0] {
            format!("&amp;{name};")
        } else {
            decoded.chars().map(|c| format!("&#{};", c as u32)).collect()
        }
    })
    .into_owned()
}

/// The serde deserializer keys elements by local name, so `<itunes:title>`
/// would collide with `<title>`. Element names become `prefix-name`.
fn flatten_prefixed_tags(s: &str) -> String {
    static RE_PREFIXED: OnceCell<Regex> = OnceCell::new();
    let re = RE_PREFIXED
        .get_or_init(|| Regex::new(r"<(/?)([A-Za-z_][A-Za-z0-9_.-]*):([A-Za-z_])").unwrap());
    re.replace_all(s, "<${1}${2}-${3}").into_owned()
}
