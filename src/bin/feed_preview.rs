//! Fetch one feed and print what would be announced into an empty channel,
//! oldest first. Does not touch Discord.
//!
//! Usage: feed-preview <url> [feed-name]

use std::time::Duration;

use episode_relay::history::AnnouncedTitles;
use episode_relay::ingest::normalize_entries;
use episode_relay::ingest::providers::rss::RssFeedProvider;
use episode_relay::reconcile::missing_chronological;
use episode_relay::FeedFetcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let mut args = std::env::args().skip(1);
    let Some(url) = args.next() else {
        anyhow::bail!("usage: feed-preview <url> [feed-name]");
    };
    let name = args.next().unwrap_or_else(|| "Podcast".to_string());

    let provider = RssFeedProvider::http(Duration::from_secs(20))?;
    let raw = provider.fetch(&url).await?;
    let (items, skipped) = normalize_entries(&name, &raw);

    for item in missing_chronological(&items, &AnnouncedTitles::new()) {
        println!(
            "{} | {} | {} | {} | {}",
            item.published
                .map(|d| d.format("%B %d, %Y").to_string())
                .unwrap_or_else(|| "-".into()),
            if item.is_free { "free" } else { "premium" },
            item.duration.as_deref().unwrap_or("-"),
            item.title,
            item.link
        );
    }
    println!("{} entries, {} usable, {} skipped", raw.len(), items.len(), skipped);
    Ok(())
}
