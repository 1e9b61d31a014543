// tests/relay_pass.rs
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{entry, linkless, tagged, MockChat, StaticFeeds};
use episode_relay::notify::{COLOR_FREE, COLOR_PREMIUM};
use episode_relay::{ChannelId, FeedSource, PassOutcome, RelayEngine};

const URL: &str = "https://show.example.test/rss";
const CHAN: ChannelId = ChannelId(42);

fn setup() -> (Arc<MockChat>, Arc<StaticFeeds>, RelayEngine) {
    let chat = Arc::new(MockChat::new());
    let feeds = Arc::new(StaticFeeds::default());
    let engine = RelayEngine::new(chat.clone(), feeds.clone(), None)
        .with_timeout(Duration::from_secs(2))
        .with_history_retries(1);
    (chat, feeds, engine)
}

#[tokio::test]
async fn missing_items_are_announced_oldest_first() {
    let (chat, feeds, engine) = setup();
    feeds.set(URL, vec![entry("C"), entry("B"), entry("A")]);
    let mut feed = FeedSource::new("Show", URL, CHAN);

    let report = engine.run_pass(&mut feed).await;
    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.announced, 3);
    assert_eq!(chat.sent_titles(CHAN), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn only_unannounced_titles_go_out() {
    let (chat, feeds, engine) = setup();
    chat.seed_embed(CHAN, "A");
    chat.seed_text(CHAN, "  b ");
    feeds.set(URL, vec![entry("C"), entry("B"), entry("A")]);
    let mut feed = FeedSource::new("Show", URL, CHAN);

    engine.run_pass(&mut feed).await;
    assert_eq!(chat.sent_titles(CHAN), vec!["C"]);
    assert!(feed.announced.contains("c"));
}

#[tokio::test]
async fn second_pass_without_changes_announces_nothing() {
    let (chat, feeds, engine) = setup();
    feeds.set(URL, vec![entry("Episode 2"), entry("Episode 1")]);
    let mut feed = FeedSource::new("Show", URL, CHAN);

    let first = engine.run_pass(&mut feed).await;
    assert_eq!(first.announced, 2);

    // Fresh process state: everything must come back from channel history.
    let mut restarted = FeedSource::new("Show", URL, CHAN);
    let second = engine.run_pass(&mut restarted).await;
    assert_eq!(second.outcome, PassOutcome::Completed);
    assert_eq!(second.announced, 0);
    assert_eq!(chat.sent.lock().len(), 2);
}

#[tokio::test]
async fn failed_send_is_retried_on_the_next_pass() {
    let (chat, feeds, engine) = setup();
    feeds.set(URL, vec![entry("Y"), entry("X")]);
    chat.fail_sends_for("X");
    let mut feed = FeedSource::new("Show", URL, CHAN);

    let report = engine.run_pass(&mut feed).await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.announced, 1);
    assert!(!feed.announced.contains("X"));
    assert_eq!(chat.sent_titles(CHAN), vec!["Y"]);

    chat.heal_sends();
    let report = engine.run_pass(&mut feed).await;
    assert_eq!(report.announced, 1);
    assert_eq!(chat.sent_titles(CHAN), vec!["Y", "X"]);
}

#[tokio::test]
async fn malformed_entries_are_counted_not_posted() {
    let (chat, feeds, engine) = setup();
    let mut untitled = entry("ignored");
    untitled.title = None;
    feeds.set(URL, vec![linkless("No Link"), untitled, entry("Good")]);
    let mut feed = FeedSource::new("Show", URL, CHAN);

    let report = engine.run_pass(&mut feed).await;
    assert_eq!(report.fetched, 3);
    assert_eq!(report.skipped_malformed, 2);
    assert_eq!(chat.sent_titles(CHAN), vec!["Good"]);
    assert!(!feed.announced.contains("No Link"));
}

#[tokio::test]
async fn duplicate_titles_in_one_fetch_post_once() {
    let (chat, feeds, engine) = setup();
    let mut mirror = entry("Same Episode");
    mirror.link = Some("https://mirror.example.test/same".into());
    feeds.set(URL, vec![entry("Same Episode"), mirror]);
    let mut feed = FeedSource::new("Show", URL, CHAN);

    let report = engine.run_pass(&mut feed).await;
    assert_eq!(report.announced, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(chat.sent.lock().len(), 1);
}

#[tokio::test]
async fn deleted_announcement_is_posted_again() {
    let (chat, feeds, engine) = setup();
    feeds.set(URL, vec![entry("Gone")]);
    let mut feed = FeedSource::new("Show", URL, CHAN);

    engine.run_pass(&mut feed).await;
    chat.delete_by_title(CHAN, "Gone");
    let report = engine.run_pass(&mut feed).await;
    assert_eq!(report.announced, 1);
    assert_eq!(chat.sent_titles(CHAN), vec!["Gone", "Gone"]);
}

#[tokio::test]
async fn unavailable_history_skips_the_feed() {
    let (chat, feeds, engine) = setup();
    feeds.set(URL, vec![entry("A")]);
    chat.history_down.lock().insert(CHAN);
    let mut feed = FeedSource::new("Show", URL, CHAN);

    let report = engine.run_pass(&mut feed).await;
    assert_eq!(report.outcome, PassOutcome::HistoryUnavailable);
    assert!(chat.sent.lock().is_empty());
}

#[tokio::test]
async fn unavailable_feed_is_reported() {
    let (chat, _feeds, engine) = setup();
    let mut feed = FeedSource::new("Show", "https://nowhere.example.test/rss", CHAN);

    let report = engine.run_pass(&mut feed).await;
    assert_eq!(report.outcome, PassOutcome::FeedUnavailable);
    assert!(chat.sent.lock().is_empty());
}

#[tokio::test]
async fn history_spanning_many_pages_is_fully_read() {
    let (chat, feeds, engine) = setup();
    for i in 0..250 {
        chat.seed_text(CHAN, &format!("chatter {i}"));
    }
    chat.seed_embed(CHAN, "Old Episode");
    feeds.set(URL, vec![entry("New Episode"), entry("Old Episode")]);
    let mut feed = FeedSource::new("Show", URL, CHAN);

    engine.run_pass(&mut feed).await;
    assert_eq!(chat.sent_titles(CHAN), vec!["New Episode"]);
    assert_eq!(feed.announced.len(), 252);
}

#[tokio::test]
async fn colors_follow_classification() {
    let (chat, feeds, engine) = setup();
    feeds.set(
        URL,
        vec![tagged("Episode 6", "free"), entry("Episode 5 (Unlocked)"), entry("Episode 4")],
    );
    let mut feed = FeedSource::new("Private Feed", URL, CHAN);

    engine.run_pass(&mut feed).await;
    let colors: Vec<u32> = chat.sent.lock().iter().map(|(_, n)| n.color).collect();
    assert_eq!(colors, vec![COLOR_PREMIUM, COLOR_FREE, COLOR_FREE]);
}

#[tokio::test]
async fn thumbnail_is_shared_across_notices() {
    let chat = Arc::new(MockChat::new());
    let feeds = Arc::new(StaticFeeds::default());
    let engine = RelayEngine::new(
        chat.clone(),
        feeds.clone(),
        Some("https://img.example.test/show.png".into()),
    );
    feeds.set(URL, vec![entry("Two"), entry("One")]);
    let mut feed = FeedSource::new("Show", URL, CHAN);

    engine.run_pass(&mut feed).await;
    assert!(chat
        .sent
        .lock()
        .iter()
        .all(|(_, n)| n.thumbnail_url.as_deref() == Some("https://img.example.test/show.png")));
}

#[tokio::test(start_paused = true)]
async fn stalled_feed_fetch_times_out_as_feed_unavailable() {
    let (chat, feeds, engine) = setup();
    feeds.set(URL, vec![entry("A")]);
    feeds.stall(URL);
    let mut feed = FeedSource::new("Show", URL, CHAN);

    let report = engine.run_pass(&mut feed).await;
    assert_eq!(report.outcome, PassOutcome::FeedUnavailable);
    assert!(chat.sent.lock().is_empty());
    assert!(!feed.announced.contains("a"));
}

#[tokio::test(start_paused = true)]
async fn stalled_history_times_out_as_history_unavailable() {
    let (chat, feeds, engine) = setup();
    feeds.set(URL, vec![entry("A")]);
    chat.history_stalled.lock().insert(CHAN);
    let mut feed = FeedSource::new("Show", URL, CHAN);

    let report = engine.run_pass(&mut feed).await;
    assert_eq!(report.outcome, PassOutcome::HistoryUnavailable);
    assert!(chat.sent.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stalled_send_times_out_and_is_retried_on_the_next_pass() {
    let (chat, feeds, engine) = setup();
    feeds.set(URL, vec![entry("Y"), entry("X")]);
    chat.stall_sends_for("X");
    let mut feed = FeedSource::new("Show", URL, CHAN);

    let report = engine.run_pass(&mut feed).await;
    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.failed, 1);
    assert_eq!(report.announced, 1);
    assert!(!feed.announced.contains("x"));
    assert_eq!(chat.sent_titles(CHAN), vec!["Y"]);

    chat.heal_sends();
    let report = engine.run_pass(&mut feed).await;
    assert_eq!(report.announced, 1);
    assert_eq!(chat.sent_titles(CHAN), vec!["Y", "X"]);
}
