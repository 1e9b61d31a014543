// src/scheduler.rs
use anyhow::{anyhow, Result};
use metrics::gauge;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::engine::{FeedSource, PassReport, RelayEngine};
use crate::notify::ChatChannel;

const READY_ATTEMPTS: u8 = 5;

pub struct Scheduler {
    engine: RelayEngine,
    chat: Arc<dyn ChatChannel>,
    feeds: Vec<FeedSource>,
    interval: Duration,
    ready_attempts: u8,
}

impl Scheduler {
    pub fn new(
        engine: RelayEngine,
        chat: Arc<dyn ChatChannel>,
        feeds: Vec<FeedSource>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            chat,
            feeds,
            interval,
            ready_attempts: READY_ATTEMPTS,
        }
    }

    pub fn with_ready_attempts(mut self, attempts: u8) -> Self {
        self.ready_attempts = attempts.max(1);
        self
    }

    pub fn feeds(&self) -> &[FeedSource] {
        &self.feeds
    }

    /// Block until the chat platform answers, retrying with backoff.
    pub async fn wait_until_ready(&self) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.chat.ready().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.ready_attempts => {
                    let wait = Duration::from_millis(500u64 << (attempt - 1).min(6));
                    tracing::warn!(target: "relay", attempt, error = ?e, "chat platform not ready, retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    return Err(anyhow!(
                        "chat platform not ready after {attempt} attempts: {e:#}"
                    ))
                }
            }
        }
    }

    /// One pass over every feed, in configured order.
    pub async fn run_cycle(&mut self) -> Vec<PassReport> {
        let mut reports = Vec::with_capacity(self.feeds.len());
        for feed in self.feeds.iter_mut() {
            reports.push(self.engine.run_pass(feed).await);
        }
        let now = chrono::Utc::now().timestamp().max(0);
        gauge!("relay_last_pass_ts").set(now as f64);
        reports
    }

    pub async fn run_forever(mut self) {
        loop {
            let reports = self.run_cycle().await;
            let announced: usize = reports.iter().map(|r| r.announced).sum();
            tracing::info!(
                target: "relay",
                feeds = reports.len(),
                announced,
                next_in_secs = self.interval.as_secs(),
                "cycle finished"
            );
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Wait for readiness, then drive the loop on its own task.
    pub async fn start(self) -> Result<JoinHandle<()>> {
        self.wait_until_ready().await?;
        tracing::info!(
            target: "relay",
            feeds = self.feeds.len(),
            interval_secs = self.interval.as_secs(),
            "starting poll loop"
        );
        Ok(tokio::spawn(self.run_forever()))
    }
}
