use super::{ChannelId, ChatChannel, EpisodeNotice, HistoryEmbed, HistoryMessage, MessageId, NoticeField};
use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Longest `retry_after` honored for a single 429.
const RATE_LIMIT_CAP: Duration = Duration::from_secs(60);

/// Which failures a request may be repeated after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    /// Reads: network errors, 429 and 5xx.
    Transient,
    /// Message creation: only 429, which Discord guarantees was not applied.
    RateLimitOnly,
}

/// Discord REST client authenticated as a bot.
#[derive(Clone)]
pub struct DiscordClient {
    api_base: String,
    token: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordClient {
    pub fn new(token: String) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token,
            client: Client::new(),
            timeout: Duration::from_secs(20),
            max_retries: 3,
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    /// Upper bound on one call including every retry, backoff and
    /// rate-limit wait. Outer timeouts around client calls should use this.
    pub fn call_budget(&self) -> Duration {
        (1..=self.max_retries)
            .map(|attempt| self.timeout + RATE_LIMIT_CAP.max(backoff(attempt)))
            .sum()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Run a request, retrying per `retry` with backoff.
    async fn execute<F>(&self, what: &str, retry: Retry, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = build()
                .header("Authorization", format!("Bot {}", self.token))
                .timeout(self.timeout)
                .send()
                .await;

            let delay = backoff(attempt);
            match res {
                Ok(rsp) if rsp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if attempt >= self.max_retries {
                        bail!("Discord {what}: rate limited");
                    }
                    let wait = rsp
                        .json::<RateLimited>()
                        .await
                        .ok()
                        .map(|r| {
                            Duration::from_secs_f64(r.retry_after.clamp(0.0, RATE_LIMIT_CAP.as_secs_f64()))
                        })
                        .unwrap_or(delay);
                    tracing::debug!(target: "relay", what, wait_ms = wait.as_millis() as u64, "discord rate limit");
                    tokio::time::sleep(wait).await;
                }
                Ok(rsp) if rsp.status().is_server_error() => {
                    if retry == Retry::RateLimitOnly || attempt >= self.max_retries {
                        bail!("Discord {what}: HTTP {}", rsp.status());
                    }
                    tokio::time::sleep(delay).await;
                }
                Ok(rsp) => {
                    let status = rsp.status();
                    if !status.is_success() {
                        let body = rsp.text().await.unwrap_or_default();
                        bail!("Discord {what}: HTTP {status}: {body}");
                    }
                    return Ok(rsp);
                }
                Err(e) => {
                    if retry == Retry::RateLimitOnly || attempt >= self.max_retries {
                        return Err(anyhow!("Discord {what} request failed: {e}"));
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ChatChannel for DiscordClient {
    async fn ready(&self) -> Result<()> {
        let url = self.url("/users/@me");
        let me: CurrentUser = self
            .execute("identify", Retry::Transient, || self.client.get(&url))
            .await?
            .json()
            .await
            .context("decode /users/@me")?;
        tracing::info!(target: "relay", user = %me.username, "logged in to Discord");
        Ok(())
    }

    async fn history_page(
        &self,
        channel: ChannelId,
        after: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<HistoryMessage>> {
        let url = self.url(&format!("/channels/{channel}/messages"));
        let query = [
            ("limit", limit.clamp(1, 100).to_string()),
            ("after", after.map(|m| m.0).unwrap_or(0).to_string()),
        ];
        let page: Vec<ApiMessage> = self
            .execute("history", Retry::Transient, || self.client.get(&url).query(&query))
            .await?
            .json()
            .await
            .context("decode channel messages")?;
        page.into_iter().map(HistoryMessage::try_from).collect()
    }

    async fn send(&self, channel: ChannelId, notice: &EpisodeNotice) -> Result<()> {
        let url = self.url(&format!("/channels/{channel}/messages"));
        let payload = CreateMessage::embed(notice);
        // A 5xx or dropped connection may still have created the message.
        self.execute("send", Retry::RateLimitOnly, || {
            self.client.post(&url).json(&payload)
        })
        .await?;
        Ok(())
    }
}

fn backoff(attempt: u8) -> Duration {
    Duration::from_millis(500u64 << (attempt.max(1) - 1).min(6))
}

#[derive(Deserialize)]
struct RateLimited {
    retry_after: f64,
}

#[derive(Deserialize)]
struct CurrentUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    embeds: Vec<ApiEmbed>,
}

#[derive(Debug, Deserialize)]
struct ApiEmbed {
    #[serde(default)]
    title: Option<String>,
}

impl TryFrom<ApiMessage> for HistoryMessage {
    type Error = anyhow::Error;

    fn try_from(m: ApiMessage) -> Result<Self> {
        let id = m
            .id
            .parse::<u64>()
            .with_context(|| format!("bad message id {:?}", m.id))?;
        Ok(HistoryMessage {
            id: MessageId(id),
            content: m.content,
            embeds: m
                .embeds
                .into_iter()
                .map(|e| HistoryEmbed { title: e.title })
                .collect(),
        })
    }
}

#[derive(Serialize)]
struct DiscordThumbnail {
    url: String,
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    url: String,
    description: String,
    color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<NoticeField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<DiscordThumbnail>,
}

#[derive(Serialize)]
struct CreateMessage {
    embeds: Vec<DiscordEmbed>,
}

impl CreateMessage {
    fn embed(notice: &EpisodeNotice) -> Self {
        Self {
            embeds: vec![DiscordEmbed {
                title: notice.title.clone(),
                url: notice.url.clone(),
                description: notice.description.clone(),
                color: notice.color,
                fields: notice.fields.clone(),
                thumbnail: notice
                    .thumbnail_url
                    .clone()
                    .map(|url| DiscordThumbnail { url }),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_messages_decode_into_history() {
        let raw = r#"[
            {"id":"1200","content":"","embeds":[{"title":"Episode 2","color":1}]},
            {"id":"1100","content":"New Podcast Episode: **Episode 1**","embeds":[]},
            {"id":"1000"}
        ]"#;
        let page: Vec<ApiMessage> = serde_json::from_str(raw).unwrap();
        let msgs: Vec<HistoryMessage> = page
            .into_iter()
            .map(HistoryMessage::try_from)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(msgs[0].id, MessageId(1200));
        assert_eq!(msgs[0].embeds[0].title.as_deref(), Some("Episode 2"));
        assert!(msgs[1].embeds.is_empty());
        assert_eq!(msgs[2].content, None);
    }

    #[test]
    fn call_budget_covers_every_attempt_and_rate_limit_wait() {
        let c = DiscordClient::new("t".into())
            .with_timeout(Duration::from_secs(20))
            .with_retries(3);
        assert_eq!(c.call_budget(), Duration::from_secs(3 * (20 + 60)));
        assert!(c.call_budget() > Duration::from_secs(20));
    }

    #[test]
    fn bad_snowflake_is_an_error() {
        let m = ApiMessage {
            id: "abc".into(),
            content: None,
            embeds: vec![],
        };
        assert!(HistoryMessage::try_from(m).is_err());
    }

    #[test]
    fn create_message_serializes_as_single_embed() {
        let notice = EpisodeNotice {
            title: "Ep".into(),
            url: "https://x.test/ep".into(),
            description: "d".into(),
            color: 0x2ECC71,
            fields: vec![],
            thumbnail_url: None,
        };
        let v = serde_json::to_value(CreateMessage::embed(&notice)).unwrap();
        let embed = &v["embeds"][0];
        assert_eq!(embed["title"], "Ep");
        assert_eq!(embed["color"], 0x2ECC71);
        assert!(embed.get("fields").is_none());
        assert!(embed.get("thumbnail").is_none());
    }
}
