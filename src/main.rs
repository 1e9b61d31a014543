//! episode-relay — Binary Entrypoint
//! Loads configuration, waits for Discord, then polls every configured feed
//! until the process is stopped.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use episode_relay::metrics::Metrics;
use episode_relay::{scheduler_from_config, RelayConfig};

/// `RUST_LOG` controls verbosity (default `info`); `LOG_FORMAT=json` switches
/// to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env when present; real environment wins.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = RelayConfig::from_env()?;
    tracing::info!(
        feeds = cfg.feeds.len(),
        interval_secs = cfg.check_interval.as_secs(),
        thumbnail = cfg.thumbnail_url.is_some(),
        "configuration loaded"
    );

    if let Some(addr) = cfg.metrics_addr {
        let metrics = Metrics::init()?;
        metrics.serve(addr).await?;
    }

    let scheduler = scheduler_from_config(&cfg)?;
    let mut handle = scheduler.start().await?;

    tokio::select! {
        res = &mut handle => {
            if let Err(e) = res {
                anyhow::bail!("poll loop stopped unexpectedly: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            handle.abort();
        }
    }
    Ok(())
}
