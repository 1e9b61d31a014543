use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

/// One-time metric descriptions (so HELP lines show up on /metrics).
pub fn describe_all() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relay_passes_total", "Reconciliation passes started.");
        describe_counter!("relay_items_announced_total", "Episodes posted to a channel.");
        describe_counter!(
            "relay_items_skipped_total",
            "Feed entries skipped for a missing title or link."
        );
        describe_counter!("relay_send_failures_total", "Announcements that failed to send.");
        describe_counter!(
            "relay_history_errors_total",
            "Channel history scans that gave up."
        );
        describe_counter!("relay_feed_errors_total", "Feed fetch/parse failures.");
        describe_histogram!("relay_history_scan_ms", "Channel history scan time in milliseconds.");
        describe_histogram!("relay_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("relay_last_pass_ts", "Unix ts when the last cycle finished.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for this process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe_all();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }

    /// Serve `/metrics` on `addr` in the background.
    pub async fn serve(&self, addr: SocketAddr) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding metrics listener on {addr}"))?;
        let app = self.router();
        tracing::info!(target: "relay", %addr, "serving /metrics");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(target: "relay", error = ?e, "metrics server stopped");
            }
        });
        Ok(())
    }
}
