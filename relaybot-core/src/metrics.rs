// ABOUTME: Prometheus counters for dispatch activity and connection health
// ABOUTME: Recording is a no-op until init_metrics installs the exporter

use anyhow::{Context, Result};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub const MESSAGES_TOTAL: &str = "relaybot_messages_total";
pub const HANDLER_RUNS_TOTAL: &str = "relaybot_handler_runs_total";
pub const FRAGMENTS_SENT_TOTAL: &str = "relaybot_fragments_sent_total";
pub const SEND_FAILURES_TOTAL: &str = "relaybot_send_failures_total";
pub const RECONNECTS_TOTAL: &str = "relaybot_reconnects_total";

/// Install the Prometheus recorder with an HTTP listener on `addr`
pub fn init_metrics(addr: &str) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("Invalid metrics address: {}", addr))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    tracing::info!(addr = %addr, "Prometheus metrics listener started");
    Ok(())
}

/// An inbound message reached the router
pub fn record_message() {
    counter!(MESSAGES_TOTAL).increment(1);
}

/// One handler invocation; outcome is "ok", "error", or "denied"
pub fn record_handler_run(handler: &str, outcome: &'static str) {
    counter!(HANDLER_RUNS_TOTAL, "handler" => handler.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_fragment_sent() {
    counter!(FRAGMENTS_SENT_TOTAL).increment(1);
}

pub fn record_send_failure() {
    counter!(SEND_FAILURES_TOTAL).increment(1);
}

/// A connection attempt failed or an established session dropped
pub fn record_reconnect() {
    counter!(RECONNECTS_TOTAL).increment(1);
}
