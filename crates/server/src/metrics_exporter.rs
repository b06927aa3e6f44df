//! Application metrics for Prometheus monitoring (SPEC_FULL §2 supplemented
//! feature). Grounded in the teacher's `server/src/metrics.rs`: a global
//! recorder installed once at startup, a handful of named counters/gauges,
//! and a `render()` for the `/metrics` endpoint.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder. Call once at startup. Returns
/// `false` if a recorder is already installed.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("failed to install global metrics recorder (already set)");
        return false;
    }
    let _ = PROMETHEUS_HANDLE.set(handle);
    describe_metrics();
    true
}

fn describe_metrics() {
    describe_counter!("sessionlens_lines_decoded_total", "Session log lines decoded");
    describe_counter!(
        "sessionlens_lines_skipped_total",
        "Session log lines skipped, by reason"
    );
    describe_gauge!("sessionlens_active_sessions", "Sessions active within the configured window");
    describe_gauge!("sessionlens_active_subscribers", "Currently connected push-stream subscribers");
    describe_counter!("sessionlens_events_published_total", "Domain events published on the event bus");
    describe_counter!(
        "sessionlens_subscriber_disconnects_total",
        "Push-stream subscriber disconnects, by cause"
    );
    describe_counter!("sessionlens_cache_evictions_total", "LRU cache evictions, by cache");
}

/// Renders current metrics in Prometheus text format. `None` before [`init_metrics`].
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_line_decoded() {
    counter!("sessionlens_lines_decoded_total").increment(1);
}

/// `reason` ∈ `{"malformed_json", "summary", "blank"}` (spec §4.2/§7).
pub fn record_line_skipped(reason: &'static str) {
    counter!("sessionlens_lines_skipped_total", "reason" => reason).increment(1);
}

pub fn set_active_sessions(n: u64) {
    gauge!("sessionlens_active_sessions").set(n as f64);
}

pub fn set_active_subscribers(n: u64) {
    gauge!("sessionlens_active_subscribers").set(n as f64);
}

pub fn record_event_published() {
    counter!("sessionlens_events_published_total").increment(1);
}

/// `cause` ∈ `{"client_close", "send_failure", "backpressure"}` (spec §7).
pub fn record_subscriber_disconnect(cause: &'static str) {
    counter!("sessionlens_subscriber_disconnects_total", "cause" => cause).increment(1);
}

/// `cache` ∈ `{"file_entries", "session_entries"}` (spec §4.8).
pub fn record_cache_eviction(cache: &'static str) {
    counter!("sessionlens_cache_evictions_total", "cache" => cache).increment(1);
}
