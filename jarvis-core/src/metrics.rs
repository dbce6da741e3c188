// ABOUTME: Prometheus metrics for the message pipeline.
// ABOUTME: Thin wrappers over the metrics facade so call sites stay one-liners.
use anyhow::{Context, Result};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const MESSAGES_RECEIVED: &str = "jarvis_messages_received_total";
pub const DUPLICATES_REJECTED: &str = "jarvis_duplicates_rejected_total";
pub const MESSAGES_QUEUED: &str = "jarvis_messages_queued_total";
pub const AGENT_INVOCATIONS: &str = "jarvis_agent_invocations_total";
pub const AGENT_DURATION: &str = "jarvis_agent_invocation_duration_seconds";
pub const MESSAGES_SENT: &str = "jarvis_messages_sent_total";
pub const ERRORS: &str = "jarvis_errors_total";

/// Install the global Prometheus recorder; call once at startup
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

pub fn record_message_received(kind: &str) {
    counter!(MESSAGES_RECEIVED, "kind" => kind.to_string()).increment(1);
}

pub fn record_duplicate(reason: &str) {
    counter!(DUPLICATES_REJECTED, "reason" => reason.to_string()).increment(1);
}

pub fn record_message_queued() {
    counter!(MESSAGES_QUEUED).increment(1);
}

/// `outcome` is one of completed, timed_out, or an agent error kind
pub fn record_agent_invocation(outcome: &str, duration_secs: f64) {
    counter!(AGENT_INVOCATIONS, "outcome" => outcome.to_string()).increment(1);
    histogram!(AGENT_DURATION).record(duration_secs);
}

pub fn record_message_sent() {
    counter!(MESSAGES_SENT).increment(1);
}

pub fn record_error(kind: &str) {
    counter!(ERRORS, "kind" => kind.to_string()).increment(1);
}
