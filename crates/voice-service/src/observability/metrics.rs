//! Metrics definitions for the voice service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `vs_` prefix for the voice service
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `outcome`: session end reasons (8 values)
//! - `status`: `stored`/`failed` for chunks, `success`/`bad_request`/`error` for ingestion
//! - `kind`: outbound message kinds (6 values)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use voice_protocol::MessageKind;

/// Install the global Prometheus recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Sessions last from milliseconds (rejected) to hours
        .set_buckets_for_metric(
            Matcher::Full("vs_session_duration_seconds".to_string()),
            &[
                0.1, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0,
            ],
        )
        .map_err(|e| format!("Failed to set session duration buckets: {e}"))?
        // Ingestion spans three remote calls including model inference
        .set_buckets_for_metric(
            Matcher::Full("vs_product_ingest_duration_seconds".to_string()),
            &[0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000],
        )
        .map_err(|e| format!("Failed to set ingestion duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Record a session that reached `Closed`.
///
/// Metric: `vs_sessions_total`, `vs_session_duration_seconds`
/// Labels: `outcome`
pub fn record_session_closed(outcome: &'static str, duration: Duration) {
    counter!("vs_sessions_total", "outcome" => outcome).increment(1);
    histogram!("vs_session_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}

/// Set the number of live sessions.
///
/// Metric: `vs_sessions_active`
#[allow(clippy::cast_precision_loss)]
pub fn set_active_sessions(count: u64) {
    gauge!("vs_sessions_active").set(count as f64);
}

/// Record one inbound audio chunk.
///
/// Metric: `vs_audio_chunks_total`
/// Labels: `status` (`stored`, `failed`)
pub fn record_audio_chunk(stored: bool) {
    let status = if stored { "stored" } else { "failed" };
    counter!("vs_audio_chunks_total", "status" => status).increment(1);
}

/// Record one outbound message written to a client.
///
/// Metric: `vs_notifications_sent_total`
/// Labels: `kind`
pub fn record_message_sent(kind: MessageKind) {
    counter!("vs_notifications_sent_total", "kind" => kind.as_str()).increment(1);
}

/// Record one inbound frame that could not be interpreted.
///
/// Metric: `vs_malformed_frames_total`
pub fn record_malformed_frame() {
    counter!("vs_malformed_frames_total").increment(1);
}

/// Record a product ingestion request.
///
/// Metric: `vs_products_ingested_total`, `vs_product_ingest_duration_seconds`
/// Labels: `status`
pub fn record_product_ingest(status_code: u16, duration: Duration) {
    let status = categorize_ingest_status(status_code);
    counter!("vs_products_ingested_total", "status" => status).increment(1);
    histogram!("vs_product_ingest_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
}

fn categorize_ingest_status(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        400..=499 => "bad_request",
        _ => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder these are no-ops; the tests make sure
    // the macros accept the label types used at the call sites.

    #[test]
    fn test_record_session_closed() {
        record_session_closed("client_disconnected", Duration::from_millis(1500));
        record_session_closed("shutdown", Duration::ZERO);
    }

    #[test]
    fn test_session_gauge_and_counters() {
        set_active_sessions(3);
        set_active_sessions(0);
        record_audio_chunk(true);
        record_audio_chunk(false);
        record_malformed_frame();
        record_message_sent(MessageKind::Audio);
        record_message_sent(MessageKind::ProductComparison);
    }

    #[test]
    fn test_categorize_ingest_status() {
        assert_eq!(categorize_ingest_status(201), "success");
        assert_eq!(categorize_ingest_status(400), "bad_request");
        assert_eq!(categorize_ingest_status(422), "bad_request");
        assert_eq!(categorize_ingest_status(500), "error");
        record_product_ingest(201, Duration::from_millis(120));
    }
}
