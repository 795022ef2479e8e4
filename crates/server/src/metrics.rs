//! Prometheus metrics
//!
//! The recorder is process-global; the render handle is kept here so the
//! `/metrics` route can serve it.

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder
///
/// Safe to call more than once; later calls reuse the first handle. Returns
/// `None` if another recorder was already installed.
pub fn init_metrics() -> Option<PrometheusHandle> {
    if let Some(handle) = HANDLE.get() {
        return Some(handle.clone());
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            describe_metrics();
            Some(HANDLE.get_or_init(|| handle).clone())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

/// Register help text for the pipeline metrics
pub fn describe_metrics() {
    metrics::describe_gauge!("trifivend_active_calls", "Calls currently registered");
    metrics::describe_counter!("trifivend_turns_started_total", "Caller utterances that started a turn");
    metrics::describe_counter!("trifivend_turns_total", "Finished turns by outcome");
    metrics::describe_counter!("trifivend_backchannel_total", "Filler runs by outcome");
    metrics::describe_counter!("trifivend_continuations_total", "Follow-ups spoken after caller silence");
    metrics::describe_counter!("trifivend_generation_errors_total", "Text generation failures");
    metrics::describe_counter!("trifivend_synthesis_errors_total", "Fragment synthesis failures");
    metrics::describe_histogram!(
        "trifivend_time_to_first_audio_seconds",
        metrics::Unit::Seconds,
        "Utterance to first reply audio chunk"
    );
    metrics::describe_counter!("trifivend_status_callbacks_total", "Telephony status callbacks by status");
}

/// GET /metrics
pub async fn metrics_handler() -> impl IntoResponse {
    match HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            "metrics recorder not installed".to_string(),
        ),
    }
}
