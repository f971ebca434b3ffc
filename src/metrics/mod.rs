//! Prometheus metrics for bounded calls and sessions
//!
//! This module provides metrics tracking for:
//! - Calls: outcome counts and latency
//! - Sessions: connects and releases (idle or explicit)
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails or never happens, recording functions are no-ops.

use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

struct CallMetrics {
    calls: CounterVec,
    call_duration: HistogramVec,
    session_events: CounterVec,
}

static CALL_METRICS: OnceLock<CallMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers anything.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = boundcall::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = CallMetrics {
        calls: register_counter_vec!(
            "boundcall_calls_total",
            "Total bounded calls by classified outcome",
            &["outcome"]
        )?,
        call_duration: register_histogram_vec!(
            "boundcall_call_duration_seconds",
            "Bounded call duration in seconds, from start to classification",
            &["outcome"],
            vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]
        )?,
        session_events: register_counter_vec!(
            "boundcall_session_events_total",
            "Session lifecycle events (connect, idle_release, disconnect)",
            &["event"]
        )?,
    };

    CALL_METRICS
        .set(metrics)
        .map_err(|_| "Call metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    CALL_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record one finished call
pub fn record_call(outcome: &str, duration_secs: f64) {
    let Some(m) = CALL_METRICS.get() else {
        return;
    };

    m.calls.with_label_values(&[outcome]).inc();
    m.call_duration
        .with_label_values(&[outcome])
        .observe(duration_secs);
}

/// Record a session lifecycle event
pub fn record_session_event(event: &str) {
    if let Some(m) = CALL_METRICS.get() {
        m.session_events.with_label_values(&[event]).inc();
    }
}
