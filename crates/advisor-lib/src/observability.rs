//! Observability for profiling sessions
//!
//! Provides:
//! - Prometheus metrics (polls, retries, gaps, active sessions, poll latency,
//!   recommendations by basis)
//! - Structured logging of session events with tracing

use crate::models::{Recommendation, SessionStatus};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Poll latency buckets in seconds
const POLL_LATENCY_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

static GLOBAL_METRICS: OnceLock<ProfilerMetricsInner> = OnceLock::new();

struct ProfilerMetricsInner {
    polls: IntCounter,
    poll_retries: IntCounter,
    poll_gaps: IntCounter,
    active_sessions: IntGauge,
    poll_latency_seconds: Histogram,
    recommendations: IntCounterVec,
}

impl ProfilerMetricsInner {
    fn new() -> Self {
        Self {
            polls: register_int_counter!(
                "tier_advisor_polls_total",
                "Stats polls attempted by profiling sessions"
            )
            .expect("Failed to register polls_total"),

            poll_retries: register_int_counter!(
                "tier_advisor_poll_retries_total",
                "Retried stats requests after a transient failure"
            )
            .expect("Failed to register poll_retries_total"),

            poll_gaps: register_int_counter!(
                "tier_advisor_poll_gaps_total",
                "Polls that produced no snapshot after exhausting retries"
            )
            .expect("Failed to register poll_gaps_total"),

            active_sessions: register_int_gauge!(
                "tier_advisor_active_sessions",
                "Profiling sessions currently sampling"
            )
            .expect("Failed to register active_sessions"),

            poll_latency_seconds: register_histogram!(
                "tier_advisor_poll_latency_seconds",
                "Latency of successful stats polls",
                POLL_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register poll_latency_seconds"),

            recommendations: register_int_counter_vec!(
                "tier_advisor_recommendations_total",
                "Recommendations issued by basis",
                &["basis"]
            )
            .expect("Failed to register recommendations_total"),
        }
    }
}

/// Handle to the process-wide profiler metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct ProfilerMetrics {
    _private: (),
}

impl Default for ProfilerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfilerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ProfilerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ProfilerMetricsInner {
        GLOBAL_METRICS.get_or_init(ProfilerMetricsInner::new)
    }

    pub fn inc_polls(&self) {
        self.inner().polls.inc();
    }

    pub fn inc_retries(&self) {
        self.inner().poll_retries.inc();
    }

    pub fn inc_gaps(&self) {
        self.inner().poll_gaps.inc();
    }

    pub fn observe_poll_latency(&self, latency: Duration) {
        self.inner().poll_latency_seconds.observe(latency.as_secs_f64());
    }

    pub fn session_started(&self) {
        self.inner().active_sessions.inc();
    }

    pub fn session_finished(&self) {
        self.inner().active_sessions.dec();
    }

    pub fn inc_recommendations(&self, basis: &str) {
        self.inner().recommendations.with_label_values(&[basis]).inc();
    }

    /// Text exposition of every metric in the default registry
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Structured logger for profiling and recommendation events
#[derive(Clone)]
pub struct StructuredLogger {
    processor: String,
}

impl StructuredLogger {
    pub fn new(processor: impl Into<String>) -> Self {
        Self {
            processor: processor.into(),
        }
    }

    pub fn log_session_started(&self, interval: Duration, duration: Option<Duration>) {
        info!(
            event = "profile_session_started",
            processor = %self.processor,
            interval_ms = interval.as_millis() as u64,
            duration_ms = ?duration.map(|d| d.as_millis() as u64),
            "Profiling session started"
        );
    }

    pub fn log_poll_gap(&self, poll: u64, attempts: u32, error: &str) {
        warn!(
            event = "poll_gap",
            processor = %self.processor,
            poll = poll,
            attempts = attempts,
            error = %error,
            "Stats poll produced no snapshot"
        );
    }

    pub fn log_session_finished(&self, status: SessionStatus, polls: u64, gaps: u64, retries: u64) {
        info!(
            event = "profile_session_finished",
            processor = %self.processor,
            status = %status,
            polls = polls,
            gaps = gaps,
            retries = retries,
            "Profiling session finished"
        );
    }

    pub fn log_recommendation(&self, operation: &str, recommendation: &Recommendation) {
        info!(
            event = "recommendation_issued",
            processor = %self.processor,
            operation = %operation,
            tier = %recommendation.tier,
            basis = ?recommendation.basis,
            confidence = %recommendation.confidence,
            flags = ?recommendation.flags,
            "Tier recommendation issued"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiler_metrics_render() {
        let metrics = ProfilerMetrics::new();
        metrics.inc_polls();
        metrics.inc_retries();
        metrics.inc_gaps();
        metrics.observe_poll_latency(Duration::from_millis(40));
        metrics.inc_recommendations("static");

        let text = metrics.render().unwrap();
        assert!(text.contains("tier_advisor_polls_total"));
        assert!(text.contains("tier_advisor_poll_latency_seconds_bucket"));
        assert!(text.contains("basis=\"static\""));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("orders");
        assert_eq!(logger.processor, "orders");
    }
}
