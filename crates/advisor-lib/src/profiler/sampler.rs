//! Metrics sampling loop
//!
//! Polls a processor's stats at a fixed interval and turns each successful
//! poll into a [`MetricSnapshot`] sent over a channel. Failed polls are
//! retried with exponential backoff and recorded as gaps when retries run
//! out; they never end the session.

use super::StatsSource;
use crate::config::SamplerConfig;
use crate::error::SampleError;
use crate::models::{Metric, MetricSnapshot, ProcessorStats, SessionStatus, Tier};
use crate::observability::{ProfilerMetrics, StructuredLogger};
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one sampler run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplerReport {
    pub status: SessionStatus,
    pub polls: u64,
    pub snapshots: u64,
    pub gaps: u64,
    pub retries: u64,
    /// Tier reported by the last successful poll
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_tier: Option<Tier>,
    pub elapsed_ms: u64,
}

impl SamplerReport {
    fn new() -> Self {
        Self {
            status: SessionStatus::Completed,
            polls: 0,
            snapshots: 0,
            gaps: 0,
            retries: 0,
            current_tier: None,
            elapsed_ms: 0,
        }
    }
}

/// Counters from the previous successful poll, for rate derivation
#[derive(Debug, Clone, Copy)]
struct CounterReading {
    input: u64,
    output: u64,
    dlq: u64,
    at: Instant,
}

/// Polling loop for one processor
pub struct MetricsSampler {
    source: Arc<dyn StatsSource>,
    processor: String,
    config: SamplerConfig,
    snapshot_tx: mpsc::Sender<MetricSnapshot>,
    metrics: ProfilerMetrics,
    logger: StructuredLogger,
}

impl MetricsSampler {
    pub fn new(
        source: Arc<dyn StatsSource>,
        processor: impl Into<String>,
        config: SamplerConfig,
    ) -> (Self, mpsc::Receiver<MetricSnapshot>) {
        let (snapshot_tx, snapshot_rx) = mpsc::channel(config.buffer_size.max(1));
        let processor = processor.into();

        let sampler = Self {
            source,
            logger: StructuredLogger::new(processor.clone()),
            processor,
            config,
            snapshot_tx,
            metrics: ProfilerMetrics::new(),
        };

        (sampler, snapshot_rx)
    }

    /// Sample until the configured duration elapses or `cancel` fires
    ///
    /// The snapshot channel closes when this returns.
    pub async fn run(self, cancel: CancellationToken) -> SamplerReport {
        let started = Instant::now();
        let deadline = self.config.duration().map(|d| started + d);
        let mut report = SamplerReport::new();

        self.logger
            .log_session_started(self.config.interval(), self.config.duration());
        self.metrics.session_started();

        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut previous: Option<CounterReading> = None;
        let mut latency_estimate = Duration::ZERO;

        report.status = loop {
            if cancel.is_cancelled() {
                break SessionStatus::Cancelled;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break SessionStatus::Cancelled,
                _ = wait_until(deadline) => break SessionStatus::Completed,
                _ = ticker.tick() => {}
            }

            if let Some(deadline) = deadline {
                if Instant::now() + latency_estimate >= deadline {
                    debug!(
                        processor = %self.processor,
                        latency_estimate_ms = latency_estimate.as_millis() as u64,
                        "Remaining budget too short for another poll"
                    );
                    break SessionStatus::Completed;
                }
            }

            let poll = report.polls;
            report.polls += 1;
            self.metrics.inc_polls();

            let poll_started = Instant::now();
            match self.poll_with_retry(deadline, &cancel, &mut report).await {
                Ok(stats) => {
                    let now = Instant::now();
                    let latency = now - poll_started;
                    self.metrics.observe_poll_latency(latency);
                    latency_estimate = if latency_estimate.is_zero() {
                        latency
                    } else {
                        (latency_estimate * 3 + latency) / 4
                    };

                    if stats.tier.is_some() {
                        report.current_tier = stats.tier;
                    }

                    let snapshot = build_snapshot(report.snapshots, started, now, &stats, previous);
                    previous = Some(CounterReading {
                        input: stats.input_message_count,
                        output: stats.output_message_count,
                        dlq: stats.dlq_message_count,
                        at: now,
                    });

                    if self.snapshot_tx.send(snapshot).await.is_err() {
                        warn!(processor = %self.processor, "Snapshot receiver dropped, stopping sampler");
                        break SessionStatus::Cancelled;
                    }
                    report.snapshots += 1;
                }
                Err((attempts, e)) => {
                    report.gaps += 1;
                    self.metrics.inc_gaps();
                    self.logger.log_poll_gap(poll, attempts, &e.to_string());
                }
            }
        };

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        self.metrics.session_finished();
        self.logger
            .log_session_finished(report.status, report.polls, report.gaps, report.retries);

        report
    }

    /// One poll: the first attempt plus up to `max_retries` retries
    ///
    /// On failure returns the number of attempts made and the last error.
    async fn poll_with_retry(
        &self,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
        report: &mut SamplerReport,
    ) -> std::result::Result<ProcessorStats, (u32, SampleError)> {
        let mut backoff = self.config.retry_backoff();
        let mut attempts = 0u32;

        loop {
            let attempt_timeout = match deadline {
                Some(d) => self
                    .config
                    .poll_timeout()
                    .min(d.saturating_duration_since(Instant::now())),
                None => self.config.poll_timeout(),
            };
            attempts += 1;

            let result = match timeout(attempt_timeout, self.source.get_stats(&self.processor)).await {
                Ok(result) => result,
                Err(_) => Err(SampleError::Timeout {
                    timeout_ms: attempt_timeout.as_millis() as u64,
                }),
            };

            let error = match result {
                Ok(stats) => return Ok(stats),
                Err(e) => e,
            };

            if !error.is_transient() || attempts > self.config.max_retries {
                return Err((attempts, error));
            }

            if let Some(d) = deadline {
                if Instant::now() + backoff >= d {
                    return Err((attempts, error));
                }
            }

            debug!(
                processor = %self.processor,
                attempt = attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Retrying stats poll"
            );
            report.retries += 1;
            self.metrics.inc_retries();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err((attempts, error)),
                _ = sleep(backoff) => {}
            }

            backoff = (backoff * 2).min(self.config.max_backoff());
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Convert a stats document into a snapshot
///
/// Rates and the dead-letter delta need a previous reading; a counter that
/// went backwards (processor restart) yields no value for that poll.
fn build_snapshot(
    sequence: u64,
    started: Instant,
    now: Instant,
    stats: &ProcessorStats,
    previous: Option<CounterReading>,
) -> MetricSnapshot {
    let mut metrics = BTreeMap::new();

    if let Some(prev) = previous {
        if let Some(delta) = stats.dlq_message_count.checked_sub(prev.dlq) {
            metrics.insert(Metric::DeadLetterCount, delta as f64);
        }
        let secs = (now - prev.at).as_secs_f64();
        if secs > 0.0 {
            if let Some(delta) = stats.input_message_count.checked_sub(prev.input) {
                metrics.insert(Metric::InputRate, delta as f64 / secs);
            }
            if let Some(delta) = stats.output_message_count.checked_sub(prev.output) {
                metrics.insert(Metric::OutputRate, delta as f64 / secs);
            }
        }
    }

    metrics.insert(Metric::MemoryBytes, stats.memory_usage_bytes as f64);
    if let Some(lag) = stats.lag {
        metrics.insert(Metric::Lag, lag);
    }
    if let Some(cpu) = stats.cpu_utilization {
        metrics.insert(Metric::CpuUtilization, cpu);
    }
    if let Some(latency) = stats.latency {
        metrics.insert(Metric::LatencyP50Ms, latency.p50 / 1000.0);
        metrics.insert(Metric::LatencyP99Ms, latency.p99 / 1000.0);
    }
    if let Some(bytes) = stats.state_size {
        metrics.insert(Metric::StateSizeBytes, bytes as f64);
    }
    if let Some(factor) = stats.scale_factor {
        metrics.insert(Metric::ScaleFactor, f64::from(factor));
    }

    MetricSnapshot {
        sequence,
        captured_at: Utc::now(),
        elapsed_ms: (now - started).as_millis() as u64,
        metrics,
    }
}

/// Builder for a sampler
pub struct SamplerBuilder {
    source: Option<Arc<dyn StatsSource>>,
    processor: Option<String>,
    config: SamplerConfig,
}

impl SamplerBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            processor: None,
            config: SamplerConfig::default(),
        }
    }

    pub fn source(mut self, source: Arc<dyn StatsSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn processor(mut self, processor: impl Into<String>) -> Self {
        self.processor = Some(processor.into());
        self
    }

    pub fn config(mut self, config: SamplerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.config.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    /// Sample until cancelled
    pub fn continuous(mut self) -> Self {
        self.config.duration_ms = None;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn build(self) -> Result<(MetricsSampler, mpsc::Receiver<MetricSnapshot>)> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Stats source is required"))?;
        let processor = self
            .processor
            .filter(|p| !p.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Processor name is required"))?;

        info!(processor = %processor, interval_ms = self.config.interval_ms, "Building sampler");
        Ok(MetricsSampler::new(source, processor, self.config))
    }
}

impl Default for SamplerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
