//! Streaming aggregation of metric snapshots into a profile summary

use super::sampler::SamplerReport;
use super::stats::RunningStats;
use crate::config::AggregatorConfig;
use crate::models::{Metric, MetricSnapshot, ProfileSummary, SessionStatus};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// Result of aggregating a session
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AggregateOutcome {
    Summary(ProfileSummary),
    /// No snapshot was consumed
    Empty { processor: String, gap_count: u64 },
}

impl AggregateOutcome {
    pub fn summary(&self) -> Option<&ProfileSummary> {
        match self {
            AggregateOutcome::Summary(summary) => Some(summary),
            AggregateOutcome::Empty { .. } => None,
        }
    }

    pub fn into_summary(self) -> Option<ProfileSummary> {
        match self {
            AggregateOutcome::Summary(summary) => Some(summary),
            AggregateOutcome::Empty { .. } => None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self {
            AggregateOutcome::Summary(summary) => summary.status,
            AggregateOutcome::Empty { .. } => SessionStatus::Empty,
        }
    }
}

/// Folds snapshots one at a time; memory use does not grow with session length
pub struct ProfileAggregator {
    processor: String,
    config: AggregatorConfig,
    rng: StdRng,
    metrics: BTreeMap<Metric, RunningStats>,
    sample_count: u64,
    first_at: Option<DateTime<Utc>>,
    last_at: Option<DateTime<Utc>>,
    first_elapsed_ms: u64,
    last_elapsed_ms: u64,
    alerts: Vec<String>,
    suppressed_alerts: u64,
}

impl ProfileAggregator {
    pub fn new(processor: impl Into<String>, config: AggregatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.reservoir_seed);
        Self {
            processor: processor.into(),
            config,
            rng,
            metrics: BTreeMap::new(),
            sample_count: 0,
            first_at: None,
            last_at: None,
            first_elapsed_ms: 0,
            last_elapsed_ms: 0,
            alerts: Vec::new(),
            suppressed_alerts: 0,
        }
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn push(&mut self, snapshot: MetricSnapshot) {
        if self.sample_count == 0 {
            self.first_at = Some(snapshot.captured_at);
            self.first_elapsed_ms = snapshot.elapsed_ms;
        }
        self.sample_count += 1;
        self.last_at = Some(snapshot.captured_at);
        self.last_elapsed_ms = snapshot.elapsed_ms;

        self.check_alerts(&snapshot);

        let reservoir_size = self.config.reservoir_size;
        for (metric, value) in snapshot.metrics {
            self.metrics
                .entry(metric)
                .or_insert_with(|| RunningStats::new(reservoir_size))
                .push(value, &mut self.rng);
        }
    }

    /// Consume a stream of snapshots until it ends
    pub async fn consume<S>(&mut self, stream: S)
    where
        S: Stream<Item = MetricSnapshot>,
    {
        tokio::pin!(stream);
        while let Some(snapshot) = stream.next().await {
            self.push(snapshot);
        }
        debug!(processor = %self.processor, samples = self.sample_count, "Snapshot stream ended");
    }

    fn check_alerts(&mut self, snapshot: &MetricSnapshot) {
        let thresholds = &self.config.alerts;
        let mut raised = Vec::new();

        if let (Some(limit), Some(bytes)) = (thresholds.memory_mb, snapshot.get(Metric::MemoryBytes)) {
            let mb = bytes / (1024.0 * 1024.0);
            if mb > limit {
                raised.push(format!(
                    "sample {}: memory {:.1} MB exceeds threshold {:.1} MB",
                    snapshot.sequence, mb, limit
                ));
            }
        }
        if let (Some(limit), Some(p99)) = (thresholds.latency_p99_ms, snapshot.get(Metric::LatencyP99Ms)) {
            if p99 > limit {
                raised.push(format!(
                    "sample {}: p99 latency {:.1} ms exceeds threshold {:.1} ms",
                    snapshot.sequence, p99, limit
                ));
            }
        }
        if let (Some(min), Some(rate)) = (thresholds.min_input_rate, snapshot.get(Metric::InputRate)) {
            if rate < min {
                raised.push(format!(
                    "sample {}: input rate {:.1} msg/s below minimum {:.1} msg/s",
                    snapshot.sequence, rate, min
                ));
            }
        }

        for alert in raised {
            if self.alerts.len() < self.config.max_alerts {
                self.alerts.push(alert);
            } else {
                self.suppressed_alerts += 1;
            }
        }
    }

    /// Close the session; `report` supplies status, gaps and current tier
    pub fn finish(self, report: &SamplerReport) -> AggregateOutcome {
        let (Some(first_at), Some(last_at)) = (self.first_at, self.last_at) else {
            return AggregateOutcome::Empty {
                processor: self.processor,
                gap_count: report.gaps,
            };
        };

        let tolerance = self.config.trend_tolerance_pct;
        let metrics = self
            .metrics
            .iter()
            .filter_map(|(metric, stats)| stats.aggregate(tolerance).map(|agg| (*metric, agg)))
            .collect();

        let mut alerts = self.alerts;
        if self.suppressed_alerts > 0 {
            alerts.push(format!("{} further alerts suppressed", self.suppressed_alerts));
        }

        let status = match report.status {
            SessionStatus::Cancelled => SessionStatus::Cancelled,
            _ => SessionStatus::Completed,
        };

        AggregateOutcome::Summary(ProfileSummary {
            processor: self.processor,
            status,
            sample_count: self.sample_count,
            gap_count: report.gaps,
            span_secs: self.last_elapsed_ms.saturating_sub(self.first_elapsed_ms) as f64 / 1000.0,
            first_at,
            last_at,
            current_tier: report.current_tier,
            metrics,
            alerts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlertThresholds;
    use crate::models::Trend;

    fn snapshot(sequence: u64, values: &[(Metric, f64)]) -> MetricSnapshot {
        MetricSnapshot {
            sequence,
            captured_at: Utc::now(),
            elapsed_ms: sequence * 10_000,
            metrics: values.iter().copied().collect(),
        }
    }

    fn report(status: SessionStatus, gaps: u64) -> SamplerReport {
        SamplerReport {
            status,
            polls: 0,
            snapshots: 0,
            gaps,
            retries: 0,
            current_tier: None,
            elapsed_ms: 0,
        }
    }

    #[test]
    fn test_empty_session() {
        let aggregator = ProfileAggregator::new("orders", AggregatorConfig::default());
        let outcome = aggregator.finish(&report(SessionStatus::Completed, 4));
        assert_eq!(outcome.status(), SessionStatus::Empty);
        assert!(outcome.summary().is_none());
        match outcome {
            AggregateOutcome::Empty { gap_count, .. } => assert_eq!(gap_count, 4),
            other => panic!("expected empty outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_summary_statistics() {
        let mut aggregator = ProfileAggregator::new("orders", AggregatorConfig::default());
        for (i, cpu) in [40.0, 50.0, 60.0, 70.0].iter().enumerate() {
            aggregator.push(snapshot(i as u64, &[(Metric::CpuUtilization, *cpu)]));
        }
        let outcome = aggregator.finish(&report(SessionStatus::Completed, 1));
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.sample_count, 4);
        assert_eq!(summary.gap_count, 1);
        assert_eq!(summary.span_secs, 30.0);
        assert_eq!(summary.status, SessionStatus::Completed);

        let cpu = summary.metric(Metric::CpuUtilization).unwrap();
        assert_eq!(cpu.min, 40.0);
        assert_eq!(cpu.max, 70.0);
        assert_eq!(cpu.mean, 55.0);
        assert_eq!(cpu.p95, 70.0);
        assert_eq!(cpu.trend, Trend::Increasing);
        assert!(cpu.monotonic_increase);
        assert!(summary.metric(Metric::Lag).is_none());
    }

    #[test]
    fn test_missing_metrics_stay_absent() {
        let mut aggregator = ProfileAggregator::new("orders", AggregatorConfig::default());
        aggregator.push(snapshot(0, &[(Metric::MemoryBytes, 100.0)]));
        aggregator.push(snapshot(1, &[(Metric::MemoryBytes, 100.0), (Metric::InputRate, 5.0)]));
        let outcome = aggregator.finish(&report(SessionStatus::Cancelled, 0));
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.status, SessionStatus::Cancelled);
        assert_eq!(summary.metric(Metric::MemoryBytes).unwrap().count, 2);
        assert_eq!(summary.metric(Metric::InputRate).unwrap().count, 1);
        assert_eq!(
            summary.metric(Metric::InputRate).unwrap().trend,
            Trend::InsufficientData
        );
    }

    #[test]
    fn test_alerts_are_capped() {
        let config = AggregatorConfig {
            max_alerts: 2,
            alerts: AlertThresholds {
                memory_mb: Some(1.0),
                latency_p99_ms: None,
                min_input_rate: None,
            },
            ..AggregatorConfig::default()
        };
        let mut aggregator = ProfileAggregator::new("orders", config);
        for i in 0..5 {
            aggregator.push(snapshot(i, &[(Metric::MemoryBytes, 4.0 * 1024.0 * 1024.0)]));
        }
        let outcome = aggregator.finish(&report(SessionStatus::Completed, 0));
        let alerts = &outcome.summary().unwrap().alerts;
        assert_eq!(alerts.len(), 3);
        assert!(alerts[0].contains("memory 4.0 MB"));
        assert_eq!(alerts[2], "3 further alerts suppressed");
    }

    #[test]
    fn test_input_rate_alert() {
        let config = AggregatorConfig {
            alerts: AlertThresholds {
                memory_mb: None,
                latency_p99_ms: Some(100.0),
                min_input_rate: Some(10.0),
            },
            ..AggregatorConfig::default()
        };
        let mut aggregator = ProfileAggregator::new("orders", config);
        aggregator.push(snapshot(0, &[(Metric::InputRate, 2.0), (Metric::LatencyP99Ms, 150.0)]));
        let outcome = aggregator.finish(&report(SessionStatus::Completed, 0));
        assert_eq!(outcome.summary().unwrap().alerts.len(), 2);
    }

    #[tokio::test]
    async fn test_consume_stream() {
        let snapshots: Vec<MetricSnapshot> =
            (0..3).map(|i| snapshot(i, &[(Metric::Lag, i as f64)])).collect();
        let mut aggregator = ProfileAggregator::new("orders", AggregatorConfig::default());
        aggregator.consume(tokio_stream::iter(snapshots)).await;
        assert_eq!(aggregator.sample_count(), 3);
    }
}
