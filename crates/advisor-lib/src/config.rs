//! Advisor configuration
//!
//! Every tunable constant of the advisor lives here and is passed explicitly
//! into constructors. The numbers are calibration defaults, not fixed law;
//! the CLI layers file and environment overrides on top of them.

use serde::Deserialize;
use std::time::Duration;

/// Default interval between stats polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Minimum samples before a combined recommendation is reported with high confidence
pub const MIN_SAMPLES: u64 = 10;

/// Top-level configuration for the advisor and its profiling sessions
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub weights: StageWeights,
    pub scoring: ScoringConfig,
    pub thresholds: TierThresholds,
    pub dynamic: DynamicConfig,
    pub sampler: SamplerConfig,
    pub aggregator: AggregatorConfig,
}

/// Base complexity weight per stage kind
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StageWeights {
    pub source: f64,
    pub r#match: f64,
    pub project: f64,
    pub add_fields: f64,
    pub group: f64,
    pub window: f64,
    pub function: f64,
    pub lookup: f64,
    pub merge: f64,
    pub sort: f64,
    pub facet: f64,
    /// Conservative default for operators the classifier does not know
    pub unknown: f64,
}

impl Default for StageWeights {
    fn default() -> Self {
        Self {
            source: 1.0,
            r#match: 1.0,
            project: 1.0,
            add_fields: 2.0,
            group: 5.0,
            window: 10.0,
            function: 8.0,
            lookup: 7.0,
            merge: 1.0,
            sort: 3.0,
            facet: 6.0,
            unknown: 3.0,
        }
    }
}

/// Surcharges and cross-stage penalties
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub depth_surcharge: f64,
    pub field_surcharge: f64,
    /// Upper bound on the shape surcharge of a single stage
    pub max_surcharge: f64,
    /// Fraction of the running sum added once when a window stage
    /// co-occurs with a group or function stage
    pub compound_penalty_pct: f64,
    /// Added per worker for every stage declaring a parallelism above 1
    pub parallelism_weight: f64,
    /// Added per top-level stage that references Kafka
    pub kafka_surcharge: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            depth_surcharge: 0.5,
            field_surcharge: 0.1,
            max_surcharge: 5.0,
            compound_penalty_pct: 0.20,
            parallelism_weight: 1.0,
            kafka_surcharge: 1.0,
        }
    }
}

/// Lower bounds of the static score interval for T1..T4
///
/// T0 covers everything below `t1`; T4 is unbounded above.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,
    pub t4: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            t1: 6.0,
            t2: 15.0,
            t3: 30.0,
            t4: 50.0,
        }
    }
}

impl TierThresholds {
    pub fn as_array(&self) -> [f64; 4] {
        [self.t1, self.t2, self.t3, self.t4]
    }
}

/// Watermarks for metrics-driven recommendations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DynamicConfig {
    /// CPU p95 above this (percent) proposes an upgrade
    pub cpu_high_watermark: f64,
    /// CPU p95 below this (percent) proposes a downgrade
    pub cpu_low_watermark: f64,
    pub min_samples: u64,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            cpu_high_watermark: 80.0,
            cpu_low_watermark: 20.0,
            min_samples: MIN_SAMPLES,
        }
    }
}

/// Timing of a profiling session
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub interval_ms: u64,
    /// `None` samples until cancelled
    pub duration_ms: Option<u64>,
    /// Retries per poll after the first attempt
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub poll_timeout_ms: u64,
    pub buffer_size: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            duration_ms: Some(60_000),
            max_retries: 3,
            retry_backoff_ms: 500,
            max_backoff_ms: 4_000,
            poll_timeout_ms: 5_000,
            buffer_size: 256,
        }
    }
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms.max(1))
    }
}

/// Streaming aggregation limits and alert thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Samples kept per metric for percentile estimation
    pub reservoir_size: usize,
    /// Seed for reservoir replacement, fixed so summaries are reproducible
    pub reservoir_seed: u64,
    /// Relative change across the window below which a trend is stable
    pub trend_tolerance_pct: f64,
    pub max_alerts: usize,
    pub alerts: AlertThresholds,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            reservoir_size: 1024,
            reservoir_seed: 0x5eed,
            trend_tolerance_pct: 5.0,
            max_alerts: 100,
            alerts: AlertThresholds::default(),
        }
    }
}

/// Per-snapshot alert thresholds; unset thresholds are not checked
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub memory_mb: Option<f64>,
    pub latency_p99_ms: Option<f64>,
    pub min_input_rate: Option<f64>,
}
