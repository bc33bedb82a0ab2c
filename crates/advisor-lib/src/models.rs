//! Core data models for the tier advisor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Stream processing resource tier, ordered from smallest to largest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "SP2")]
    T0,
    #[serde(rename = "SP5")]
    T1,
    #[serde(rename = "SP10")]
    T2,
    #[serde(rename = "SP30")]
    T3,
    #[serde(rename = "SP50")]
    T4,
}

/// Nominal capacity class of a tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierCapacity {
    pub vcpu: f32,
    pub memory_gb: f32,
}

impl Tier {
    pub const ALL: [Tier; 5] = [Tier::T0, Tier::T1, Tier::T2, Tier::T3, Tier::T4];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Tier> {
        Self::ALL.get(index).copied()
    }

    /// Human label used by the service (SP2 .. SP50)
    pub fn label(self) -> &'static str {
        match self {
            Tier::T0 => "SP2",
            Tier::T1 => "SP5",
            Tier::T2 => "SP10",
            Tier::T3 => "SP30",
            Tier::T4 => "SP50",
        }
    }

    pub fn capacity(self) -> TierCapacity {
        let (vcpu, memory_gb) = match self {
            Tier::T0 => (0.25, 0.5),
            Tier::T1 => (0.5, 1.0),
            Tier::T2 => (1.0, 2.0),
            Tier::T3 => (2.0, 8.0),
            Tier::T4 => (8.0, 16.0),
        };
        TierCapacity { vcpu, memory_gb }
    }

    pub fn next_up(self) -> Option<Tier> {
        Self::from_index(self.index() + 1)
    }

    pub fn next_down(self) -> Option<Tier> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Tier {
    type Err = String;

    /// Accepts service labels (`SP10`) and ordinal names (`T2`), case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Tier::ALL
            .iter()
            .copied()
            .find(|t| t.label() == normalized || format!("T{}", t.index()) == normalized)
            .ok_or_else(|| format!("unknown tier '{}', expected one of SP2, SP5, SP10, SP30, SP50", s))
    }
}

/// Named numeric metrics captured from a running processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    InputRate,
    OutputRate,
    Lag,
    MemoryBytes,
    /// Dead letters added since the previous poll
    DeadLetterCount,
    CpuUtilization,
    LatencyP50Ms,
    LatencyP99Ms,
    StateSizeBytes,
    ScaleFactor,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::InputRate,
        Metric::OutputRate,
        Metric::Lag,
        Metric::MemoryBytes,
        Metric::DeadLetterCount,
        Metric::CpuUtilization,
        Metric::LatencyP50Ms,
        Metric::LatencyP99Ms,
        Metric::StateSizeBytes,
        Metric::ScaleFactor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::InputRate => "input_rate",
            Metric::OutputRate => "output_rate",
            Metric::Lag => "lag",
            Metric::MemoryBytes => "memory_bytes",
            Metric::DeadLetterCount => "dead_letter_count",
            Metric::CpuUtilization => "cpu_utilization",
            Metric::LatencyP50Ms => "latency_p50_ms",
            Metric::LatencyP99Ms => "latency_p99_ms",
            Metric::StateSizeBytes => "state_size_bytes",
            Metric::ScaleFactor => "scale_factor",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One poll of a running processor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Position in the session, starting at 0
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    /// Monotonic offset from session start
    pub elapsed_ms: u64,
    pub metrics: BTreeMap<Metric, f64>,
}

impl MetricSnapshot {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }
}

/// Latency percentiles reported by the service, in microseconds
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    #[serde(default)]
    pub p50: f64,
    #[serde(default)]
    pub p99: f64,
}

/// Stats document returned by a processor's `getStats()`
///
/// Counters are cumulative since processor start. `state` and `tier` come
/// from the enclosing processor document and are filled in by the source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessorStats {
    pub input_message_count: u64,
    pub output_message_count: u64,
    pub dlq_message_count: u64,
    pub memory_usage_bytes: u64,
    /// Percent of allocated CPU, 0-100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_utilization: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lag: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyStats>,
    /// Bytes held by windows and other stateful stages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<u32>,
    #[serde(skip)]
    pub state: Option<String>,
    #[serde(skip)]
    pub tier: Option<Tier>,
}

/// Terminal state of a profiling session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Completed,
    Cancelled,
    Empty,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Empty => "empty",
        };
        f.write_str(s)
    }
}

/// Direction of a metric across the sampled window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Stable,
    Decreasing,
    InsufficientData,
}

/// Summary statistics for one metric over a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricAggregate {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p95: f64,
    pub first: f64,
    pub last: f64,
    pub trend: Trend,
    /// Every step non-decreasing and last > first
    pub monotonic_increase: bool,
}

impl MetricAggregate {
    /// Last value did not exceed the first
    pub fn flat_or_falling(&self) -> bool {
        self.last <= self.first
    }
}

/// Aggregated view of a profiling session; only exists with at least one sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub processor: String,
    pub status: SessionStatus,
    pub sample_count: u64,
    pub gap_count: u64,
    pub span_secs: f64,
    pub first_at: DateTime<Utc>,
    pub last_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_tier: Option<Tier>,
    pub metrics: BTreeMap<Metric, MetricAggregate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<String>,
}

impl ProfileSummary {
    pub fn metric(&self, metric: Metric) -> Option<&MetricAggregate> {
        self.metrics.get(&metric)
    }
}

/// Evidence behind a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Basis {
    Static,
    Dynamic,
    Combined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        };
        f.write_str(s)
    }
}

/// Machine-readable markers attached to a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    UnknownStageKinds,
    DeadLetters,
    CurrentTierUnknown,
    AtTopTier,
    InsufficientSamples,
}

/// Tier recommendation output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub tier: Tier,
    pub basis: Basis,
    pub rationale: Vec<String>,
    pub confidence: Confidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<Flag>,
}

impl Recommendation {
    pub fn has_flag(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }

    pub(crate) fn flag(&mut self, flag: Flag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering_and_steps() {
        assert!(Tier::T0 < Tier::T1 && Tier::T3 < Tier::T4);
        assert_eq!(Tier::T2.next_up(), Some(Tier::T3));
        assert_eq!(Tier::T4.next_up(), None);
        assert_eq!(Tier::T0.next_down(), None);
        assert_eq!(Tier::T1.next_down(), Some(Tier::T0));
    }

    #[test]
    fn test_tier_parse_labels() {
        assert_eq!("SP10".parse::<Tier>().unwrap(), Tier::T2);
        assert_eq!("sp50".parse::<Tier>().unwrap(), Tier::T4);
        assert_eq!("T1".parse::<Tier>().unwrap(), Tier::T1);
        assert!("SP7".parse::<Tier>().is_err());
    }

    #[test]
    fn test_tier_serializes_as_label() {
        assert_eq!(serde_json::to_string(&Tier::T3).unwrap(), "\"SP30\"");
        let tier: Tier = serde_json::from_str("\"SP5\"").unwrap();
        assert_eq!(tier, Tier::T1);
    }

    #[test]
    fn test_capacity_grows_with_tier() {
        for pair in Tier::ALL.windows(2) {
            assert!(pair[0].capacity().vcpu <= pair[1].capacity().vcpu);
            assert!(pair[0].capacity().memory_gb < pair[1].capacity().memory_gb);
        }
    }

    #[test]
    fn test_stats_document_parsing() {
        let doc = serde_json::json!({
            "inputMessageCount": 1200,
            "outputMessageCount": 1100,
            "dlqMessageCount": 3,
            "memoryUsageBytes": 52428800,
            "latency": {"p50": 1500.0, "p99": 9000.0},
            "scaleFactor": 1
        });
        let stats: ProcessorStats = serde_json::from_value(doc).unwrap();
        assert_eq!(stats.input_message_count, 1200);
        assert_eq!(stats.dlq_message_count, 3);
        assert!(stats.cpu_utilization.is_none());
        assert_eq!(stats.latency.unwrap().p99, 9000.0);
    }

    #[test]
    fn test_metric_map_keys_serialize_snake_case() {
        let mut metrics = BTreeMap::new();
        metrics.insert(Metric::CpuUtilization, 42.0);
        let json = serde_json::to_string(&metrics).unwrap();
        assert_eq!(json, r#"{"cpu_utilization":42.0}"#);
    }
}
