//! Tier mapping
//!
//! Turns a complexity score or a profile summary into a [`Recommendation`]
//! with a human-readable rationale.

use crate::config::{DynamicConfig, TierThresholds};
use crate::models::{
    Basis, Confidence, Flag, Metric, ProfileSummary, Recommendation, Tier, Trend,
};
use crate::pipeline::{ComplexityScore, COMPOUND_PENALTY_FACTOR};

#[derive(Debug, Clone, Default)]
pub struct TierMapper {
    thresholds: TierThresholds,
    dynamic: DynamicConfig,
}

impl TierMapper {
    pub fn new(thresholds: TierThresholds, dynamic: DynamicConfig) -> Self {
        Self { thresholds, dynamic }
    }

    /// Tier whose score interval contains `score`
    ///
    /// Counts the thresholds at or below the score, so the result never
    /// decreases as the score grows.
    pub fn tier_for_score(&self, score: f64) -> Tier {
        let reached = self
            .thresholds
            .as_array()
            .iter()
            .filter(|t| score >= **t)
            .count();
        Tier::from_index(reached).unwrap_or(Tier::T4)
    }

    /// Minimum tier implied by declared parallelism
    pub fn parallelism_floor(total_parallelism: u32) -> Tier {
        match total_parallelism {
            p if p > 48 => Tier::T4,
            p if p > 8 => Tier::T3,
            p if p > 1 => Tier::T2,
            1 => Tier::T1,
            _ => Tier::T0,
        }
    }

    pub fn map_static(&self, score: &ComplexityScore) -> Recommendation {
        let by_score = self.tier_for_score(score.total);
        let floor = Self::parallelism_floor(score.total_parallelism);
        let tier = by_score.max(floor);

        let mut rationale = vec![format!(
            "complexity score {:.1} falls in the {} range ({})",
            score.total,
            by_score,
            self.range_of(by_score)
        )];

        for (name, value) in score.ranked_factors() {
            if name == COMPOUND_PENALTY_FACTOR {
                continue;
            }
            rationale.push(format!("{}: +{:.1}", name, value));
        }

        if score.penalty_applied() {
            rationale.push(format!(
                "window stage combined with group/function: compounding penalty +{:.1}",
                score.penalty
            ));
        }

        if floor > by_score {
            rationale.push(format!(
                "declared parallelism adds {} workers and requires at least {}",
                score.total_parallelism, floor
            ));
        }

        let mut recommendation = Recommendation {
            tier,
            basis: Basis::Static,
            rationale,
            confidence: Confidence::Medium,
            current_tier: None,
            static_tier: Some(tier),
            flags: Vec::new(),
        };

        if score.has_unknown_kinds() {
            recommendation.rationale.push(format!(
                "unknown stage kinds ({}) scored with the default weight; the estimate may be a lower bound",
                score.unknown_kinds.join(", ")
            ));
            recommendation.confidence = Confidence::Low;
            recommendation.flag(Flag::UnknownStageKinds);
        }

        recommendation
    }

    pub fn map_dynamic(&self, summary: &ProfileSummary, static_floor: Option<Tier>) -> Recommendation {
        let mut flags = Vec::new();
        let mut rationale = vec![format!(
            "observed {} samples over {:.0}s ({} gaps)",
            summary.sample_count, summary.span_secs, summary.gap_count
        )];

        let baseline = match summary.current_tier {
            Some(tier) => tier,
            None => {
                let assumed = static_floor.unwrap_or(Tier::T0);
                flags.push(Flag::CurrentTierUnknown);
                rationale.push(format!("current tier not reported; assuming {}", assumed));
                assumed
            }
        };

        let cpu = summary.metric(Metric::CpuUtilization);
        let lag = summary.metric(Metric::Lag);
        let dead_letters = summary.metric(Metric::DeadLetterCount).filter(|d| d.mean > 0.0);
        let lag_growing = lag.map_or(false, |l| l.count >= 2 && l.monotonic_increase);
        let lag_settled = lag.map_or(true, |l| l.flat_or_falling());

        let proposed = if let Some(dlq) = dead_letters {
            flags.push(Flag::DeadLetters);
            rationale.push(format!(
                "dead-letter queue grew by {:.1} messages per poll: records are failing on pipeline logic or mapping, which more capacity will not fix; holding at {}",
                dlq.mean, baseline
            ));
            baseline
        } else if cpu.map_or(false, |c| c.p95 > self.dynamic.cpu_high_watermark) || lag_growing {
            if let Some(c) = cpu.filter(|c| c.p95 > self.dynamic.cpu_high_watermark) {
                rationale.push(format!(
                    "CPU utilization p95 {:.1}% is above the {:.0}% high watermark",
                    c.p95, self.dynamic.cpu_high_watermark
                ));
            }
            if let Some(l) = lag.filter(|_| lag_growing) {
                rationale.push(format!(
                    "lag grew on every sample from {:.0} to {:.0}",
                    l.first, l.last
                ));
            }
            match baseline.next_up() {
                Some(up) => up,
                None => {
                    flags.push(Flag::AtTopTier);
                    rationale.push(format!("already at the largest tier {}", baseline));
                    baseline
                }
            }
        } else if cpu.map_or(false, |c| c.p95 < self.dynamic.cpu_low_watermark) && lag_settled {
            if let Some(c) = cpu {
                rationale.push(format!(
                    "CPU utilization p95 {:.1}% is below the {:.0}% low watermark with lag not growing",
                    c.p95, self.dynamic.cpu_low_watermark
                ));
            }
            baseline.next_down().unwrap_or(baseline)
        } else {
            if cpu.is_none() {
                rationale.push("no CPU utilization reported; sizing decided on lag alone".to_string());
            }
            rationale.push(format!("observed load is within the watermarks; keeping {}", baseline));
            baseline
        };

        let tier = match static_floor {
            Some(floor) if floor > proposed => {
                rationale.push(format!(
                    "pipeline structure requires at least {}; not going below it",
                    floor
                ));
                floor
            }
            _ => proposed,
        };

        rationale.extend(advisories(summary));

        let confidence = if summary.sample_count < self.dynamic.min_samples {
            flags.push(Flag::InsufficientSamples);
            rationale.push(format!(
                "only {} samples collected (minimum {})",
                summary.sample_count, self.dynamic.min_samples
            ));
            Confidence::Low
        } else if flags.contains(&Flag::CurrentTierUnknown) {
            Confidence::Low
        } else {
            Confidence::Medium
        };

        Recommendation {
            tier,
            basis: Basis::Dynamic,
            rationale,
            confidence,
            current_tier: summary.current_tier,
            static_tier: static_floor,
            flags,
        }
    }

    fn range_of(&self, tier: Tier) -> String {
        let t = self.thresholds.as_array();
        match tier.index() {
            0 => format!("below {}", t[0]),
            4 => format!("{} and above", t[3]),
            i => format!("{} to {}", t[i - 1], t[i]),
        }
    }
}

/// Trend observations that do not change the tier
fn advisories(summary: &ProfileSummary) -> Vec<String> {
    let mut lines = Vec::new();
    let trend = |m: Metric| summary.metric(m).map(|a| a.trend);

    if trend(Metric::MemoryBytes) == Some(Trend::Increasing) {
        lines.push("memory usage is increasing; monitor for a possible memory leak".to_string());
    }
    if trend(Metric::LatencyP99Ms) == Some(Trend::Increasing) {
        lines.push("p99 latency is increasing; check for performance degradation".to_string());
    }
    if trend(Metric::StateSizeBytes) == Some(Trend::Increasing) {
        lines.push("state size is increasing; check window sizes and lookup caches".to_string());
    }
    if trend(Metric::InputRate) == Some(Trend::Decreasing) {
        lines.push("input rate is decreasing; check for upstream bottlenecks".to_string());
    }
    lines
}
