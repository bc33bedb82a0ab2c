//! Pipeline complexity scoring

use super::classifier::{from_millis, to_millis, StageClassifier};
use super::stage::StageKind;
use super::Pipeline;
use crate::config::{ScoringConfig, StageWeights};
use crate::error::AdvisorError;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Factor name under which the compounding penalty is reported
pub const COMPOUND_PENALTY_FACTOR: &str = "compound_penalty";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexityScore {
    pub total: f64,
    /// Sum of stage weights, embedded stages included
    pub base_sum: f64,
    /// Pipeline-level factors: length, connection count, declared
    /// parallelism and Kafka references
    pub structural: f64,
    /// Compounding penalty amount; 0 when not applied
    pub penalty: f64,
    pub factors: BTreeMap<String, f64>,
    pub unknown_kinds: Vec<String>,
    pub total_parallelism: u32,
    pub stage_count: usize,
    pub connection_count: usize,
}

impl ComplexityScore {
    pub fn has_unknown_kinds(&self) -> bool {
        !self.unknown_kinds.is_empty()
    }

    pub fn penalty_applied(&self) -> bool {
        self.penalty > 0.0
    }

    /// Factors ordered by contribution, largest first
    pub fn ranked_factors(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> =
            self.factors.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}

#[derive(Debug, Clone)]
pub struct ComplexityScorer {
    classifier: StageClassifier,
    penalty_pct: f64,
    parallelism_weight: f64,
    kafka_surcharge: f64,
}

impl ComplexityScorer {
    pub fn new(weights: StageWeights, scoring: ScoringConfig) -> Self {
        Self {
            penalty_pct: scoring.compound_penalty_pct,
            parallelism_weight: scoring.parallelism_weight,
            kafka_surcharge: scoring.kafka_surcharge,
            classifier: StageClassifier::new(weights, scoring),
        }
    }

    pub fn classifier(&self) -> &StageClassifier {
        &self.classifier
    }

    /// Validate the pipeline, then score it
    pub fn score(&self, pipeline: &Pipeline) -> Result<ComplexityScore, AdvisorError> {
        pipeline.validate()?;

        let mut base_sum = 0i64;
        let mut factors: BTreeMap<String, i64> = BTreeMap::new();
        for stage in pipeline.stages() {
            let tally = self.classifier.tally(stage);
            base_sum += tally.total();
            for (name, value) in tally.factors {
                *factors.entry(name).or_insert(0) += value;
            }
        }

        let stage_count = pipeline.len();
        let length_factor = match stage_count {
            n if n > 8 => 4.0,
            n if n > 5 => 2.0,
            n if n > 3 => 1.0,
            _ => 0.0,
        };
        let connection_count = pipeline.connections().len();
        let connection_factor = match connection_count {
            n if n > 4 => 3.0,
            n if n > 2 => 2.0,
            _ => 0.0,
        };
        let mut structural = 0i64;
        if length_factor > 0.0 {
            structural += to_millis(length_factor);
            factors.insert("pipeline_length".to_string(), to_millis(length_factor));
        }
        if connection_factor > 0.0 {
            structural += to_millis(connection_factor);
            factors.insert("connections".to_string(), to_millis(connection_factor));
        }

        // summed in u64: several stages near u32::MAX must not overflow
        let declared_workers: u64 = pipeline
            .walk()
            .filter_map(|s| s.parallelism)
            .filter(|p| *p > 1)
            .map(u64::from)
            .sum();
        let parallelism_factor = to_millis(declared_workers as f64 * self.parallelism_weight);
        if parallelism_factor > 0 {
            structural = structural.saturating_add(parallelism_factor);
            factors.insert("parallelism".to_string(), parallelism_factor);
        }

        let kafka_stages = pipeline.stages().iter().filter(|s| s.mentions_kafka).count();
        let kafka_factor = to_millis(kafka_stages as f64 * self.kafka_surcharge);
        if kafka_factor > 0 {
            structural += kafka_factor;
            factors.insert("kafka".to_string(), kafka_factor);
        }

        let running = base_sum.saturating_add(structural);
        let penalty = if compounds(pipeline) {
            let amount = (running as f64 * self.penalty_pct).round() as i64;
            factors.insert(COMPOUND_PENALTY_FACTOR.to_string(), amount);
            amount
        } else {
            0
        };

        let unknown_kinds: Vec<String> = pipeline
            .walk()
            .filter_map(|s| match &s.kind {
                StageKind::Unknown { operator, .. } => Some(operator.clone()),
                _ => None,
            })
            .collect();

        let total_parallelism = pipeline
            .walk()
            .filter_map(|s| s.parallelism)
            .filter(|p| *p > 1)
            .fold(0u32, |acc, p| acc.saturating_add(p - 1));

        let score = ComplexityScore {
            total: from_millis(running.saturating_add(penalty)),
            base_sum: from_millis(base_sum),
            structural: from_millis(structural),
            penalty: from_millis(penalty),
            factors: factors.into_iter().map(|(k, v)| (k, from_millis(v))).collect(),
            unknown_kinds,
            total_parallelism,
            stage_count,
            connection_count,
        };

        debug!(
            total = score.total,
            base_sum = score.base_sum,
            penalty = score.penalty,
            stages = stage_count,
            "Scored pipeline"
        );

        Ok(score)
    }
}

impl Default for ComplexityScorer {
    fn default() -> Self {
        Self::new(StageWeights::default(), ScoringConfig::default())
    }
}

/// A window stage appears together with a group or function stage anywhere
fn compounds(pipeline: &Pipeline) -> bool {
    let mut window = false;
    let mut heavy = false;
    for stage in pipeline.walk() {
        match stage.kind {
            StageKind::Window => window = true,
            StageKind::Group | StageKind::Function => heavy = true,
            _ => {}
        }
    }
    window && heavy
}
