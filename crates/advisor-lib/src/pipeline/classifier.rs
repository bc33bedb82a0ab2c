//! Per-stage complexity weights
//!
//! Weights are accumulated in integer thousandths so that sums do not depend
//! on the order stages are visited in.

use super::stage::{PipelineStage, StageKind};
use crate::config::{ScoringConfig, StageWeights};
use serde::Serialize;
use std::collections::BTreeMap;

pub(crate) fn to_millis(value: f64) -> i64 {
    (value * 1000.0).round() as i64
}

pub(crate) fn from_millis(millis: i64) -> f64 {
    millis as f64 / 1000.0
}

/// Weight of one stage including everything embedded in it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageWeight {
    pub base: f64,
    pub surcharge: f64,
    /// Sum of the totals of embedded stages
    pub nested: f64,
    pub total: f64,
    /// Contribution per stage kind, embedded stages included
    pub factors: BTreeMap<String, f64>,
}

#[derive(Debug, Default)]
pub(crate) struct Tally {
    pub base: i64,
    pub surcharge: i64,
    pub nested: i64,
    pub factors: BTreeMap<String, i64>,
}

impl Tally {
    pub fn total(&self) -> i64 {
        self.base + self.surcharge + self.nested
    }
}

#[derive(Debug, Clone)]
pub struct StageClassifier {
    weights: StageWeights,
    scoring: ScoringConfig,
}

impl StageClassifier {
    pub fn new(weights: StageWeights, scoring: ScoringConfig) -> Self {
        Self { weights, scoring }
    }

    pub fn base_weight(&self, kind: &StageKind) -> f64 {
        let w = &self.weights;
        match kind {
            StageKind::Source => w.source,
            StageKind::Match => w.r#match,
            StageKind::Project => w.project,
            StageKind::AddFields => w.add_fields,
            StageKind::Group => w.group,
            StageKind::Window => w.window,
            StageKind::Function => w.function,
            StageKind::Lookup => w.lookup,
            StageKind::Merge => w.merge,
            StageKind::Sort => w.sort,
            StageKind::Facet => w.facet,
            StageKind::Unknown { .. } => w.unknown,
        }
    }

    /// Shape surcharge for a stage's own body
    pub fn surcharge(&self, stage: &PipelineStage) -> f64 {
        let raw = self.scoring.depth_surcharge * stage.depth as f64
            + self.scoring.field_surcharge * stage.field_count as f64;
        raw.clamp(0.0, self.scoring.max_surcharge)
    }

    pub fn classify(&self, stage: &PipelineStage) -> StageWeight {
        let tally = self.tally(stage);
        StageWeight {
            base: from_millis(tally.base),
            surcharge: from_millis(tally.surcharge),
            nested: from_millis(tally.nested),
            total: from_millis(tally.total()),
            factors: tally
                .factors
                .iter()
                .map(|(k, v)| (k.clone(), from_millis(*v)))
                .collect(),
        }
    }

    pub(crate) fn tally(&self, stage: &PipelineStage) -> Tally {
        let base = to_millis(self.base_weight(&stage.kind));
        let surcharge = to_millis(self.surcharge(stage));

        let mut tally = Tally {
            base,
            surcharge,
            ..Tally::default()
        };
        tally.factors.insert(stage.kind.factor_name(), base + surcharge);

        for stage in stage.sub_pipelines.iter().flatten() {
            let inner = self.tally(stage);
            tally.nested += inner.total();
            for (name, value) in inner.factors {
                *tally.factors.entry(name).or_insert(0) += value;
            }
        }

        tally
    }
}

impl Default for StageClassifier {
    fn default() -> Self {
        Self::new(StageWeights::default(), ScoringConfig::default())
    }
}
