//! Pipeline definitions and static complexity analysis
//!
//! A [`Pipeline`] is parsed once from its JSON definition and never mutated.
//! Parsing only checks that every stage document is well formed; the
//! structural invariants (single leading source, at most one trailing sink)
//! are checked by [`Pipeline::validate`], which the scorer runs before any
//! scoring.

mod classifier;
mod scorer;
mod stage;

pub use classifier::{StageClassifier, StageWeight};
pub use scorer::{ComplexityScore, ComplexityScorer, COMPOUND_PENALTY_FACTOR};
pub use stage::{PipelineStage, StageKind};

use crate::error::AdvisorError;
use serde_json::Value;
use std::collections::BTreeSet;

/// Ordered sequence of top-level stages
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    name: Option<String>,
    stages: Vec<PipelineStage>,
}

impl Pipeline {
    pub fn new(stages: Vec<PipelineStage>) -> Self {
        Self { name: None, stages }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parse a definition: either a bare stage array or `{"name", "pipeline"}`
    pub fn from_json(value: &Value) -> Result<Self, AdvisorError> {
        match value {
            Value::Array(items) => Self::from_documents(items),
            Value::Object(map) => {
                let items = map.get("pipeline").and_then(Value::as_array).ok_or_else(|| {
                    AdvisorError::invalid_pipeline(
                        "definition has no 'pipeline' array",
                        "provide a stage array or an object with a 'pipeline' field",
                    )
                })?;
                let pipeline = Self::from_documents(items)?;
                Ok(match map.get("name").and_then(Value::as_str) {
                    Some(name) => pipeline.with_name(name),
                    None => pipeline,
                })
            }
            _ => Err(AdvisorError::invalid_pipeline(
                "definition is neither a stage array nor an object",
                "provide a stage array or an object with a 'pipeline' field",
            )),
        }
    }

    pub fn parse(text: &str) -> Result<Self, AdvisorError> {
        let value: Value = serde_json::from_str(text).map_err(|e| {
            AdvisorError::invalid_pipeline(
                format!("definition is not valid JSON: {}", e),
                "check the pipeline file for syntax errors",
            )
        })?;
        Self::from_json(&value)
    }

    fn from_documents(items: &[Value]) -> Result<Self, AdvisorError> {
        let stages = items
            .iter()
            .enumerate()
            .map(|(i, doc)| PipelineStage::from_document(doc, &format!("stage {}", i + 1)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(stages))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Every stage including embedded ones, depth first
    pub fn walk(&self) -> impl Iterator<Item = &PipelineStage> {
        self.stages.iter().flat_map(|s| s.walk())
    }

    /// Distinct connection names referenced anywhere in the pipeline
    pub fn connections(&self) -> BTreeSet<&str> {
        self.walk()
            .flat_map(|s| s.connections.iter().map(String::as_str))
            .collect()
    }

    /// Check the structural invariants of a top-level pipeline
    pub fn validate(&self) -> Result<(), AdvisorError> {
        let Some(first) = self.stages.first() else {
            return Err(AdvisorError::invalid_pipeline(
                "pipeline is empty",
                "add a $source stage followed by the processing stages",
            ));
        };

        if !first.kind.is_source() {
            return Err(AdvisorError::invalid_pipeline(
                format!("pipeline has no source stage (first stage is {})", first.operator),
                "pipeline has no source stage: start the pipeline with a $source stage",
            ));
        }

        if let Some(pos) = self.stages.iter().skip(1).position(|s| s.kind.is_source()) {
            return Err(AdvisorError::invalid_pipeline(
                format!("stage {} is a second source", pos + 2),
                "a processor reads from exactly one $source; remove the extra source stage",
            ));
        }

        let sinks: Vec<usize> = self
            .stages
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind.is_sink())
            .map(|(i, _)| i)
            .collect();

        if sinks.len() > 1 {
            return Err(AdvisorError::invalid_pipeline(
                format!("pipeline has {} sink stages", sinks.len()),
                "keep a single $merge or $emit stage at the end of the pipeline",
            ));
        }

        if let Some(&pos) = sinks.first() {
            if pos != self.stages.len() - 1 {
                return Err(AdvisorError::invalid_pipeline(
                    format!("sink stage {} ({}) is not the last stage", pos + 1, self.stages[pos].operator),
                    "move the $merge or $emit stage to the end of the pipeline",
                ));
            }
        }

        Ok(())
    }
}
