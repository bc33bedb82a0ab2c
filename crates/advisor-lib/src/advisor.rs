//! Advisor facade
//!
//! Single entry point tying static analysis and live profiling together.
//! Static and dynamic evidence are reconciled here: metrics may raise a tier,
//! the pipeline structure sets the floor a tier may not drop below.

use crate::config::AdvisorConfig;
use crate::error::AdvisorError;
use crate::mapper::TierMapper;
use crate::models::{Basis, Confidence, ProfileSummary, Recommendation, SessionStatus};
use crate::observability::{ProfilerMetrics, StructuredLogger};
use crate::pipeline::{ComplexityScore, ComplexityScorer, Pipeline};
use crate::profiler::{AggregateOutcome, ProfileSession, SamplerReport, StatsSource};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Static analysis result
#[derive(Debug, Clone, Serialize)]
pub struct TierAdvice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    pub score: ComplexityScore,
    pub recommendation: Recommendation,
}

/// Result of profiling one processor
#[derive(Debug, Clone, Serialize)]
pub struct ProfileOutcome {
    pub processor: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ProfileSummary>,
    pub sampler: SamplerReport,
    /// Absent when the session was empty and no pipeline was supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
}

pub struct Advisor {
    config: AdvisorConfig,
    scorer: ComplexityScorer,
    mapper: TierMapper,
    metrics: ProfilerMetrics,
}

impl Advisor {
    pub fn new(config: AdvisorConfig) -> Self {
        let scorer = ComplexityScorer::new(config.weights.clone(), config.scoring.clone());
        let mapper = TierMapper::new(config.thresholds.clone(), config.dynamic.clone());
        Self {
            config,
            scorer,
            mapper,
            metrics: ProfilerMetrics::new(),
        }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub fn score(&self, pipeline: &Pipeline) -> Result<ComplexityScore, AdvisorError> {
        self.scorer.score(pipeline)
    }

    /// Score a pipeline and map it to a static recommendation
    pub fn tier_advise(&self, pipeline: &Pipeline) -> Result<TierAdvice, AdvisorError> {
        let score = self.scorer.score(pipeline)?;
        let recommendation = self.mapper.map_static(&score);
        self.issued("tier-advise", pipeline.name().unwrap_or("-"), &recommendation);
        Ok(TierAdvice {
            pipeline: pipeline.name().map(str::to_string),
            score,
            recommendation,
        })
    }

    /// Recommend a tier from whichever evidence is available
    pub fn advise(
        &self,
        pipeline: Option<&Pipeline>,
        summary: Option<&ProfileSummary>,
    ) -> Result<Recommendation, AdvisorError> {
        let recommendation = match (pipeline, summary) {
            (None, None) => return Err(AdvisorError::InsufficientInput),
            (Some(pipeline), None) => {
                let score = self.scorer.score(pipeline)?;
                self.mapper.map_static(&score)
            }
            (None, Some(summary)) => {
                let mut rec = self.mapper.map_dynamic(summary, None);
                rec.confidence = rec.confidence.min(Confidence::Medium);
                rec
            }
            (Some(pipeline), Some(summary)) => {
                let score = self.scorer.score(pipeline)?;
                let static_rec = self.mapper.map_static(&score);
                self.combine(static_rec, summary)
            }
        };

        let subject = summary
            .map(|s| s.processor.as_str())
            .or_else(|| pipeline.and_then(Pipeline::name))
            .unwrap_or("-");
        self.issued("advise", subject, &recommendation);
        Ok(recommendation)
    }

    fn combine(&self, static_rec: Recommendation, summary: &ProfileSummary) -> Recommendation {
        let mut dynamic = self.mapper.map_dynamic(summary, Some(static_rec.tier));

        let mut rationale = Vec::with_capacity(static_rec.rationale.len() + dynamic.rationale.len());
        rationale.extend(static_rec.rationale.into_iter().map(|l| format!("static: {}", l)));
        rationale.extend(dynamic.rationale.drain(..).map(|l| format!("dynamic: {}", l)));

        for flag in static_rec.flags {
            dynamic.flag(flag);
        }

        let confidence = if summary.sample_count >= self.config.dynamic.min_samples {
            Confidence::High
        } else {
            Confidence::Medium
        };

        Recommendation {
            basis: Basis::Combined,
            rationale,
            confidence,
            static_tier: static_rec.static_tier,
            ..dynamic
        }
    }

    /// Profile a running processor and recommend a tier
    ///
    /// The pipeline, when given, is scored before sampling starts so an
    /// invalid definition fails fast.
    pub async fn profile(
        &self,
        source: Arc<dyn StatsSource>,
        processor: &str,
        pipeline: Option<&Pipeline>,
        cancel: CancellationToken,
    ) -> Result<ProfileOutcome, AdvisorError> {
        if let Some(pipeline) = pipeline {
            self.scorer.score(pipeline)?;
        }

        info!(processor = %processor, "Starting profile");
        let session = ProfileSession::new(
            source,
            processor,
            self.config.sampler.clone(),
            self.config.aggregator.clone(),
        );
        let (outcome, report) = session.run(cancel).await;
        let status = outcome.status();

        let (summary, recommendation) = match outcome {
            AggregateOutcome::Summary(summary) => {
                let rec = self.advise(pipeline, Some(&summary))?;
                (Some(summary), Some(rec))
            }
            AggregateOutcome::Empty { .. } => match pipeline {
                Some(pipeline) => (None, Some(self.advise(Some(pipeline), None)?)),
                None => (None, None),
            },
        };

        Ok(ProfileOutcome {
            processor: processor.to_string(),
            status,
            summary,
            sampler: report,
            recommendation,
        })
    }

    fn issued(&self, operation: &str, subject: &str, recommendation: &Recommendation) {
        let basis = match recommendation.basis {
            Basis::Static => "static",
            Basis::Dynamic => "dynamic",
            Basis::Combined => "combined",
        };
        self.metrics.inc_recommendations(basis);
        StructuredLogger::new(subject).log_recommendation(operation, recommendation);
    }
}

impl Default for Advisor {
    fn default() -> Self {
        Self::new(AdvisorConfig::default())
    }
}
