//! One profiling session: a sampler task feeding an aggregator

use super::aggregator::{AggregateOutcome, ProfileAggregator};
use super::sampler::{MetricsSampler, SamplerReport};
use super::StatsSource;
use crate::config::{AggregatorConfig, SamplerConfig};
use crate::models::SessionStatus;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::error;

pub struct ProfileSession {
    source: Arc<dyn StatsSource>,
    processor: String,
    sampler: SamplerConfig,
    aggregator: AggregatorConfig,
}

impl ProfileSession {
    pub fn new(
        source: Arc<dyn StatsSource>,
        processor: impl Into<String>,
        sampler: SamplerConfig,
        aggregator: AggregatorConfig,
    ) -> Self {
        Self {
            source,
            processor: processor.into(),
            sampler,
            aggregator,
        }
    }

    /// Sample until done or cancelled, then summarize
    pub async fn run(self, cancel: CancellationToken) -> (AggregateOutcome, SamplerReport) {
        let (sampler, snapshot_rx) =
            MetricsSampler::new(self.source, self.processor.clone(), self.sampler);
        let handle = tokio::spawn(sampler.run(cancel.clone()));

        let mut aggregator = ProfileAggregator::new(self.processor.clone(), self.aggregator);
        aggregator.consume(ReceiverStream::new(snapshot_rx)).await;

        let report = match handle.await {
            Ok(report) => report,
            Err(e) => {
                error!(processor = %self.processor, error = %e, "Sampler task failed");
                SamplerReport {
                    status: SessionStatus::Cancelled,
                    polls: 0,
                    snapshots: aggregator.sample_count(),
                    gaps: 0,
                    retries: 0,
                    current_tier: None,
                    elapsed_ms: 0,
                }
            }
        };

        (aggregator.finish(&report), report)
    }
}
