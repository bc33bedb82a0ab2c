//! Live profiling of running processors
//!
//! A session pairs one [`MetricsSampler`], polling a [`StatsSource`] on a
//! spawned task, with one [`ProfileAggregator`] consuming its snapshots on
//! the caller's task. Sessions share nothing, so several processors can be
//! profiled concurrently.

mod aggregator;
mod sampler;
mod session;
pub mod stats;

#[cfg(test)]
mod tests;

pub use aggregator::{AggregateOutcome, ProfileAggregator};
pub use sampler::{MetricsSampler, SamplerBuilder, SamplerReport};
pub use session::ProfileSession;

use crate::error::SampleError;
use crate::models::ProcessorStats;

use async_trait::async_trait;

/// Source of processor statistics
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Fetch the current stats document of a processor
    async fn get_stats(&self, processor: &str) -> Result<ProcessorStats, SampleError>;
}
