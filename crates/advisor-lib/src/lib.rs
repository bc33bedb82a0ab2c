//! Tier advisor library for stream processors
//!
//! This crate provides the core functionality for:
//! - Static complexity analysis of pipeline definitions
//! - Mapping complexity and observed load to resource tiers
//! - Live profiling of running processors
//! - Structured operation results and observability

pub mod advisor;
pub mod config;
pub mod error;
pub mod mapper;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod profiler;
pub mod report;

pub use advisor::{Advisor, ProfileOutcome, TierAdvice};
pub use config::AdvisorConfig;
pub use error::{AdvisorError, ErrorReport, SampleError};
pub use models::*;
pub use observability::{ProfilerMetrics, StructuredLogger};
pub use pipeline::{ComplexityScore, Pipeline};
pub use profiler::StatsSource;
pub use report::{OperationResult, OperationStatus};
