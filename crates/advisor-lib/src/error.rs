//! Error types for the tier advisor
//!
//! - [`AdvisorError`]: fatal errors from pure computation (pipeline validation,
//!   facade input checks)
//! - [`SampleError`]: failures of a single stats poll; absorbed by the sampler
//!   as retries and gaps, never surfaced as a crashed session
//!
//! Unknown stage kinds and empty sessions are not errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal advisor errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdvisorError {
    /// The pipeline violates a structural invariant
    #[error("invalid pipeline: {reason}")]
    InvalidPipeline {
        reason: String,
        hint: String,
    },

    /// Neither a pipeline nor a profile summary was supplied
    #[error("insufficient input: a pipeline definition or a profile summary is required")]
    InsufficientInput,
}

impl AdvisorError {
    pub fn invalid_pipeline(reason: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::InvalidPipeline {
            reason: reason.into(),
            hint: hint.into(),
        }
    }

    /// Stable label for machine consumers
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPipeline { .. } => "InvalidPipeline",
            Self::InsufficientInput => "InsufficientInput",
        }
    }

    pub fn remediation(&self) -> String {
        match self {
            Self::InvalidPipeline { hint, .. } => hint.clone(),
            Self::InsufficientInput => {
                "pass a processor name or --file for static analysis, or profile a running processor"
                    .to_string()
            }
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind().to_string(),
            message: self.to_string(),
            remediation: Some(self.remediation()),
        }
    }
}

/// Failure of one stats poll
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SampleError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("stats request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("stats API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode stats document: {0}")]
    Decode(String),

    #[error("processor '{0}' not found")]
    NotFound(String),
}

impl SampleError {
    /// Whether another attempt within the same poll may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::NotFound(_) => false,
        }
    }
}

/// Structured error object embedded in operation results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorReport {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            remediation: None,
        }
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }
}

impl From<&AdvisorError> for ErrorReport {
    fn from(err: &AdvisorError) -> Self {
        err.report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pipeline_report_carries_hint() {
        let err = AdvisorError::invalid_pipeline("no source stage", "pipeline has no source stage");
        let report = err.report();
        assert_eq!(report.kind, "InvalidPipeline");
        assert!(report.message.contains("no source stage"));
        assert_eq!(report.remediation.as_deref(), Some("pipeline has no source stage"));
    }

    #[test]
    fn test_insufficient_input_label() {
        assert_eq!(AdvisorError::InsufficientInput.kind(), "InsufficientInput");
        assert!(AdvisorError::InsufficientInput.remediation().contains("profile"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(SampleError::Transport("reset".into()).is_transient());
        assert!(SampleError::Timeout { timeout_ms: 5000 }.is_transient());
        assert!(SampleError::Status { status: 503, body: String::new() }.is_transient());
        assert!(SampleError::Status { status: 429, body: String::new() }.is_transient());
        assert!(!SampleError::Status { status: 401, body: String::new() }.is_transient());
        assert!(!SampleError::NotFound("p".into()).is_transient());
    }
}
