//! Operation result envelope
//!
//! Every CLI operation prints one `OperationResult` so consumers can parse
//! success and failure the same way.

use crate::error::{AdvisorError, ErrorReport};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationResult<T> {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub status: OperationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl<T> OperationResult<T> {
    pub fn success(operation: impl Into<String>, result: T) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.into(),
            status: OperationStatus::Success,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(operation: impl Into<String>, error: ErrorReport) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.into(),
            status: OperationStatus::Error,
            result: None,
            error: Some(error),
        }
    }

    pub fn from_result(operation: impl Into<String>, result: Result<T, AdvisorError>) -> Self {
        match result {
            Ok(value) => Self::success(operation, value),
            Err(e) => Self::failure(operation, e.report()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_success_envelope_shape() {
        let envelope = OperationResult::success("tier-advise", json!({"tier": "SP10"}));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["operation"], "tier-advise");
        assert_eq!(value["status"], "success");
        assert_eq!(value["result"]["tier"], "SP10");
        assert!(value.get("error").is_none());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_error_envelope_shape() {
        let envelope: OperationResult<Value> =
            OperationResult::from_result("profile", Err(AdvisorError::InsufficientInput));
        assert!(!envelope.is_success());
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["kind"], "InsufficientInput");
        assert!(value["error"]["remediation"].is_string());
        assert!(value.get("result").is_none());
    }
}
