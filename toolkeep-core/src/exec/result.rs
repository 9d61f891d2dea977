use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use toolkeep_commons::ErrorCategory;
use toolkeep_exec_events::{EnvelopeMetadata, ErrorBody, ResponseEnvelope};

use crate::session::StoreError;

const fn default_use_cache() -> bool {
    true
}

/// One call into the execution service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    #[serde(alias = "tool")]
    pub tool_id: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

impl ExecutionRequest {
    pub fn new(tool_id: impl Into<String>, params: Value) -> Self {
        Self {
            tool_id: tool_id.into(),
            params,
            session_id: None,
            use_cache: true,
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// Categorized failure returned by the service instead of propagating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{category}: {message}")]
pub struct ExecutionError {
    pub category: ErrorCategory,
    pub message: String,
    pub retryable: bool,
}

impl ExecutionError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            retryable: category.is_retryable(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, message)
    }

    pub fn lock_contention(session_id: &str) -> Self {
        Self::new(
            ErrorCategory::LockContention,
            format!("session '{session_id}' is locked by another call"),
        )
    }

    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorCategory::BackendUnavailable, err.to_string())
    }
}

impl From<StoreError> for ExecutionError {
    fn from(err: StoreError) -> Self {
        Self::new(err.category(), err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub execution_id: String,
    pub tool_id: String,
    pub session_id: String,
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    pub status: ExecutionStatus,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub from_cache: bool,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    /// Wrap this result for the calling layer.
    ///
    /// Succeeded maps to `success`; a failure that still carries a result
    /// maps to `partial`; everything else maps to `error`.
    pub fn to_envelope(&self) -> ResponseEnvelope {
        let metadata = EnvelopeMetadata::new(&self.tool_id, self.execution_time_ms, self.timestamp)
            .with_execution_id(&self.execution_id)
            .with_from_cache(self.from_cache);

        let error_body = || {
            let error = self.error.clone().unwrap_or_else(|| {
                ExecutionError::new(ErrorCategory::ToolExecution, "execution did not succeed")
            });
            ErrorBody {
                category: error.category,
                message: error.message,
                retryable: error.retryable,
            }
        };

        let envelope = match (self.status, &self.result) {
            (ExecutionStatus::Succeeded, result) => {
                ResponseEnvelope::success(result.clone().unwrap_or(Value::Null), metadata)
            }
            (ExecutionStatus::Failed, Some(result)) if !result.is_null() => {
                ResponseEnvelope::partial(result.clone(), error_body(), metadata)
            }
            _ => ResponseEnvelope::error(error_body(), metadata),
        };
        envelope.with_session(&self.session_id)
    }
}
