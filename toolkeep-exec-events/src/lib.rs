//! Response envelope returned to callers of the toolkeep execution server.
//!
//! The calling layer (CLI, stdio loop, or an embedding application) wraps
//! every execution outcome into a [`ResponseEnvelope`]. Consumers can
//! deserialize these structures without depending on `toolkeep-core`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolkeep_commons::ErrorCategory;

/// Semantic version of the serialized envelope schema exported by this crate.
pub const ENVELOPE_SCHEMA_VERSION: &str = "0.1.0";

/// Outcome reported at the top of every envelope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
    /// The call produced data but could not complete every step
    /// (for example the session write failed after the tool returned).
    Partial,
}

/// Structured error carried by `error` and `partial` envelopes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub category: ErrorCategory,
    pub message: String,
    pub retryable: bool,
}

impl ErrorBody {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            retryable: category.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    pub tool: String,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub from_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
}

fn default_schema_version() -> String {
    ENVELOPE_SCHEMA_VERSION.to_string()
}

impl EnvelopeMetadata {
    pub fn new(tool: impl Into<String>, execution_time_ms: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            tool: tool.into(),
            execution_time_ms,
            timestamp,
            from_cache: false,
            execution_id: None,
            schema_version: default_schema_version(),
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn with_from_cache(mut self, from_cache: bool) -> Self {
        self.from_cache = from_cache;
        self
    }
}

/// Session the response belongs to, so callers can continue it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeContext {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub metadata: EnvelopeMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<EnvelopeContext>,
}

impl ResponseEnvelope {
    pub fn success(data: Value, metadata: EnvelopeMetadata) -> Self {
        Self {
            status: ResponseStatus::Success,
            data: Some(data),
            error: None,
            metadata,
            context: None,
        }
    }

    pub fn error(error: ErrorBody, metadata: EnvelopeMetadata) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: None,
            error: Some(error),
            metadata,
            context: None,
        }
    }

    pub fn partial(data: Value, error: ErrorBody, metadata: EnvelopeMetadata) -> Self {
        Self {
            status: ResponseStatus::Partial,
            data: Some(data),
            error: Some(error),
            metadata,
            context: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.context = Some(EnvelopeContext {
            session_id: session_id.into(),
        });
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn session_id(&self) -> Option<&str> {
        self.context.as_ref().map(|ctx| ctx.session_id.as_str())
    }
}

/// JSON helper utilities for serializing and deserializing envelopes.
#[cfg(feature = "serde-json")]
pub mod json {
    use super::ResponseEnvelope;

    /// Converts an envelope into a `serde_json::Value`.
    pub fn to_value(envelope: &ResponseEnvelope) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(envelope)
    }

    /// Serializes an envelope into a single-line JSON string.
    pub fn to_string(envelope: &ResponseEnvelope) -> serde_json::Result<String> {
        serde_json::to_string(envelope)
    }

    /// Deserializes an envelope from a JSON string.
    pub fn from_str(payload: &str) -> serde_json::Result<ResponseEnvelope> {
        serde_json::from_str(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn metadata() -> EnvelopeMetadata {
        let timestamp = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp");
        EnvelopeMetadata::new("metrics", 12, timestamp)
    }

    #[test]
    fn success_envelope_wire_shape() {
        let envelope =
            ResponseEnvelope::success(json!({"lines": 3}), metadata()).with_session("s-1");
        let value = json::to_value(&envelope).expect("serialize envelope");

        assert_eq!(
            value,
            json!({
                "status": "success",
                "data": {"lines": 3},
                "metadata": {
                    "tool": "metrics",
                    "executionTimeMs": 12,
                    "timestamp": "2024-05-01T12:00:00Z",
                    "fromCache": false,
                    "schemaVersion": ENVELOPE_SCHEMA_VERSION,
                },
                "context": {"sessionId": "s-1"},
            })
        );
    }

    #[test]
    fn error_envelope_carries_category() {
        let body = ErrorBody::new(ErrorCategory::LockContention, "session s-1 is locked");
        let envelope = ResponseEnvelope::error(body, metadata());
        let value = json::to_value(&envelope).expect("serialize envelope");

        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["category"], "lock_contention");
        assert_eq!(value["error"]["retryable"], true);
        assert!(value.get("data").is_none());
        assert!(value.get("context").is_none());
    }

    #[test]
    fn partial_envelope_round_trips() {
        let body = ErrorBody::new(ErrorCategory::BackendUnavailable, "write failed");
        let envelope = ResponseEnvelope::partial(json!([1, 2]), body, metadata())
            .with_session("abc");
        let encoded = json::to_string(&envelope).expect("serialize");
        let decoded = json::from_str(&encoded).expect("deserialize");

        assert_eq!(decoded, envelope);
        assert_eq!(decoded.session_id(), Some("abc"));
        assert!(!decoded.is_success());
    }
}
