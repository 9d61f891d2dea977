//! Error categorization shared by every stage of a tool execution.
//!
//! Every failure that reaches a caller is classified into one of these
//! categories. The category decides whether the caller may retry and
//! which wire name appears in the response envelope.
//!
//! # Categories
//!
//! - `BackendUnavailable` and `LockContention` are transient: the same
//!   request can succeed later without changes.
//! - `Validation` and `Serialization` are permanent for the given input.
//! - `ToolExecution` is whatever the tool itself reported and is never
//!   retried automatically.

use std::fmt;

/// Canonical error category attached to failed executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    // === Retryable (Transient) ===
    /// Shared backend unreachable or a backend command failed
    BackendUnavailable,
    /// Another holder owns the session lock
    LockContention,

    // === Non-Retryable (Permanent) ===
    /// The tool raised or returned an error
    #[serde(rename = "tool_execution_error")]
    ToolExecution,
    /// Session or cache payload could not be encoded or decoded
    #[serde(rename = "serialization_error")]
    Serialization,
    /// Malformed parameters, unknown tool, or empty identifiers
    #[serde(rename = "validation_error")]
    Validation,
    /// Caller cancelled the in-flight execution
    Cancelled,
}

impl ErrorCategory {
    /// Whether this error category is safe to retry.
    #[inline]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::BackendUnavailable | ErrorCategory::LockContention
        )
    }

    /// Stable snake_case identifier used on the wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::BackendUnavailable => "backend_unavailable",
            ErrorCategory::LockContention => "lock_contention",
            ErrorCategory::ToolExecution => "tool_execution_error",
            ErrorCategory::Serialization => "serialization_error",
            ErrorCategory::Validation => "validation_error",
            ErrorCategory::Cancelled => "cancelled",
        }
    }

    /// Get a concise, user-friendly label for this error category.
    pub const fn user_label(&self) -> &'static str {
        match self {
            ErrorCategory::BackendUnavailable => "Session backend unavailable",
            ErrorCategory::LockContention => "Session is busy",
            ErrorCategory::ToolExecution => "Tool execution failed",
            ErrorCategory::Serialization => "Stored data could not be decoded",
            ErrorCategory::Validation => "Invalid request",
            ErrorCategory::Cancelled => "Operation cancelled",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user_label())
    }
}
