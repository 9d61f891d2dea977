//! Contract between the execution core and the analysis tools it runs.

mod registry;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use toolkeep_commons::ErrorCategory;

pub use registry::ToolRegistry;

/// What a tool hands back: a result, an optional reported error, and an
/// optional replacement for its per-session state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

impl ToolOutput {
    pub fn ok(result: Value) -> Self {
        Self {
            result,
            ..Self::default()
        }
    }

    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    /// A reported failure that still carries partial data.
    pub fn failed(result: Value, error: impl Into<String>) -> Self {
        Self {
            result,
            error: Some(error.into()),
            state: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    /// Parameters were well-formed JSON but not what the tool needs
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("{0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ToolError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameters(message.into())
    }

    pub const fn category(&self) -> ErrorCategory {
        match self {
            ToolError::InvalidParameters(_) => ErrorCategory::Validation,
            ToolError::Failed(_) | ToolError::Io(_) | ToolError::Internal(_) => {
                ErrorCategory::ToolExecution
            }
        }
    }
}

/// A named operation the execution service can run against a session.
///
/// Tools are opaque to the core: the service never inspects `result`.
/// `state` is whatever the tool returned as its per-session state on the
/// previous successful call, if any.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn execute(&self, params: &Value, state: Option<&Value>) -> Result<ToolOutput, ToolError>;

    /// Schema tag for this tool's session state. Stored state with a
    /// different tag is discarded instead of being handed to the tool.
    fn state_schema(&self) -> Option<&str> {
        None
    }

    /// Whether results may be served from the cache.
    fn cacheable(&self) -> bool {
        true
    }

    /// Per-tool cache lifetime; `None` uses the configured default.
    fn cache_ttl(&self) -> Option<Duration> {
        None
    }
}
