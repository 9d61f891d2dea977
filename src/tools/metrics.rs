//! `metrics`: line, blank line, byte and character counts for one file.
//!
//! Parameters are `{"file": "<path>"}`; relative paths resolve against the
//! workspace root. The per-session state counts how many files the session
//! has measured.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use toolkeep_core::{Tool, ToolError, ToolOutput};

pub const METRICS_TOOL: &str = "metrics";
const STATE_SCHEMA: &str = "metrics.v1";
const CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetrics {
    pub lines: usize,
    pub blank_lines: usize,
    pub bytes: usize,
    pub chars: usize,
}

impl FileMetrics {
    pub fn measure(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut metrics = Self {
            bytes: bytes.len(),
            chars: text.chars().count(),
            ..Self::default()
        };
        for line in text.lines() {
            metrics.lines += 1;
            if line.trim().is_empty() {
                metrics.blank_lines += 1;
            }
        }
        metrics
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MetricsState {
    files_measured: u64,
}

#[derive(Debug, Deserialize)]
struct MetricsParams {
    file: String,
}

#[derive(Debug, Clone)]
pub struct MetricsTool {
    root: PathBuf,
}

impl MetricsTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl Tool for MetricsTool {
    fn name(&self) -> &str {
        METRICS_TOOL
    }

    fn description(&self) -> &str {
        "Count lines, blank lines, bytes and characters of a file"
    }

    fn state_schema(&self) -> Option<&str> {
        Some(STATE_SCHEMA)
    }

    fn cache_ttl(&self) -> Option<Duration> {
        Some(CACHE_TTL)
    }

    async fn execute(&self, params: &Value, state: Option<&Value>) -> Result<ToolOutput, ToolError> {
        let params: MetricsParams = serde_json::from_value(params.clone())
            .map_err(|err| ToolError::invalid(err.to_string()))?;
        if params.file.trim().is_empty() {
            return Err(ToolError::invalid("'file' must not be empty"));
        }

        let path = self.resolve(&params.file);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|err| ToolError::failed(format!("failed to read {}: {err}", path.display())))?;
        let metrics = FileMetrics::measure(&bytes);

        let mut session = state
            .and_then(|state| serde_json::from_value::<MetricsState>(state.clone()).ok())
            .unwrap_or_default();
        session.files_measured += 1;

        let result = json!({
            "file": params.file,
            "lines": metrics.lines,
            "blankLines": metrics.blank_lines,
            "bytes": metrics.bytes,
            "chars": metrics.chars,
        });
        Ok(ToolOutput::ok(result).with_state(json!({
            "filesMeasured": session.files_measured,
        })))
    }
}
