//! Tools shipped with the toolkeep binary.

pub mod metrics;

use std::path::Path;
use std::sync::Arc;

use toolkeep_core::ToolRegistry;

pub use metrics::{FileMetrics, METRICS_TOOL, MetricsTool};

/// Registry holding every built-in tool, resolving relative paths against
/// `workspace`.
pub fn builtin_registry(workspace: &Path) -> ToolRegistry {
    ToolRegistry::new().with_tool(Arc::new(MetricsTool::new(workspace)))
}
