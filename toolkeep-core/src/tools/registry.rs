use std::collections::BTreeMap;
use std::sync::Arc;

use super::Tool;

/// Tools available to the execution service, by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool` under its own name, replacing any previous tool with
    /// that name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        self.tools.insert(tool.name().to_string(), tool)
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolError, ToolOutput};
    use async_trait::async_trait;
    use serde_json::Value;

    struct Echo(&'static str);

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(&self, params: &Value, _: Option<&Value>) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::ok(params.clone()))
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = ToolRegistry::new()
            .with_tool(Arc::new(Echo("b")))
            .with_tool(Arc::new(Echo("a")));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("a"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn reregistering_replaces() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register(Arc::new(Echo("a"))).is_none());
        assert!(registry.register(Arc::new(Echo("a"))).is_some());
        assert_eq!(registry.len(), 1);
    }
}
