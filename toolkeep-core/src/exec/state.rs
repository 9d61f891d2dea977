//! Typed view of the session state blob.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::machine::MachineContext;

/// Per-tool state kept across calls in one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolState {
    /// State of a tool that declares a schema tag.
    Tagged { schema: String, data: Value },
    /// State of a tool without a declared schema.
    Opaque { data: Value },
}

impl ToolState {
    pub fn new(schema: Option<&str>, data: Value) -> Self {
        match schema {
            Some(schema) => ToolState::Tagged {
                schema: schema.to_string(),
                data,
            },
            None => ToolState::Opaque { data },
        }
    }

    /// Data to hand to a tool declaring `schema`, or `None` when the stored
    /// tag no longer matches.
    pub fn data_for(&self, schema: Option<&str>) -> Option<&Value> {
        match (self, schema) {
            (ToolState::Tagged { schema: stored, data }, Some(expected)) if stored == expected => {
                Some(data)
            }
            (ToolState::Opaque { data }, None) => Some(data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionState {
    pub machine: MachineContext,
    pub tool_states: BTreeMap<String, ToolState>,
}

impl SessionState {
    pub fn decode(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Decode `value`, starting from an empty state when it does not parse.
    pub fn decode_or_default(session_id: &str, value: Value) -> Self {
        Self::decode(value).unwrap_or_else(|err| {
            warn!(session_id, error = %err, "session state undecodable, starting fresh");
            Self::default()
        })
    }

    pub fn encode(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Stored state for `tool_id`, dropping it with a warning when its schema
    /// tag does not match what the tool now declares.
    pub fn tool_state_for(&mut self, tool_id: &str, schema: Option<&str>) -> Option<Value> {
        let stored = self.tool_states.get(tool_id)?;
        if let Some(data) = stored.data_for(schema) {
            return Some(data.clone());
        }
        warn!(tool = tool_id, expected = ?schema, "discarding tool state with mismatched schema");
        self.tool_states.remove(tool_id);
        None
    }

    pub fn set_tool_state(&mut self, tool_id: &str, schema: Option<&str>, data: Value) {
        self.tool_states
            .insert(tool_id.to_string(), ToolState::new(schema, data));
    }
}
