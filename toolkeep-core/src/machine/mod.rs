//! Lifecycle of one tool invocation within a session.
//!
//! [`apply`] is a pure transition function over [`MachineContext`]. The
//! execution service drives it and performs the actual tool call between
//! `Execute` and `ReceivedResult`/`Error`.
//!
//! ```text
//! idle ─SelectTool→ toolSelected ─SetParameters→ parametersSet ─Execute→ executing
//! executing ─ReceivedResult→ succeeded | ─Error→ failed | ─Cancel→ cancelled
//! succeeded/failed/cancelled ─SelectTool→ toolSelected, ─Reset→ idle
//! failed ─SetParameters→ parametersSet (retry without reselecting)
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MachineState {
    #[default]
    Idle,
    ToolSelected,
    ParametersSet,
    Executing,
    Succeeded,
    Failed,
    Cancelled,
}

impl MachineState {
    pub const fn as_str(self) -> &'static str {
        match self {
            MachineState::Idle => "idle",
            MachineState::ToolSelected => "toolSelected",
            MachineState::ParametersSet => "parametersSet",
            MachineState::Executing => "executing",
            MachineState::Succeeded => "succeeded",
            MachineState::Failed => "failed",
            MachineState::Cancelled => "cancelled",
        }
    }

    /// Events this state accepts.
    pub const fn accepted_events(self) -> &'static [EventKind] {
        match self {
            MachineState::Idle => &[EventKind::SelectTool],
            MachineState::ToolSelected => &[
                EventKind::SelectTool,
                EventKind::SetParameters,
                EventKind::Reset,
            ],
            MachineState::ParametersSet => &[
                EventKind::SelectTool,
                EventKind::SetParameters,
                EventKind::Execute,
                EventKind::Reset,
            ],
            MachineState::Executing => &[
                EventKind::ReceivedResult,
                EventKind::Error,
                EventKind::Cancel,
            ],
            MachineState::Succeeded | MachineState::Cancelled => {
                &[EventKind::SelectTool, EventKind::Reset]
            }
            MachineState::Failed => &[
                EventKind::SelectTool,
                EventKind::SetParameters,
                EventKind::Reset,
            ],
        }
    }

    #[inline]
    pub fn accepts(self, event: EventKind) -> bool {
        self.accepted_events().contains(&event)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            MachineState::Succeeded | MachineState::Failed | MachineState::Cancelled
        )
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload-free discriminant of [`MachineEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SelectTool,
    SetParameters,
    Execute,
    ReceivedResult,
    Error,
    Cancel,
    Reset,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::SelectTool => "SELECT_TOOL",
            EventKind::SetParameters => "SET_PARAMETERS",
            EventKind::Execute => "EXECUTE",
            EventKind::ReceivedResult => "RECEIVED_RESULT",
            EventKind::Error => "ERROR",
            EventKind::Cancel => "CANCEL",
            EventKind::Reset => "RESET",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineEvent {
    SelectTool { tool_name: String },
    SetParameters { params: Value },
    Execute,
    ReceivedResult { result: Value },
    Error { error: String },
    Cancel,
    Reset,
}

impl MachineEvent {
    pub const fn kind(&self) -> EventKind {
        match self {
            MachineEvent::SelectTool { .. } => EventKind::SelectTool,
            MachineEvent::SetParameters { .. } => EventKind::SetParameters,
            MachineEvent::Execute => EventKind::Execute,
            MachineEvent::ReceivedResult { .. } => EventKind::ReceivedResult,
            MachineEvent::Error { .. } => EventKind::Error,
            MachineEvent::Cancel => EventKind::Cancel,
            MachineEvent::Reset => EventKind::Reset,
        }
    }
}

/// One completed invocation, appended to the session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MachineContext {
    pub state: MachineState,
    pub tool_name: Option<String>,
    pub parameters: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub history: Vec<ExecutionRecord>,
}

impl MachineContext {
    /// Drop the oldest history entries beyond `max`.
    pub fn truncate_history(&mut self, max: usize) {
        if self.history.len() > max {
            let excess = self.history.len() - max;
            self.history.drain(..excess);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event {event} is not valid in state {from}")]
pub struct InvalidTransition {
    pub from: MachineState,
    pub event: EventKind,
}

/// Apply `event` to `ctx`, stamping history entries with the current time.
pub fn apply(ctx: &MachineContext, event: MachineEvent) -> Result<MachineContext, InvalidTransition> {
    apply_at(ctx, event, Utc::now())
}

/// [`apply`] with an explicit clock.
pub fn apply_at(
    ctx: &MachineContext,
    event: MachineEvent,
    now: DateTime<Utc>,
) -> Result<MachineContext, InvalidTransition> {
    let from = ctx.state;
    if !from.accepts(event.kind()) {
        return Err(InvalidTransition {
            from,
            event: event.kind(),
        });
    }

    let mut next = ctx.clone();
    match event {
        MachineEvent::SelectTool { tool_name } => {
            next.state = MachineState::ToolSelected;
            next.tool_name = Some(tool_name);
            next.parameters = None;
            next.result = None;
            next.error = None;
        }
        MachineEvent::SetParameters { params } => {
            next.state = MachineState::ParametersSet;
            next.parameters = Some(params);
            next.error = None;
        }
        MachineEvent::Execute => {
            next.state = MachineState::Executing;
            next.result = None;
            next.error = None;
        }
        MachineEvent::ReceivedResult { result } => {
            next.state = MachineState::Succeeded;
            next.history.push(ExecutionRecord {
                tool_name: next.tool_name.clone().unwrap_or_default(),
                result: Some(result.clone()),
                error: None,
                timestamp: now,
            });
            next.result = Some(result);
            next.error = None;
        }
        MachineEvent::Error { error } => {
            next.state = MachineState::Failed;
            next.history.push(ExecutionRecord {
                tool_name: next.tool_name.clone().unwrap_or_default(),
                result: None,
                error: Some(error.clone()),
                timestamp: now,
            });
            next.result = None;
            next.error = Some(error);
        }
        MachineEvent::Cancel => {
            next.state = MachineState::Cancelled;
        }
        MachineEvent::Reset => {
            next = MachineContext::default();
        }
    }
    Ok(next)
}
