//! The event type domain is an external collaborator (spec §1, §3): the core
//! only needs a type tag, a `validate()` predicate, and round-trippable
//! identity. `Event` is the minimal closed enumeration that stands in for it
//! (see SPEC_FULL.md §3) — just enough of the ag-ui vocabulary named in the
//! spec's own scenarios to exercise the codecs end to end.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Closed set of event kinds (spec §1: "message-start/content/end, tool
/// calls, state snapshots/deltas, run lifecycle, custom, raw").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageStart,
    TextMessageContent,
    MessageEnd,
    ToolCallStart,
    ToolCallArgs,
    ToolCallEnd,
    StateSnapshot,
    StateDelta,
    RunStarted,
    RunFinished,
    StepStarted,
    StepFinished,
    Custom,
    Raw,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::MessageStart => "message_start",
            EventKind::TextMessageContent => "text_message_content",
            EventKind::MessageEnd => "message_end",
            EventKind::ToolCallStart => "tool_call_start",
            EventKind::ToolCallArgs => "tool_call_args",
            EventKind::ToolCallEnd => "tool_call_end",
            EventKind::StateSnapshot => "state_snapshot",
            EventKind::StateDelta => "state_delta",
            EventKind::RunStarted => "run_started",
            EventKind::RunFinished => "run_finished",
            EventKind::StepStarted => "step_started",
            EventKind::StepFinished => "step_finished",
            EventKind::Custom => "custom",
            EventKind::Raw => "raw",
        };
        f.write_str(s)
    }
}

/// The opaque event value the codec runtime operates on. Immutable once
/// created (spec §3); identity for round-trip tests is plain `PartialEq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    MessageStart { message_id: String, role: String },
    TextMessageContent { message_id: String, delta: String },
    MessageEnd { message_id: String },
    ToolCallStart { tool_call_id: String, tool_name: String },
    ToolCallArgs { tool_call_id: String, delta: String },
    ToolCallEnd { tool_call_id: String },
    StateSnapshot { snapshot: serde_json::Value },
    StateDelta { patch: serde_json::Value },
    RunStarted { thread_id: String, run_id: String },
    RunFinished { thread_id: String, run_id: String },
    StepStarted { step_name: String },
    StepFinished { step_name: String },
    Custom { name: String, value: serde_json::Value },
    Raw { data: serde_json::Value },
}

impl Event {
    /// The closed-enumeration type tag (spec §3).
    pub fn kind(&self) -> EventKind {
        match self {
            Event::MessageStart { .. } => EventKind::MessageStart,
            Event::TextMessageContent { .. } => EventKind::TextMessageContent,
            Event::MessageEnd { .. } => EventKind::MessageEnd,
            Event::ToolCallStart { .. } => EventKind::ToolCallStart,
            Event::ToolCallArgs { .. } => EventKind::ToolCallArgs,
            Event::ToolCallEnd { .. } => EventKind::ToolCallEnd,
            Event::StateSnapshot { .. } => EventKind::StateSnapshot,
            Event::StateDelta { .. } => EventKind::StateDelta,
            Event::RunStarted { .. } => EventKind::RunStarted,
            Event::RunFinished { .. } => EventKind::RunFinished,
            Event::StepStarted { .. } => EventKind::StepStarted,
            Event::StepFinished { .. } => EventKind::StepFinished,
            Event::Custom { .. } => EventKind::Custom,
            Event::Raw { .. } => EventKind::Raw,
        }
    }

    /// `Validate() -> error?` (spec §3). Non-goal to validate application
    /// semantics beyond "required identifiers are non-empty".
    pub fn validate(&self) -> Result<(), ValidationError> {
        let empty = |field: &str| ValidationError::new(field, "", "must not be empty");
        match self {
            Event::MessageStart { message_id, .. } | Event::TextMessageContent { message_id, .. } | Event::MessageEnd { message_id } => {
                if message_id.is_empty() {
                    return Err(empty("message_id"));
                }
            }
            Event::ToolCallStart { tool_call_id, .. } | Event::ToolCallArgs { tool_call_id, .. } | Event::ToolCallEnd { tool_call_id } => {
                if tool_call_id.is_empty() {
                    return Err(empty("tool_call_id"));
                }
            }
            Event::RunStarted { thread_id, run_id } | Event::RunFinished { thread_id, run_id } => {
                if thread_id.is_empty() {
                    return Err(empty("thread_id"));
                }
                if run_id.is_empty() {
                    return Err(empty("run_id"));
                }
            }
            Event::StepStarted { step_name } | Event::StepFinished { step_name } => {
                if step_name.is_empty() {
                    return Err(empty("step_name"));
                }
            }
            Event::Custom { name, .. } => {
                if name.is_empty() {
                    return Err(empty("name"));
                }
            }
            Event::StateSnapshot { .. } | Event::StateDelta { .. } | Event::Raw { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_identifiers() {
        let e = Event::RunStarted { thread_id: String::new(), run_id: "r".into() };
        assert!(e.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_event() {
        let e = Event::TextMessageContent { message_id: "msg-1".into(), delta: "hello".into() };
        assert!(e.validate().is_ok());
        assert_eq!(e.kind(), EventKind::TextMessageContent);
    }
}
