//! Agent-level streaming events.
//!
//! `AgentEvent` is what a [`Turn`](crate::Turn) yields to its consumer.

use starbot_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// Events emitted by the agent during one turn.
///
/// - `text`                    partial text from the model, in order
/// - `tool_call`               a finalized tool call about to run
/// - `confirmation_requested`  the loop is suspended on the gate
/// - `tool_result`             tool output (or error/denial marker)
/// - `usage`                   token counts for one request and in total
/// - `error`                   the turn ended abnormally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Text { content: String },

    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },

    ConfirmationRequested {
        id: String,
        name: String,
        arguments: String,
    },

    ToolResult {
        id: String,
        name: String,
        output: String,
    },

    Usage { request: Usage, cumulative: Usage },

    Error { message: String },
}

impl AgentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolCall { .. } => "tool_call",
            Self::ConfirmationRequested { .. } => "confirmation_requested",
            Self::ToolResult { .. } => "tool_result",
            Self::Usage { .. } => "usage",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_text() {
        let event = AgentEvent::Text {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"text""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn event_serialization_confirmation() {
        let event = AgentEvent::ConfirmationRequested {
            id: "call_1".into(),
            name: "shell_exec".into(),
            arguments: r#"{"command":"rm -rf build"}"#.into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"confirmation_requested""#));
        assert!(json.contains(r#""name":"shell_exec""#));
    }

    #[test]
    fn event_serialization_usage() {
        let u = Usage {
            prompt_tokens: 10,
            completion_tokens: 20,
            total_tokens: 30,
        };
        let event = AgentEvent::Usage {
            request: u,
            cumulative: u,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"usage""#));
        assert!(json.contains(r#""total_tokens":30"#));
    }

    #[test]
    fn event_type_names() {
        assert_eq!(AgentEvent::Text { content: "x".into() }.event_type(), "text");
        assert_eq!(
            AgentEvent::ToolResult {
                id: "a".into(),
                name: "b".into(),
                output: "c".into()
            }
            .event_type(),
            "tool_result"
        );
        assert_eq!(AgentEvent::Error { message: "x".into() }.event_type(), "error");
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"text","content":"hi"}"#;
        let event: AgentEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, AgentEvent::Text { content: "hi".into() });
    }
}
