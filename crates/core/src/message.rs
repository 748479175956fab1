//! Message and conversation record domain types.
//!
//! These are the value objects that flow through the agent loop:
//! user text → assistant reply (possibly carrying tool calls) → tool results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content prefix that tags the single live history-summary system message.
pub const HISTORY_SUMMARY_TAG: &str = "[history_summary]";

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions (identity, rules, history summaries)
    System,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content (absent for assistant messages that only call tools)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Tool calls requested by the assistant, in stream order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, Some(content.into()))
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, Some(content.into()))
    }

    /// Create an assistant message. Empty text is stored as `None`.
    pub fn assistant(content: impl Into<String>) -> Self {
        let text = content.into();
        Self::new(Role::Assistant, (!text.is_empty()).then_some(text))
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<MessageToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content.filter(|t| !t.is_empty()))
        }
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, Some(content.into()))
        }
    }

    /// The text content, or `""` when absent.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Whether this is the compaction summary injected by the memory manager.
    pub fn is_history_summary(&self) -> bool {
        self.role == Role::System && self.text().starts_with(HISTORY_SUMMARY_TAG)
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Opaque id assigned by the completion stream
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as the JSON text the model produced
    pub arguments: String,
}

impl MessageToolCall {
    /// Parse the accumulated argument text. Empty text means `{}`.
    pub fn parse_arguments(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.arguments)
    }
}

/// A persisted conversation: the document written per conversation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,

    /// Human-readable title, derived from the first user message by default
    pub title: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub messages: Vec<Message>,
}

impl ConversationRecord {
    /// Derive a title from the first user message.
    pub fn derive_title(messages: &[Message]) -> String {
        let raw = messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.text().split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();
        let title: String = raw.chars().take(64).collect();
        if title.is_empty() {
            "New Conversation".into()
        } else {
            title
        }
    }
}
