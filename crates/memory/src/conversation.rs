//! Bounded conversation window with history compaction.
//!
//! `ConversationMemory` owns the ordered message log of one chat session.
//! Every append is followed by a compaction check: when the number of
//! non-system messages exceeds the ceiling, the oldest excess messages are
//! dropped and folded into a single `[history_summary]` system message.

use starbot_core::message::{HISTORY_SUMMARY_TAG, Message, MessageToolCall, Role};
use tracing::debug;

const SUMMARY_LINE_CHARS: usize = 160;
const SUMMARY_MAX_LINES: usize = 18;
const SUMMARY_MAX_CHARS: usize = 2000;

/// Limits applied by [`ConversationMemory`].
#[derive(Debug, Clone, Copy)]
pub struct MemoryLimits {
    /// Ceiling on non-system messages
    pub max_history_messages: usize,
    /// Tool outputs longer than this are stored as head + tail excerpts
    pub max_tool_output_chars: usize,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            max_history_messages: 80,
            max_tool_output_chars: 2400,
        }
    }
}

/// The message log for one conversation.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    messages: Vec<Message>,
    limits: MemoryLimits,
}

impl ConversationMemory {
    pub fn new(limits: MemoryLimits) -> Self {
        Self {
            messages: Vec::new(),
            limits,
        }
    }

    /// Start the log with a system prompt.
    pub fn with_system_prompt(limits: MemoryLimits, prompt: impl Into<String>) -> Self {
        let mut memory = Self::new(limits);
        memory.messages.push(Message::system(prompt));
        memory
    }

    pub fn limits(&self) -> MemoryLimits {
        self.limits
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn non_system_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role != Role::System).count()
    }

    /// The live history summary, if compaction has ever run.
    pub fn history_summary(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_history_summary())
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
        self.compact();
    }

    pub fn add_system(&mut self, content: impl Into<String>) {
        self.messages.push(Message::system(content));
    }

    /// Append a final assistant reply with no tool calls.
    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
        self.compact();
    }

    /// Append an assistant message that requests tool calls.
    pub fn add_assistant_tool_calls(&mut self, content: Option<String>, calls: Vec<MessageToolCall>) {
        self.messages.push(Message::assistant_tool_calls(content, calls));
        self.compact();
    }

    /// Append a tool result, truncating oversized output.
    pub fn add_tool_result(&mut self, tool_call_id: impl Into<String>, output: &str) {
        let content = compact_tool_output(output, self.limits.max_tool_output_chars);
        self.messages.push(Message::tool_result(tool_call_id, content));
        self.compact();
    }

    /// Replace the whole log (used when resuming a saved conversation).
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.compact();
    }

    /// Drop everything except system messages.
    pub fn clear(&mut self) {
        self.messages.retain(|m| m.role == Role::System);
    }

    /// Enforce the non-system ceiling.
    ///
    /// Tool results whose assistant message was dropped are dropped with it,
    /// so the surviving window never starts with an orphaned tool message.
    pub fn compact(&mut self) {
        let non_system = self.non_system_count();
        let max = self.limits.max_history_messages;
        if non_system <= max {
            return;
        }

        let mut to_drop = non_system - max;
        let mut dropped = Vec::new();
        let mut kept = Vec::with_capacity(self.messages.len());
        let mut prior_summary = None;

        for message in std::mem::take(&mut self.messages) {
            if message.is_history_summary() {
                prior_summary = Some(message);
                continue;
            }
            if message.role == Role::System {
                kept.push(message);
                continue;
            }
            if to_drop > 0 || (message.role == Role::Tool && !dropped.is_empty() && !has_non_system(&kept)) {
                to_drop = to_drop.saturating_sub(1);
                dropped.push(message);
                continue;
            }
            kept.push(message);
        }

        let summary = build_summary(prior_summary.as_ref(), &dropped);
        debug!(dropped = dropped.len(), kept = kept.len(), "Compacted conversation history");

        let insert_at = kept.iter().take_while(|m| m.role == Role::System).count();
        kept.insert(insert_at, Message::system(format!("{HISTORY_SUMMARY_TAG}\n{summary}")));
        self.messages = kept;
    }
}

fn has_non_system(messages: &[Message]) -> bool {
    messages.iter().any(|m| m.role != Role::System)
}

/// Fold the dropped messages (after any prior summary lines) into a bounded
/// plain-text digest. Never empty: turns with nothing quotable collapse into
/// a count line.
fn build_summary(prior: Option<&Message>, dropped: &[Message]) -> String {
    let mut lines: Vec<String> = prior
        .map(|m| {
            m.text()
                .lines()
                .skip(1)
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut quoted = 0;
    for message in dropped {
        if message.role == Role::Tool {
            continue;
        }
        let mut text = message.text().split_whitespace().collect::<Vec<_>>().join(" ");
        if !message.tool_calls.is_empty() {
            let names: Vec<&str> = message.tool_calls.iter().map(|c| c.name.as_str()).collect();
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&format!("[tool calls: {}]", names.join(", ")));
        }
        if text.is_empty() {
            continue;
        }
        let clipped: String = text.chars().take(SUMMARY_LINE_CHARS).collect();
        lines.push(format!("{}: {clipped}", message.role.as_str()));
        quoted += 1;
    }

    if quoted == 0 && !dropped.is_empty() {
        lines.push(format!("({} earlier messages omitted)", dropped.len()));
    }

    if lines.len() > SUMMARY_MAX_LINES {
        lines.drain(..lines.len() - SUMMARY_MAX_LINES);
    }

    lines.join("\n").chars().take(SUMMARY_MAX_CHARS).collect()
}

/// Replace oversized tool output with head and tail excerpts.
pub fn compact_tool_output(output: &str, max_chars: usize) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output.to_string();
    }

    let head_len = max_chars * 7 / 12;
    let tail_len = max_chars / 4;
    let head: String = output.chars().take(head_len).collect();
    let tail: String = output.chars().skip(total - tail_len).collect();
    let omitted = total - head_len - tail_len;
    format!("{head}\n\n...[tool output compressed {omitted} chars]...\n\n{tail}")
}
