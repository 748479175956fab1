//! Reassembly of streamed tool-call fragments.

use starbot_core::message::MessageToolCall;
use starbot_core::provider::ToolCallDelta;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Collects [`ToolCallDelta`]s by stream index until the stream ends.
///
/// `id` and `name` take the latest non-empty value seen for an index;
/// argument fragments are concatenated in arrival order. Nothing is parsed
/// here: argument text is only valid JSON once every fragment has arrived.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: BTreeMap<usize, PartialCall>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &ToolCallDelta) {
        let call = self.calls.entry(delta.index).or_default();
        if let Some(id) = delta.id.as_deref().filter(|s| !s.is_empty()) {
            call.id = id.to_string();
        }
        if let Some(name) = delta.name.as_deref().filter(|s| !s.is_empty()) {
            call.name = name.to_string();
        }
        if let Some(args) = &delta.arguments {
            call.arguments.push_str(args);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Finalize in index order. Calls that never received an id get a
    /// synthetic `call_<index>` so tool results can still reference them.
    pub fn finish(self) -> Vec<MessageToolCall> {
        self.calls
            .into_iter()
            .map(|(index, call)| MessageToolCall {
                id: if call.id.is_empty() {
                    format!("call_{index}")
                } else {
                    call.id
                },
                name: call.name,
                arguments: call.arguments,
            })
            .collect()
    }
}
