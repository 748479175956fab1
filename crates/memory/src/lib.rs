//! Conversation memory for StarBot.
//!
//! - [`ConversationMemory`]: the bounded, self-compacting message window
//!   the agent loop works against.
//! - [`ConversationStore`]: file-backed persistence of whole conversations
//!   so a chat can be listed and resumed later.

pub mod conversation;
pub mod history;

pub use conversation::{ConversationMemory, MemoryLimits, compact_tool_output};
pub use history::{ConversationStore, ConversationSummary};
