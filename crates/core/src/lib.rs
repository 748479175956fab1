//! # StarBot Core
//!
//! Domain types, traits, and error definitions shared by the StarBot agent
//! and its unattended automation daemon.
//!
//! ## Design Philosophy
//!
//! Every collaborator the agent loop or the scheduler talks to is defined as
//! a trait here (completion service, tools). Implementations live in their
//! respective crates and are injected through constructors, so there is no
//! ambient global registry anywhere in the workspace.

pub mod error;
pub mod event;
pub mod message;
pub mod persist;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{ConversationRecord, HISTORY_SUMMARY_TAG, Message, MessageToolCall, Role};
pub use provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta, Usage,
};
pub use tool::{Tool, ToolContext, ToolDefinition, ToolRegistry};
