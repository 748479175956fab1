//! The agent loop for StarBot.
//!
//! An [`Agent`] owns one conversation. Each user message becomes a
//! [`Turn`], which streams a completion, runs any requested tools (pausing
//! on the [`ConfirmationGate`] for dangerous ones) and loops until the model
//! answers with text only or the iteration bound is reached.

pub mod assembler;
pub mod confirm;
pub mod loop_runner;
pub mod prompt;
pub mod stream_event;

pub use assembler::ToolCallAssembler;
pub use confirm::ConfirmationGate;
pub use loop_runner::{Agent, DENIAL_MARKER, ERROR_MARKER, Turn};
pub use prompt::{CONTINUE_REMINDER, default_system_prompt};
pub use stream_event::AgentEvent;
