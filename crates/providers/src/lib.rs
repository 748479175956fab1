//! Completion provider implementations for StarBot.
//!
//! All providers implement the `starbot_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
