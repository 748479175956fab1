//! Built-in tool implementations for StarBot.
//!
//! Tools give the agent the ability to interact with the machine:
//! run shell commands, read and write files, and pause between checks.
//! The unattended job tools live in `starbot-automation` and are added to
//! the same registry by the binary.

pub mod file_read;
pub mod file_write;
pub mod shell;
pub mod wait;

use starbot_core::tool::ToolRegistry;

pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use shell::ShellExecTool;
pub use wait::WaitTool;

/// Create a registry holding every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ShellExecTool));
    registry.register(Box::new(FileReadTool));
    registry.register(Box::new(FileWriteTool));
    registry.register(Box::new(WaitTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_contents() {
        let registry = default_registry();
        assert_eq!(registry.names(), vec!["file_read", "file_write", "shell_exec", "wait"]);
        assert!(registry.is_dangerous("shell_exec"));
        assert!(registry.is_dangerous("file_write"));
        assert!(!registry.is_dangerous("file_read"));
        assert!(!registry.is_dangerous("wait"));
    }
}
