//! Shell tool: execute system commands.
//!
//! Runs through `sh -c` (or `cmd /C` on Windows) with an optional working
//! directory and a timeout.

use async_trait::async_trait;
use starbot_core::error::ToolError;
use starbot_core::tool::{Tool, ToolContext};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const MAX_OUTPUT_CHARS: usize = 50_000;

pub struct ShellExecTool;

#[async_trait]
impl Tool for ShellExecTool {
    fn name(&self) -> &str {
        "shell_exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout/stderr. Use for running programs, git, file management, and system inspection."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory (optional)"
                },
                "timeout": {
                    "type": "number",
                    "description": "Timeout in seconds (default 120)"
                }
            },
            "required": ["command"]
        })
    }

    fn dangerous(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: serde_json::Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        let command = arguments["command"]
            .as_str()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;
        let timeout_secs = arguments["timeout"]
            .as_f64()
            .filter(|t| *t > 0.0)
            .map(|t| t.ceil() as u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        if let Some(cwd) = arguments["cwd"].as_str().filter(|c| !c.is_empty()) {
            cmd.current_dir(cwd);
        }
        cmd.kill_on_drop(true);

        debug!(command = %command, timeout_secs, "Executing shell command");

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "shell_exec".into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ToolError::Timeout {
                    tool_name: "shell_exec".into(),
                    timeout_secs,
                });
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            text.push_str("\n[stderr]\n");
            text.push_str(&stderr);
        }
        if let Some(code) = output.status.code().filter(|c| *c != 0) {
            warn!(command = %command, exit_code = code, "Command failed");
            text.push_str(&format!("\n[exit code: {code}]"));
        }

        if text.trim().is_empty() {
            return Ok("(no output)".into());
        }
        Ok(text.chars().take(MAX_OUTPUT_CHARS).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_echo() {
        let out = ShellExecTool
            .execute(serde_json::json!({"command": "echo hello"}), &ToolContext::default())
            .await
            .unwrap();
        assert!(out.contains("hello"));
    }

    #[tokio::test]
    async fn missing_command_rejected() {
        let result = ShellExecTool.execute(serde_json::json!({}), &ToolContext::default()).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_and_stderr_reported() {
        let out = ShellExecTool
            .execute(serde_json::json!({"command": "echo oops >&2; exit 3"}), &ToolContext::default())
            .await
            .unwrap();
        assert!(out.contains("[stderr]"));
        assert!(out.contains("oops"));
        assert!(out.contains("[exit code: 3]"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_in_cwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let out = ShellExecTool
            .execute(
                serde_json::json!({"command": "ls", "cwd": dir.path().to_str().unwrap()}),
                &ToolContext::default(),
            )
            .await
            .unwrap();
        assert!(out.contains("marker.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_enforced() {
        let result = ShellExecTool
            .execute(serde_json::json!({"command": "sleep 5", "timeout": 1}), &ToolContext::default())
            .await;
        assert!(matches!(result, Err(ToolError::Timeout { timeout_secs: 1, .. })));
    }

    #[test]
    fn flagged_dangerous() {
        assert!(ShellExecTool.dangerous());
    }
}
