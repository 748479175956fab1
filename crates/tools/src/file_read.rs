//! File read tool: read text files, optionally a line range.

use async_trait::async_trait;
use starbot_core::error::ToolError;
use starbot_core::tool::{Tool, ToolContext};

const MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LINES: usize = 500;

pub struct FileReadTool;

fn numbered<'a>(lines: impl Iterator<Item = (usize, &'a str)>) -> String {
    lines
        .map(|(i, l)| format!("{}| {l}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a text file, optionally limited to a 1-based inclusive line range. Use this before file_write to understand file content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                },
                "start_line": {
                    "type": "number",
                    "description": "Start line (1-based, optional)"
                },
                "end_line": {
                    "type": "number",
                    "description": "End line (inclusive, optional)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let fail = |reason: String| ToolError::ExecutionFailed {
            tool_name: "file_read".into(),
            reason,
        };

        let meta = tokio::fs::metadata(path).await.map_err(|e| fail(format!("{path}: {e}")))?;
        if meta.len() > MAX_FILE_BYTES {
            return Err(fail(format!(
                "File too large ({} bytes). Use shell_exec with head/tail.",
                meta.len()
            )));
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| fail(format!("{path}: {e}")))?;
        let Ok(content) = String::from_utf8(bytes) else {
            return Ok(format!("[binary file] {path} ({} bytes)", meta.len()));
        };

        let start = arguments["start_line"].as_u64().map(|n| n.max(1) as usize);
        let end = arguments["end_line"].as_u64().map(|n| n as usize);

        if start.is_some() || end.is_some() {
            let s = start.unwrap_or(1) - 1;
            let e = end.unwrap_or(usize::MAX);
            return Ok(numbered(
                content.lines().enumerate().skip(s).take(e.saturating_sub(s)),
            ));
        }

        let total = content.lines().count();
        if total > MAX_LINES {
            return Ok(format!(
                "[{total} lines, showing first {MAX_LINES}]\n{}",
                numbered(content.lines().enumerate().take(MAX_LINES))
            ));
        }
        Ok(content)
    }
}
