//! File write tool: overwrite a file or patch one occurrence in place.

use async_trait::async_trait;
use starbot_core::error::ToolError;
use starbot_core::tool::{Tool, ToolContext};
use std::path::Path;

pub struct FileWriteTool;

fn fail(reason: impl Into<String>) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "file_write".into(),
        reason: reason.into(),
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write or patch a file. mode=\"write\" overwrites the whole file. mode=\"patch\" replaces the first occurrence of old_string with new_string."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The file path" },
                "content": { "type": "string", "description": "Full content (write mode)" },
                "mode": { "type": "string", "enum": ["write", "patch"], "description": "Defaults to write" },
                "old_string": { "type": "string", "description": "Text to find (patch mode)" },
                "new_string": { "type": "string", "description": "Replacement (patch mode)" }
            },
            "required": ["path"]
        })
    }

    fn dangerous(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: serde_json::Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let mode = arguments["mode"].as_str().unwrap_or("write");

        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| fail(e.to_string()))?;
        }

        match mode {
            "patch" => {
                let old = arguments["old_string"]
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ToolError::InvalidArguments("Missing 'old_string' argument".into()))?;
                let new = arguments["new_string"].as_str().unwrap_or("");
                let src = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| fail(format!("{path}: {e}")))?;
                if !src.contains(old) {
                    return Err(fail("old_string not found in file"));
                }
                tokio::fs::write(path, src.replacen(old, new, 1))
                    .await
                    .map_err(|e| fail(e.to_string()))?;
                Ok(format!("Patched {path}"))
            }
            "write" => {
                let content = arguments["content"]
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
                tokio::fs::write(path, content).await.map_err(|e| fail(e.to_string()))?;
                Ok(format!("Written {} chars to {path}", content.chars().count()))
            }
            other => Err(ToolError::InvalidArguments(format!("Unknown mode '{other}'"))),
        }
    }
}
