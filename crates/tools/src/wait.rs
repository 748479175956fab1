//! Wait tool: pause for a bounded number of seconds.

use async_trait::async_trait;
use starbot_core::error::ToolError;
use starbot_core::tool::{Tool, ToolContext};
use std::time::Duration;

const MAX_WAIT_SECS: u64 = 300;

pub struct WaitTool;

#[async_trait]
impl Tool for WaitTool {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Pause for a number of seconds (0-300). Useful between checks while monitoring something."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "seconds": { "type": "number", "description": "Seconds to wait (0-300)" }
            },
            "required": ["seconds"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        let raw = arguments["seconds"]
            .as_f64()
            .filter(|s| s.is_finite())
            .ok_or_else(|| ToolError::InvalidArguments("seconds must be a number".into()))?;
        let secs = (raw.max(0.0) as u64).min(MAX_WAIT_SECS);
        tokio::time::sleep(Duration::from_secs(secs)).await;
        Ok(format!("Waited {secs} second(s)."))
    }
}
