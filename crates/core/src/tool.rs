//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! execute shell commands, read/write files, register unattended jobs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ToolError;

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Per-invocation context handed to every tool.
///
/// Tools that need to know which conversation asked for them (for example to
/// tag a registered job with its origin) read it from here and fail closed
/// when it is absent.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub conversation_id: Option<String>,
}

impl ToolContext {
    pub fn for_conversation(id: impl Into<String>) -> Self {
        Self {
            conversation_id: Some(id.into()),
        }
    }

    /// The originating conversation id, or `MissingContext`.
    pub fn require_conversation_id(&self) -> std::result::Result<&str, ToolError> {
        self.conversation_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ToolError::MissingContext("origin conversation id".into()))
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "shell_exec", "file_read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Whether invoking this tool needs user confirmation when the gate is on.
    fn dangerous(&self) -> bool {
        false
    }

    /// Execute the tool with parsed arguments, returning its textual output.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> std::result::Result<String, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Look up and execute tools when the model requests them
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Whether the named tool is flagged dangerous. Unknown tools are not.
    pub fn is_dangerous(&self, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.dangerous())
    }

    /// All tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Parse `arguments` as JSON and run the named tool.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: &str,
        ctx: &ToolContext,
    ) -> std::result::Result<String, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let args = if arguments.trim().is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))?
        };
        tool.execute(args, ctx).await
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
