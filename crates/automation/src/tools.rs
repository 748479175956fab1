//! Tools that let the agent register and manage unattended jobs.

use async_trait::async_trait;
use serde_json::{Value, json};
use starbot_core::error::{StoreError, ToolError};
use starbot_core::tool::{Tool, ToolContext, ToolRegistry};
use std::sync::Arc;

use crate::escalation::{EscalationCondition, EscalationPolicy};
use crate::store::{DaemonStateStore, NewFileDeleteTask, TaskPatch, TaskStatus, TaskStore};

fn invalid(message: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments(message.into())
}

fn store_error(tool: &str, e: StoreError) -> ToolError {
    match e {
        StoreError::Invalid(reason) => ToolError::InvalidArguments(reason),
        other => ToolError::ExecutionFailed {
            tool_name: tool.into(),
            reason: other.to_string(),
        },
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid(format!("{key} is required")))
}

fn opt_bool(args: &Value, key: &str) -> Option<bool> {
    args.get(key).and_then(Value::as_bool)
}

/// Integer-ish numeric argument. Present but non-numeric is an error.
fn opt_int(args: &Value, key: &str) -> Result<Option<i64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .filter(|n| n.is_finite())
            .map(|n| Some(n.trunc() as i64))
            .ok_or_else(|| invalid(format!("{key} must be a number"))),
    }
}

/// Merge `ai_*` arguments over `base`. `None` when no `ai_*` key is present.
fn escalation_from_args(args: &Value, base: Option<&EscalationPolicy>) -> Result<Option<EscalationPolicy>, ToolError> {
    let keys = ["ai_enabled", "ai_condition", "ai_threshold", "ai_decision_required"];
    if !keys.iter().any(|k| args.get(k).is_some_and(|v| !v.is_null())) {
        return Ok(None);
    }

    let mut policy = base.cloned().unwrap_or_default();
    if let Some(enabled) = opt_bool(args, "ai_enabled") {
        policy.enabled = enabled;
    }
    if let Some(condition) = args["ai_condition"].as_str() {
        policy.condition = EscalationCondition::parse(condition);
    }
    if let Some(threshold) = opt_int(args, "ai_threshold")? {
        policy.threshold = threshold.clamp(1, u32::MAX as i64) as u32;
    }
    if let Some(kind) = args["ai_decision_required"].as_str().filter(|s| !s.trim().is_empty()) {
        policy.decision_required = kind.trim().to_string();
    }
    Ok(Some(policy))
}

/// Register a watch-file-then-delete job for the calling conversation.
pub struct WatchDeleteFileTool {
    tasks: Arc<TaskStore>,
    daemon: Arc<DaemonStateStore>,
}

#[async_trait]
impl Tool for WatchDeleteFileTool {
    fn name(&self) -> &str {
        "unattended_watch_delete_file"
    }

    fn description(&self) -> &str {
        "Create an unattended automation task: monitor an absolute file path and delete the file as soon as it appears."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": { "type": "string", "description": "Stable task id, e.g. auto_delete_tmp_x" },
                "file_path": { "type": "string", "description": "Absolute path to monitor and delete" },
                "interval_sec": { "type": "number", "description": "Polling interval in seconds (1-86400, default 1)" },
                "end_at": { "type": "string", "description": "Optional RFC 3339 end time; the task completes then" },
                "system_notify": { "type": "boolean", "description": "Show an OS notification on each event (default true)" },
                "ai_enabled": { "type": "boolean", "description": "Escalate ambiguous outcomes to the decision model (default false)" },
                "ai_condition": { "type": "string", "description": "action_error_repeated | unknown_pattern | multiple_metrics_conflict" },
                "ai_threshold": { "type": "number", "description": "Error streak that triggers action_error_repeated (default 2)" },
                "ai_decision_required": { "type": "string", "description": "classify | choose | explain | prioritize" }
            },
            "required": ["task_id", "file_path"]
        })
    }

    fn dangerous(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let origin = ctx.require_conversation_id()?;
        let request = NewFileDeleteTask {
            origin_conversation_id: origin.to_string(),
            task_id: required_str(&arguments, "task_id")?.to_string(),
            file_path: required_str(&arguments, "file_path")?.to_string(),
            interval_sec: opt_int(&arguments, "interval_sec")?.unwrap_or(1),
            end_at: arguments["end_at"].as_str().map(String::from),
            notify: opt_bool(&arguments, "system_notify").unwrap_or(true),
            escalation: escalation_from_args(&arguments, None)?,
        };

        let task = self
            .tasks
            .create_file_delete_task(request)
            .map_err(|e| store_error(self.name(), e))?;
        Ok(pretty(&json!({
            "ok": true,
            "task": task,
            "daemon": self.daemon.status(),
        })))
    }
}

pub struct ListJobsTool {
    tasks: Arc<TaskStore>,
    daemon: Arc<DaemonStateStore>,
}

#[async_trait]
impl Tool for ListJobsTool {
    fn name(&self) -> &str {
        "unattended_list_jobs"
    }

    fn description(&self) -> &str {
        "List unattended automation tasks and the daemon status."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        Ok(pretty(&json!({
            "daemon": self.daemon.status(),
            "jobs": self.tasks.list(),
        })))
    }
}

pub struct DaemonStatusTool {
    daemon: Arc<DaemonStateStore>,
}

#[async_trait]
impl Tool for DaemonStatusTool {
    fn name(&self) -> &str {
        "unattended_daemon_status"
    }

    fn description(&self) -> &str {
        "Check whether the unattended automation daemon is running."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        Ok(pretty(&json!(self.daemon.status())))
    }
}

pub struct UpdateJobTool {
    tasks: Arc<TaskStore>,
}

#[async_trait]
impl Tool for UpdateJobTool {
    fn name(&self) -> &str {
        "unattended_update_job"
    }

    fn description(&self) -> &str {
        "Update an unattended automation task: enable/disable it, change its interval, notifications or escalation settings."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Task UUID" },
                "enabled": { "type": "boolean", "description": "Enable or disable the task" },
                "interval_sec": { "type": "number", "description": "Polling interval in seconds" },
                "system_notify": { "type": "boolean", "description": "Enable or disable OS notifications" },
                "ai_enabled": { "type": "boolean", "description": "Enable or disable escalation" },
                "ai_condition": { "type": "string", "description": "Escalation trigger condition" },
                "ai_threshold": { "type": "number", "description": "Repeated-error threshold" },
                "ai_decision_required": { "type": "string", "description": "Decision type" }
            },
            "required": ["id"]
        })
    }

    fn dangerous(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        let id = required_str(&arguments, "id")?;
        let current = self
            .tasks
            .get(id)
            .ok_or_else(|| store_error(self.name(), StoreError::NotFound(format!("task {id}"))))?;

        let enabled = opt_bool(&arguments, "enabled");
        let patch = TaskPatch {
            enabled,
            // Re-enabling revives a completed task
            status: enabled.filter(|e| *e).map(|_| TaskStatus::Running),
            notify: opt_bool(&arguments, "system_notify"),
            interval_sec: opt_int(&arguments, "interval_sec")?,
            escalation: escalation_from_args(&arguments, current.escalation.as_ref())?,
            ..Default::default()
        };

        let task = self.tasks.update(id, patch).map_err(|e| store_error(self.name(), e))?;
        Ok(pretty(&json!({ "ok": true, "task": task })))
    }
}

pub struct RemoveJobTool {
    tasks: Arc<TaskStore>,
}

#[async_trait]
impl Tool for RemoveJobTool {
    fn name(&self) -> &str {
        "unattended_remove_job"
    }

    fn description(&self) -> &str {
        "Remove an unattended automation task."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "id": { "type": "string", "description": "Task UUID" } },
            "required": ["id"]
        })
    }

    fn dangerous(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        let id = required_str(&arguments, "id")?;
        let removed = self.tasks.remove(id).map_err(|e| store_error(self.name(), e))?;
        Ok(pretty(&json!({ "ok": removed, "id": id })))
    }
}

/// Add every job-management tool to `registry`.
pub fn register_job_tools(registry: &mut ToolRegistry, tasks: Arc<TaskStore>, daemon: Arc<DaemonStateStore>) {
    registry.register(Box::new(WatchDeleteFileTool {
        tasks: tasks.clone(),
        daemon: daemon.clone(),
    }));
    registry.register(Box::new(ListJobsTool {
        tasks: tasks.clone(),
        daemon: daemon.clone(),
    }));
    registry.register(Box::new(DaemonStatusTool { daemon }));
    registry.register(Box::new(UpdateJobTool { tasks: tasks.clone() }));
    registry.register(Box::new(RemoveJobTool { tasks }));
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        tasks: Arc<TaskStore>,
        registry: ToolRegistry,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let tasks = Arc::new(TaskStore::in_data_dir(dir.path()));
        let daemon = Arc::new(DaemonStateStore::in_data_dir(dir.path()));
        let mut registry = ToolRegistry::new();
        register_job_tools(&mut registry, tasks.clone(), daemon);
        Fixture {
            _dir: dir,
            tasks,
            registry,
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::for_conversation("conv-1")
    }

    #[test]
    fn registration_and_danger_flags() {
        let fx = fixture();
        assert_eq!(fx.registry.len(), 5);
        assert!(fx.registry.is_dangerous("unattended_watch_delete_file"));
        assert!(fx.registry.is_dangerous("unattended_update_job"));
        assert!(fx.registry.is_dangerous("unattended_remove_job"));
        assert!(!fx.registry.is_dangerous("unattended_list_jobs"));
        assert!(!fx.registry.is_dangerous("unattended_daemon_status"));
    }

    #[tokio::test]
    async fn create_requires_conversation_context() {
        let fx = fixture();
        let result = fx
            .registry
            .invoke(
                "unattended_watch_delete_file",
                r#"{"task_id":"t","file_path":"/tmp/x"}"#,
                &ToolContext::default(),
            )
            .await;
        assert!(matches!(result, Err(ToolError::MissingContext(_))));
        assert!(fx.tasks.list().is_empty());
    }

    #[tokio::test]
    async fn create_scopes_task_to_caller() {
        let fx = fixture();
        let out = fx
            .registry
            .invoke(
                "unattended_watch_delete_file",
                r#"{"task_id":"t","file_path":"/tmp/x","interval_sec":0,"ai_enabled":true,"ai_threshold":3}"#,
                &ctx(),
            )
            .await
            .unwrap();
        let json: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["daemon"]["running"], false);

        let task = &fx.tasks.list()[0];
        assert_eq!(task.origin_conversation_id, "conv-1");
        assert_eq!(task.interval_sec, 1);
        let policy = task.escalation.as_ref().unwrap();
        assert!(policy.enabled);
        assert_eq!(policy.threshold, 3);
        assert_eq!(policy.condition, EscalationCondition::ActionErrorRepeated);
    }

    #[tokio::test]
    async fn create_rejects_relative_path() {
        let fx = fixture();
        let result = fx
            .registry
            .invoke(
                "unattended_watch_delete_file",
                r#"{"task_id":"t","file_path":"x.txt"}"#,
                &ctx(),
            )
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn update_re_enable_revives_completed_task() {
        let fx = fixture();
        fx.registry
            .invoke(
                "unattended_watch_delete_file",
                r#"{"task_id":"t","file_path":"/tmp/x"}"#,
                &ctx(),
            )
            .await
            .unwrap();
        let id = fx.tasks.list()[0].id.clone();
        fx.tasks
            .update(
                &id,
                TaskPatch {
                    enabled: Some(false),
                    status: Some(TaskStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap();

        let args = json!({ "id": id, "enabled": true, "ai_condition": "unknown_pattern" }).to_string();
        fx.registry.invoke("unattended_update_job", &args, &ctx()).await.unwrap();

        let task = fx.tasks.get(&id).unwrap();
        assert!(task.enabled);
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.escalation.unwrap().condition, EscalationCondition::UnknownPattern);
    }

    #[tokio::test]
    async fn remove_and_list() {
        let fx = fixture();
        fx.registry
            .invoke(
                "unattended_watch_delete_file",
                r#"{"task_id":"t","file_path":"/tmp/x"}"#,
                &ctx(),
            )
            .await
            .unwrap();
        let id = fx.tasks.list()[0].id.clone();

        let listed: Value =
            serde_json::from_str(&fx.registry.invoke("unattended_list_jobs", "", &ctx()).await.unwrap()).unwrap();
        assert_eq!(listed["jobs"].as_array().unwrap().len(), 1);

        let args = json!({ "id": id }).to_string();
        let out: Value =
            serde_json::from_str(&fx.registry.invoke("unattended_remove_job", &args, &ctx()).await.unwrap()).unwrap();
        assert_eq!(out["ok"], true);
        let out: Value =
            serde_json::from_str(&fx.registry.invoke("unattended_remove_job", &args, &ctx()).await.unwrap()).unwrap();
        assert_eq!(out["ok"], false);
    }
}
