//! Persisted automation task definitions and their run state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use starbot_core::error::StoreError;
use starbot_core::persist::{read_json_or_default, write_json_atomic};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::action::ActionSpec;
use crate::decision::Decision;
use crate::escalation::EscalationPolicy;
use crate::watcher::WatcherSpec;

pub const TASKS_FILE: &str = "automation_tasks.json";

pub const MIN_INTERVAL_SECS: u64 = 1;
pub const MAX_INTERVAL_SECS: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Running,
    Completed,
}

/// Outcome of the most recent cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastStatus {
    #[default]
    Idle,
    Ok,
    Error,
    Completed,
}

impl LastStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Completed => "completed",
        }
    }
}

fn default_interval() -> u64 {
    MIN_INTERVAL_SECS
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationTask {
    /// Store-assigned UUID
    pub id: String,

    /// Stable, human-chosen identifier (e.g. `auto_delete_tmp_x`)
    pub task_id: String,

    /// Conversation that registered the task; results are reported there
    pub origin_conversation_id: String,

    pub watcher: WatcherSpec,
    pub action: ActionSpec,

    #[serde(default = "default_interval")]
    pub interval_sec: u64,

    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,

    #[serde(default = "default_true")]
    pub notify: bool,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_status: LastStatus,

    #[serde(default)]
    pub last_error: String,

    #[serde(default)]
    pub error_streak: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationPolicy>,

    /// Last decision returned for an escalated cycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationTask {
    /// Enabled and not completed.
    pub fn is_active(&self) -> bool {
        self.enabled && self.status != TaskStatus::Completed
    }

    /// Due when never run, or once `interval_sec` has elapsed since the last
    /// run (boundary inclusive).
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_run_at {
            None => true,
            Some(last) => {
                let interval = self.interval_sec.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS);
                now >= last + chrono::Duration::seconds(interval as i64)
            }
        }
    }

    /// Whether the optional end time has passed.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_at.is_some_and(|end| now >= end)
    }
}

/// Registration request for a watch-file-then-delete task.
#[derive(Debug, Clone, Default)]
pub struct NewFileDeleteTask {
    pub origin_conversation_id: String,
    pub task_id: String,
    pub file_path: String,
    pub interval_sec: i64,
    pub end_at: Option<String>,
    pub notify: bool,
    pub escalation: Option<EscalationPolicy>,
}

/// A partial update. Only fields that are `Some` are applied.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub enabled: Option<bool>,
    pub status: Option<TaskStatus>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_status: Option<LastStatus>,
    pub last_error: Option<String>,
    pub error_streak: Option<u32>,
    pub notify: Option<bool>,
    pub interval_sec: Option<i64>,
    pub escalation: Option<EscalationPolicy>,
    pub decision: Option<Decision>,
}

/// Clamp a requested interval into `1..=86400` seconds.
pub fn clamp_interval(secs: i64) -> u64 {
    secs.clamp(MIN_INTERVAL_SECS as i64, MAX_INTERVAL_SECS as i64) as u64
}

/// POSIX (`/...`), Windows drive (`C:\...`) or UNC (`\\server\...`) path.
pub fn is_absolute_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || path.starts_with("\\\\")
        || (bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'\\')
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskDocument {
    #[serde(default)]
    tasks: Vec<AutomationTask>,
}

/// The task collection, stored as one JSON document.
///
/// Mutations are serialized in-process so concurrent cycles of different
/// tasks never lose each other's writes.
pub struct TaskStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(TASKS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> TaskDocument {
        read_json_or_default(&self.path)
    }

    pub fn list(&self) -> Vec<AutomationTask> {
        let _guard = self.guard();
        self.read().tasks
    }

    pub fn get(&self, id: &str) -> Option<AutomationTask> {
        self.list().into_iter().find(|t| t.id == id)
    }

    pub fn create_file_delete_task(&self, request: NewFileDeleteTask) -> Result<AutomationTask, StoreError> {
        let origin = request.origin_conversation_id.trim();
        let task_id = request.task_id.trim();
        let path = request.file_path.trim();
        if origin.is_empty() {
            return Err(StoreError::Invalid("origin_conversation_id is required".into()));
        }
        if task_id.is_empty() {
            return Err(StoreError::Invalid("task_id is required".into()));
        }
        if !is_absolute_path(path) {
            return Err(StoreError::Invalid("file_path must be an absolute path".into()));
        }
        let end_at = match request.end_at.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|_| StoreError::Invalid("end_at must be an RFC 3339 datetime".into()))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        let now = Utc::now();
        let task = AutomationTask {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            origin_conversation_id: origin.to_string(),
            watcher: WatcherSpec::FileExists { path: path.to_string() },
            action: ActionSpec::DeleteFile { path: path.to_string() },
            interval_sec: clamp_interval(request.interval_sec),
            end_at,
            notify: request.notify,
            status: TaskStatus::Running,
            enabled: true,
            last_run_at: None,
            last_status: LastStatus::Idle,
            last_error: String::new(),
            error_streak: 0,
            escalation: request.escalation,
            decision: None,
            created_at: now,
            updated_at: now,
        };

        let _guard = self.guard();
        let mut doc = self.read();
        doc.tasks.push(task.clone());
        write_json_atomic(&self.path, &doc)?;
        info!(id = %task.id, task_id = %task.task_id, path, "Registered automation task");
        Ok(task)
    }

    /// Apply `patch` to the task with store id `id`.
    pub fn update(&self, id: &str, patch: TaskPatch) -> Result<AutomationTask, StoreError> {
        let _guard = self.guard();
        let mut doc = self.read();
        let task = doc
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("task {id}")))?;

        if let Some(enabled) = patch.enabled {
            task.enabled = enabled;
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(at) = patch.last_run_at {
            task.last_run_at = Some(at);
        }
        if let Some(status) = patch.last_status {
            task.last_status = status;
        }
        if let Some(error) = patch.last_error {
            task.last_error = error;
        }
        if let Some(streak) = patch.error_streak {
            task.error_streak = streak;
        }
        if let Some(notify) = patch.notify {
            task.notify = notify;
        }
        if let Some(secs) = patch.interval_sec {
            task.interval_sec = clamp_interval(secs);
        }
        if let Some(policy) = patch.escalation {
            task.escalation = Some(policy);
        }
        if let Some(decision) = patch.decision {
            task.decision = Some(decision);
        }
        task.updated_at = Utc::now();

        let updated = task.clone();
        write_json_atomic(&self.path, &doc)?;
        Ok(updated)
    }

    /// Delete a task. `Ok(false)` when no task has that id.
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.guard();
        let mut doc = self.read();
        let before = doc.tasks.len();
        doc.tasks.retain(|t| t.id != id);
        if doc.tasks.len() == before {
            return Ok(false);
        }
        write_json_atomic(&self.path, &doc)?;
        info!(id, "Removed automation task");
        Ok(true)
    }
}
