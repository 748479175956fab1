//! The result outbox: an append-only log of task events per conversation.
//!
//! Entries are created only by [`ResultStore::append`] and change only when
//! [`ResultStore::mark_reported`] flips `reported` to true. The front end
//! lists pending entries, shows them, then marks them, which gives
//! at-least-once delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use starbot_core::error::StoreError;
use starbot_core::persist::{read_json_or_default, write_json_atomic};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

pub const RESULTS_FILE: &str = "automation_results.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationResult {
    pub id: String,
    pub task_id: String,
    pub origin_conversation_id: String,
    pub event: String,
    pub status: ResultStatus,
    #[serde(default)]
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub reported: bool,
    #[serde(default)]
    pub reported_at: Option<DateTime<Utc>>,
}

/// Fields supplied by the caller of [`ResultStore::append`].
#[derive(Debug, Clone)]
pub struct NewResult {
    pub task_id: String,
    pub origin_conversation_id: String,
    pub event: String,
    pub status: ResultStatus,
    pub details: serde_json::Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ResultDocument {
    #[serde(default)]
    results: Vec<AutomationResult>,
}

pub struct ResultStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(RESULTS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> ResultDocument {
        read_json_or_default(&self.path)
    }

    pub fn append(&self, entry: NewResult) -> Result<AutomationResult, StoreError> {
        let task_id = entry.task_id.trim();
        let origin = entry.origin_conversation_id.trim();
        let event = entry.event.trim();
        if task_id.is_empty() || origin.is_empty() || event.is_empty() {
            return Err(StoreError::Invalid(
                "task_id, origin_conversation_id and event are required".into(),
            ));
        }

        let result = AutomationResult {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            origin_conversation_id: origin.to_string(),
            event: event.to_string(),
            status: entry.status,
            details: entry.details,
            timestamp: Utc::now(),
            reported: false,
            reported_at: None,
        };

        let _guard = self.guard();
        let mut doc = self.read();
        doc.results.push(result.clone());
        write_json_atomic(&self.path, &doc)?;
        debug!(task_id = %result.task_id, event = %result.event, "Appended automation result");
        Ok(result)
    }

    pub fn list_all(&self) -> Vec<AutomationResult> {
        let _guard = self.guard();
        self.read().results
    }

    /// Unreported entries for one conversation, oldest first.
    pub fn list_pending(&self, conversation_id: &str) -> Vec<AutomationResult> {
        let conversation_id = conversation_id.trim();
        if conversation_id.is_empty() {
            return Vec::new();
        }
        self.list_all()
            .into_iter()
            .filter(|r| !r.reported && r.origin_conversation_id == conversation_id)
            .collect()
    }

    /// Flag the given ids as reported. Returns how many changed; already
    /// reported ids are left alone.
    pub fn mark_reported<S: AsRef<str>>(&self, ids: &[S]) -> Result<usize, StoreError> {
        let wanted: HashSet<&str> = ids.iter().map(|id| id.as_ref()).collect();
        if wanted.is_empty() {
            return Ok(0);
        }

        let _guard = self.guard();
        let mut doc = self.read();
        let now = Utc::now();
        let mut changed = 0;
        for result in doc.results.iter_mut() {
            if !result.reported && wanted.contains(result.id.as_str()) {
                result.reported = true;
                result.reported_at = Some(now);
                changed += 1;
            }
        }
        if changed > 0 {
            write_json_atomic(&self.path, &doc)?;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(conv: &str, event: &str) -> NewResult {
        NewResult {
            task_id: "watch_x".into(),
            origin_conversation_id: conv.into(),
            event: event.into(),
            status: ResultStatus::Ok,
            details: serde_json::json!({"n": 1}),
        }
    }

    fn store() -> (tempfile::TempDir, ResultStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::in_data_dir(dir.path());
        (dir, store)
    }

    #[test]
    fn pending_is_scoped_and_ordered() {
        let (_dir, store) = store();
        let a = store.append(entry("conv-1", "first")).unwrap();
        store.append(entry("conv-2", "elsewhere")).unwrap();
        let b = store.append(entry("conv-1", "second")).unwrap();

        let pending = store.list_pending("conv-1");
        let ids: Vec<_> = pending.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert!(store.list_pending("").is_empty());
    }

    #[test]
    fn mark_reported_is_idempotent() {
        let (_dir, store) = store();
        let a = store.append(entry("conv-1", "first")).unwrap();
        let b = store.append(entry("conv-1", "second")).unwrap();

        assert_eq!(store.mark_reported(&[a.id.clone()]).unwrap(), 1);
        let stamped = store.list_all().into_iter().find(|r| r.id == a.id).unwrap().reported_at;

        assert_eq!(store.mark_reported(&[a.id.clone()]).unwrap(), 0);
        let after = store.list_all().into_iter().find(|r| r.id == a.id).unwrap();
        assert!(after.reported);
        assert_eq!(after.reported_at, stamped);

        let pending: Vec<_> = store.list_pending("conv-1").into_iter().map(|r| r.id).collect();
        assert_eq!(pending, vec![b.id]);
    }

    #[test]
    fn mark_reported_ignores_unknown_and_empty() {
        let (_dir, store) = store();
        store.append(entry("conv-1", "first")).unwrap();
        assert_eq!(store.mark_reported(&["nope"]).unwrap(), 0);
        assert_eq!(store.mark_reported::<&str>(&[]).unwrap(), 0);
        assert_eq!(store.list_pending("conv-1").len(), 1);
    }

    #[test]
    fn append_requires_identity_fields() {
        let (_dir, store) = store();
        assert!(store.append(entry("", "x")).is_err());
        assert!(store.append(entry("conv", " ")).is_err());
        assert!(store.list_all().is_empty());
    }
}
