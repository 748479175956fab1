//! File-per-conversation history store.
//!
//! Each conversation is one pretty-printed JSON document at
//! `<dir>/<id>.json`. Ids are sanitized to `[A-Za-z0-9_-]` before they touch
//! the filesystem.

use chrono::{DateTime, Utc};
use serde::Serialize;
use starbot_core::error::StoreError;
use starbot_core::message::{ConversationRecord, Message, Role};
use starbot_core::persist::write_json_atomic;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const MAX_TITLE_CHARS: usize = 80;

/// Listing entry returned by [`ConversationStore::list`].
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<data_dir>/history`
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("history"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Strip everything outside `[A-Za-z0-9_-]`.
    pub fn safe_id(id: &str) -> String {
        id.chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect()
    }

    fn path_for(&self, safe_id: &str) -> PathBuf {
        self.dir.join(format!("{safe_id}.json"))
    }

    /// Persist the messages of a conversation, keeping its creation time and
    /// title when it already exists.
    pub fn save(&self, id: &str, messages: &[Message]) -> Result<ConversationRecord, StoreError> {
        let sid = Self::safe_id(id);
        if sid.is_empty() {
            return Err(StoreError::Invalid(format!("conversation id {id:?}")));
        }

        let now = Utc::now();
        let existing = self.load(&sid);
        let record = ConversationRecord {
            id: sid.clone(),
            title: existing
                .as_ref()
                .map(|r| r.title.clone())
                .filter(|t| !t.is_empty() && t != "New Conversation")
                .unwrap_or_else(|| ConversationRecord::derive_title(messages)),
            created_at: existing.map(|r| r.created_at).unwrap_or(now),
            updated_at: now,
            messages: messages.to_vec(),
        };

        self.write(&record)?;
        Ok(record)
    }

    fn write(&self, record: &ConversationRecord) -> Result<(), StoreError> {
        write_json_atomic(&self.path_for(&record.id), record)?;
        debug!(conversation_id = %record.id, messages = record.messages.len(), "Saved conversation");
        Ok(())
    }

    /// Load a conversation. Missing or unreadable files yield `None`.
    pub fn load(&self, id: &str) -> Option<ConversationRecord> {
        let sid = Self::safe_id(id);
        if sid.is_empty() {
            return None;
        }
        let path = self.path_for(&sid);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable conversation");
                None
            }
        }
    }

    /// Most recently updated first.
    pub fn list(&self, limit: usize) -> Vec<ConversationSummary> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut items: Vec<ConversationSummary> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| {
                let stem = p.file_stem()?.to_string_lossy().into_owned();
                self.load(&stem)
            })
            .map(|r| ConversationSummary {
                message_count: r.messages.len(),
                id: r.id,
                title: r.title,
                updated_at: r.updated_at,
            })
            .collect();

        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        items.truncate(limit);
        items
    }

    /// Keep only the system messages of a saved conversation.
    pub fn clear(&self, id: &str) -> Result<Option<ConversationRecord>, StoreError> {
        let Some(mut record) = self.load(id) else {
            return Ok(None);
        };
        record.messages.retain(|m| m.role == Role::System);
        record.updated_at = Utc::now();
        self.write(&record)?;
        Ok(Some(record))
    }

    /// Set a title (trimmed, at most 80 chars). Blank titles are rejected.
    pub fn rename(&self, id: &str, title: &str) -> Result<Option<ConversationRecord>, StoreError> {
        let title: String = title.trim().chars().take(MAX_TITLE_CHARS).collect();
        if title.is_empty() {
            return Ok(None);
        }
        let Some(mut record) = self.load(id) else {
            return Ok(None);
        };
        record.title = title;
        record.updated_at = Utc::now();
        self.write(&record)?;
        Ok(Some(record))
    }

    /// Returns `true` when a file was removed.
    pub fn delete(&self, id: &str) -> bool {
        let sid = Self::safe_id(id);
        if sid.is_empty() {
            return false;
        }
        std::fs::remove_file(self.path_for(&sid)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ConversationStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::in_data_dir(dir.path());
        (dir, store)
    }

    #[test]
    fn safe_id_strips_path_characters() {
        assert_eq!(ConversationStore::safe_id("../etc/passwd"), "etcpasswd");
        assert_eq!(ConversationStore::safe_id("chat_2024-01"), "chat_2024-01");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let (_dir, store) = store();
        let messages = vec![Message::system("sys"), Message::user("clean up   /tmp please")];
        let saved = store.save("c1", &messages).unwrap();
        assert_eq!(saved.title, "clean up /tmp please");

        let loaded = store.load("c1").unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.created_at, saved.created_at);
    }

    #[test]
    fn save_rejects_empty_id() {
        let (_dir, store) = store();
        assert!(matches!(store.save("///", &[]), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn resave_keeps_created_at_and_title() {
        let (_dir, store) = store();
        let first = store.save("c1", &[Message::user("first question")]).unwrap();
        let second = store
            .save("c1", &[Message::user("different"), Message::assistant("ok")])
            .unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.title, "first question");
    }

    #[test]
    fn corrupt_file_loads_as_none() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.dir().join("bad.json"), "{").unwrap();
        assert!(store.load("bad").is_none());
        assert!(store.list(10).is_empty());
    }

    #[test]
    fn list_sorted_by_update_time() {
        let (_dir, store) = store();
        store.save("older", &[Message::user("a")]).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.save("newer", &[Message::user("b")]).unwrap();

        let items = store.list(10);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "newer");
        assert_eq!(store.list(1).len(), 1);
    }

    #[test]
    fn clear_rename_delete() {
        let (_dir, store) = store();
        store
            .save("c1", &[Message::system("sys"), Message::user("hi"), Message::assistant("yo")])
            .unwrap();

        let cleared = store.clear("c1").unwrap().unwrap();
        assert_eq!(cleared.messages.len(), 1);

        let long = format!("  {}  ", "t".repeat(100));
        let renamed = store.rename("c1", &long).unwrap().unwrap();
        assert_eq!(renamed.title.len(), 80);
        assert!(store.rename("c1", "   ").unwrap().is_none());
        assert!(store.rename("ghost", "x").unwrap().is_none());

        assert!(store.delete("c1"));
        assert!(!store.delete("c1"));
        assert!(store.load("c1").is_none());
    }
}
