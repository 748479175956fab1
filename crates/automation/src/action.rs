//! Actions: side effects run when a watcher matches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    DeleteFile { path: String },

    #[serde(other)]
    Unsupported,
}

impl ActionSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeleteFile { .. } => "delete_file",
            Self::Unsupported => "unsupported",
        }
    }

    /// Result-log event label for a run of this action.
    pub fn event_label(&self, success: bool) -> &'static str {
        match (self, success) {
            (Self::DeleteFile { .. }, true) => "file_detected_and_deleted",
            (Self::DeleteFile { .. }, false) => "file_detected_but_action_failed",
            (Self::Unsupported, _) => "action_unsupported",
        }
    }

    /// Run the action. Failures are reported in the outcome, never raised.
    pub async fn execute(&self) -> ActionOutcome {
        match self {
            Self::DeleteFile { path } => {
                let result = tokio::fs::remove_file(path).await;
                ActionOutcome {
                    action: self.kind().to_string(),
                    path: path.clone(),
                    success: result.is_ok(),
                    error: result.err().map(|e| e.to_string()),
                    timestamp: Utc::now(),
                }
            }
            Self::Unsupported => ActionOutcome {
                action: self.kind().to_string(),
                path: String::new(),
                success: false,
                error: Some("unsupported action".into()),
                timestamp: Utc::now(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: String,
    pub path: String,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_file_removes_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("victim");
        std::fs::write(&path, "x").unwrap();

        let spec = ActionSpec::DeleteFile {
            path: path.display().to_string(),
        };
        let outcome = spec.execute().await;
        assert!(outcome.success);
        assert!(outcome.error.is_none());
        assert!(!path.exists());
        assert_eq!(spec.event_label(true), "file_detected_and_deleted");
    }

    #[tokio::test]
    async fn delete_missing_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ActionSpec::DeleteFile {
            path: dir.path().join("absent").display().to_string(),
        };
        let outcome = spec.execute().await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn unsupported_action_fails_softly() {
        let spec: ActionSpec = serde_json::from_str(r#"{"type":"reboot"}"#).unwrap();
        let outcome = spec.execute().await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("unsupported action"));
    }
}
