//! Watchers: predicates over background conditions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a task watches for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatcherSpec {
    /// Matches while `path` exists.
    FileExists { path: String },

    /// A watcher type this build does not know. Never matches.
    #[serde(other)]
    Unsupported,
}

impl WatcherSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileExists { .. } => "file_exists",
            Self::Unsupported => "unsupported",
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Self::FileExists { path } => path,
            Self::Unsupported => "",
        }
    }

    /// Evaluate the predicate once.
    pub fn evaluate(&self) -> WatchOutcome {
        let matched = match self {
            Self::FileExists { path } => !path.trim().is_empty() && Path::new(path).exists(),
            Self::Unsupported => false,
        };
        WatchOutcome {
            matched,
            kind: self.kind().to_string(),
            target: self.target().to_string(),
            metrics_conflict: false,
            timestamp: Utc::now(),
        }
    }
}

/// Result of one watcher evaluation, stored verbatim in result details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchOutcome {
    pub matched: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub target: String,
    /// Set by watchers that sample several metrics and see them disagree.
    #[serde(default)]
    pub metrics_conflict: bool,
    pub timestamp: DateTime<Utc>,
}
