//! Daemon liveness record.
//!
//! The record is advisory: a stale entry whose pid is gone reads as not
//! running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use starbot_core::error::StoreError;
use starbot_core::persist::{read_json_or_default, write_json_atomic};
use std::path::{Path, PathBuf};

pub const DAEMON_STATE_FILE: &str = "automation_daemon_state.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// What a liveness check reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
}

pub struct DaemonStateStore {
    path: PathBuf,
}

impl DaemonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(DAEMON_STATE_FILE))
    }

    pub fn load(&self) -> DaemonState {
        read_json_or_default(&self.path)
    }

    pub fn mark_running(&self, pid: u32) -> Result<(), StoreError> {
        write_json_atomic(
            &self.path,
            &DaemonState {
                pid: Some(pid),
                started_at: Some(Utc::now()),
            },
        )
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        write_json_atomic(&self.path, &DaemonState::default())
    }

    /// Read the record and check that its pid is still alive.
    pub fn status(&self) -> DaemonStatus {
        let state = self.load();
        let running = state.pid.is_some_and(pid_alive);
        DaemonStatus {
            running,
            pid: state.pid.filter(|_| running),
            started_at: state.started_at,
        }
    }
}

/// Signal 0 checks for existence without delivering anything. EPERM means
/// the process exists under another user.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill with signal 0 performs only the permission and existence check.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Without a portable check only our own pid is known to be alive.
#[cfg(not(unix))]
pub fn pid_alive(pid: u32) -> bool {
    pid == std::process::id()
}
