//! File-backed stores for automation state. Each collection is a single
//! JSON document under the data directory, rewritten atomically on every
//! mutation. Unreadable files read as empty.

pub mod daemon_state;
pub mod results;
pub mod tasks;

pub use daemon_state::{DaemonState, DaemonStateStore, DaemonStatus, pid_alive};
pub use results::{AutomationResult, NewResult, ResultStatus, ResultStore};
pub use tasks::{
    AutomationTask, LastStatus, NewFileDeleteTask, TaskPatch, TaskStatus, TaskStore, clamp_interval,
    is_absolute_path,
};
