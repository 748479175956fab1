//! Unattended automation for StarBot.
//!
//! A task pairs a [`WatcherSpec`] with an [`ActionSpec`]. The
//! [`Scheduler`] polls the [`TaskStore`] once per tick and runs a
//! [`TaskCycle`] for each due task: watch, act on a match, and, when the
//! task's [`EscalationPolicy`] fires, ask a [`DecisionModule`] what to do
//! next. Every noteworthy outcome lands in the [`ResultStore`] outbox so the
//! chat front end can report it to the conversation that created the task.

pub mod action;
pub mod cycle;
pub mod decision;
pub mod escalation;
pub mod notifier;
pub mod reporting;
pub mod scheduler;
pub mod store;
pub mod tools;
pub mod watcher;

pub use action::{ActionOutcome, ActionSpec};
pub use cycle::{CycleOutcome, TaskCycle};
pub use decision::{
    Analysis, Decision, DecisionError, DecisionModule, LlmDecisionModule, Recommendation, decide_with_fallback,
};
pub use escalation::{
    DecisionInput, EscalationCondition, EscalationPolicy, EventContext, SubstringDetector, UnknownPatternDetector,
};
pub use notifier::{NoopNotifier, Notifier, SystemNotifier};
pub use reporting::{ConversationDigest, collect_conversation_summary, mark_digest_reported};
pub use scheduler::Scheduler;
pub use store::{
    AutomationResult, AutomationTask, DaemonStateStore, DaemonStatus, LastStatus, NewFileDeleteTask, NewResult,
    ResultStatus, ResultStore, TaskPatch, TaskStatus, TaskStore,
};
pub use tools::register_job_tools;
pub use watcher::{WatchOutcome, WatcherSpec};
