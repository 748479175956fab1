//! One watch → act → decide pass over a single task.
//!
//! ```text
//! ended?  ── yes ──▶ completed (terminal, result "task_completed")
//!   │ no
//! watch   ── no match ──▶ idle (nothing appended)
//!   │ match
//! act     ──▶ ok / error, streak updated, action result appended
//!   │
//! decide  ── policy fires ──▶ decision persisted, "ai_decision" appended
//! ```

use chrono::{DateTime, Utc};
use serde_json::json;
use starbot_core::error::StoreError;
use starbot_core::event::{DomainEvent, EventBus};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::decision::{Decision, DecisionModule, LlmDecisionModule, Recommendation, decide_with_fallback};
use crate::escalation::{DecisionInput, EventContext, SubstringDetector, UnknownPatternDetector};
use crate::notifier::{NoopNotifier, Notifier};
use crate::store::{AutomationTask, LastStatus, NewResult, ResultStatus, ResultStore, TaskPatch, TaskStatus, TaskStore};

pub const EVENT_TASK_COMPLETED: &str = "task_completed";
pub const EVENT_AI_DECISION: &str = "ai_decision";
pub const EVENT_RUNNER_EXCEPTION: &str = "runner_exception";

/// What a cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed,
    Idle,
    Acted {
        success: bool,
        event: String,
        decision: Option<Decision>,
    },
}

impl CycleOutcome {
    pub fn label(&self) -> &str {
        match self {
            Self::Completed => EVENT_TASK_COMPLETED,
            Self::Idle => "idle",
            Self::Acted { event, .. } => event,
        }
    }
}

/// Runs cycles against the shared stores and collaborators.
pub struct TaskCycle {
    tasks: Arc<TaskStore>,
    results: Arc<ResultStore>,
    notifier: Arc<dyn Notifier>,
    decision: Arc<dyn DecisionModule>,
    detector: Arc<dyn UnknownPatternDetector>,
    event_bus: Option<Arc<EventBus>>,
}

impl TaskCycle {
    pub fn new(tasks: Arc<TaskStore>, results: Arc<ResultStore>) -> Self {
        Self {
            tasks,
            results,
            notifier: Arc::new(NoopNotifier),
            decision: Arc::new(LlmDecisionModule::unconfigured()),
            detector: Arc::new(SubstringDetector::default()),
            event_bus: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_decision_module(mut self, module: Arc<dyn DecisionModule>) -> Self {
        self.decision = module;
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn UnknownPatternDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn tasks(&self) -> &Arc<TaskStore> {
        &self.tasks
    }

    pub fn results(&self) -> &Arc<ResultStore> {
        &self.results
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    fn append(
        &self,
        task: &AutomationTask,
        event: &str,
        status: ResultStatus,
        details: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.results
            .append(NewResult {
                task_id: task.task_id.clone(),
                origin_conversation_id: task.origin_conversation_id.clone(),
                event: event.to_string(),
                status,
                details,
            })
            .map(|_| ())
    }

    /// Evaluate `task` once at time `now`.
    pub async fn run(&self, task: &AutomationTask, now: DateTime<Utc>) -> Result<CycleOutcome, StoreError> {
        if task.has_ended(now) {
            self.tasks.update(
                &task.id,
                TaskPatch {
                    status: Some(TaskStatus::Completed),
                    enabled: Some(false),
                    last_run_at: Some(now),
                    last_status: Some(LastStatus::Completed),
                    last_error: Some(String::new()),
                    ..Default::default()
                },
            )?;
            self.append(
                task,
                EVENT_TASK_COMPLETED,
                ResultStatus::Ok,
                json!({ "reason": "end_time_reached" }),
            )?;
            info!(task_id = %task.task_id, "Task reached its end time");
            self.finish(task, EVENT_TASK_COMPLETED, LastStatus::Completed, now);
            return Ok(CycleOutcome::Completed);
        }

        let watch = task.watcher.evaluate();
        if !watch.matched {
            self.tasks.update(
                &task.id,
                TaskPatch {
                    last_run_at: Some(now),
                    last_status: Some(LastStatus::Idle),
                    last_error: Some(String::new()),
                    ..Default::default()
                },
            )?;
            debug!(task_id = %task.task_id, target = %watch.target, "Watcher did not match");
            return Ok(CycleOutcome::Idle);
        }

        let act = task.action.execute().await;
        let success = act.success;
        let streak = if success { 0 } else { task.error_streak.saturating_add(1) };
        let event = task.action.event_label(success);
        let (last_status, result_status) = if success {
            (LastStatus::Ok, ResultStatus::Ok)
        } else {
            (LastStatus::Error, ResultStatus::Error)
        };

        self.tasks.update(
            &task.id,
            TaskPatch {
                last_run_at: Some(now),
                last_status: Some(last_status),
                last_error: Some(act.error.clone().unwrap_or_default()),
                error_streak: Some(streak),
                ..Default::default()
            },
        )?;
        self.append(task, event, result_status, json!({ "watcher": watch, "action": act }))?;

        if success {
            info!(task_id = %task.task_id, event, "Task action succeeded");
        } else {
            warn!(task_id = %task.task_id, event, streak, error = act.error.as_deref().unwrap_or(""), "Task action failed");
        }
        if task.notify {
            self.notifier.notify(&format!("{}: {}", task.task_id, event));
        }

        let input = DecisionInput {
            task_id: task.task_id.clone(),
            event_type: event.to_string(),
            decision_required: task
                .escalation
                .as_ref()
                .map(|p| p.decision_required.clone())
                .unwrap_or_else(|| "classify".into()),
            context: EventContext {
                action_success: success,
                error_streak: streak,
                unknown_pattern: act.error.as_deref().is_some_and(|e| self.detector.is_unknown(e)),
                metrics_conflict: watch.metrics_conflict,
                last_error: act.error.clone(),
            },
            timestamp: now,
        };

        let escalate = task.escalation.as_ref().is_some_and(|p| p.should_escalate(&input));
        let decision = if escalate {
            Some(self.escalate(task, &input).await?)
        } else {
            None
        };

        self.finish(task, event, last_status, now);
        Ok(CycleOutcome::Acted {
            success,
            event: event.to_string(),
            decision,
        })
    }

    async fn escalate(&self, task: &AutomationTask, input: &DecisionInput) -> Result<Decision, StoreError> {
        let decision = decide_with_fallback(self.decision.as_ref(), input).await;

        let mut patch = TaskPatch {
            decision: Some(decision.clone()),
            ..Default::default()
        };
        match decision.recommendation() {
            Recommendation::Ignore => {
                patch.enabled = Some(false);
                patch.status = Some(TaskStatus::Completed);
            }
            Recommendation::Escalate => {
                self.notifier.notify(&format!(
                    "{}: needs attention ({})",
                    task.task_id,
                    decision.analysis.reason_codes.join(", ")
                ));
            }
            Recommendation::Wait => patch.last_status = Some(LastStatus::Idle),
            Recommendation::Proceed | Recommendation::Other => {}
        }

        self.tasks.update(&task.id, patch)?;
        self.append(
            task,
            EVENT_AI_DECISION,
            ResultStatus::Ok,
            json!({ "input": input, "decision": decision }),
        )?;

        info!(
            task_id = %task.task_id,
            action = %decision.analysis.recommended_action,
            "Escalated task outcome decided"
        );
        self.publish(DomainEvent::DecisionMade {
            task_id: task.task_id.clone(),
            recommended_action: decision.analysis.recommended_action.clone(),
            timestamp: Utc::now(),
        });
        Ok(decision)
    }

    /// Record a cycle that failed outside the normal flow.
    pub fn record_exception(&self, task: &AutomationTask, error: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.tasks.update(
            &task.id,
            TaskPatch {
                last_run_at: Some(now),
                last_status: Some(LastStatus::Error),
                last_error: Some(error.to_string()),
                ..Default::default()
            },
        )?;
        self.append(
            task,
            EVENT_RUNNER_EXCEPTION,
            ResultStatus::Error,
            json!({ "error": error }),
        )?;
        self.finish(task, EVENT_RUNNER_EXCEPTION, LastStatus::Error, now);
        Ok(())
    }

    fn finish(&self, task: &AutomationTask, event: &str, status: LastStatus, now: DateTime<Utc>) {
        self.publish(DomainEvent::TaskCycleFinished {
            task_id: task.task_id.clone(),
            event: event.to_string(),
            status: status.as_str().to_string(),
            timestamp: now,
        });
    }
}
