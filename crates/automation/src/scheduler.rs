//! The automation daemon's control loop.
//!
//! Every tick reads the task store, launches a cycle for each active, due
//! task that is not already in flight, and returns without waiting for
//! them. The in-flight set keyed by task id is the only concurrency control.
//! A cycle that panics is recorded on its task as a runner exception.

use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::cycle::TaskCycle;
use crate::store::{AutomationTask, DaemonStateStore};

/// Removes the task id from the in-flight set when the cycle ends, even if
/// it panicked.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.id);
    }
}

pub struct Scheduler {
    cycle: Arc<TaskCycle>,
    daemon_state: DaemonStateStore,
    tick: Duration,
    in_flight: Arc<Mutex<HashSet<String>>>,
    running: JoinSet<()>,
    /// Snapshot of the task each spawned cycle is working on.
    spawned: HashMap<Id, AutomationTask>,
}

impl Scheduler {
    pub fn new(cycle: Arc<TaskCycle>, daemon_state: DaemonStateStore) -> Self {
        Self {
            cycle,
            daemon_state,
            tick: Duration::from_secs(1),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            running: JoinSet::new(),
            spawned: HashMap::new(),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    /// Store ids of cycles currently running.
    pub fn in_flight(&self) -> Vec<String> {
        let set = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        set.iter().cloned().collect()
    }

    /// Launch cycles for every active task due at `now`. Returns the store
    /// ids that were launched.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<String> {
        self.reap();

        let due: Vec<AutomationTask> = self
            .cycle
            .tasks()
            .list()
            .into_iter()
            .filter(|t| t.is_active() && t.is_due(now))
            .collect();

        let mut launched = Vec::new();
        for task in due {
            {
                let mut set = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if !set.insert(task.id.clone()) {
                    debug!(task_id = %task.task_id, "Previous cycle still running, skipping");
                    continue;
                }
            }

            let guard = InFlightGuard {
                set: self.in_flight.clone(),
                id: task.id.clone(),
            };
            let cycle = self.cycle.clone();
            let snapshot = task.clone();
            launched.push(task.id.clone());

            let handle = self.running.spawn(async move {
                let _guard = guard;
                if let Err(e) = cycle.run(&task, now).await {
                    warn!(task_id = %task.task_id, error = %e, "Task cycle failed");
                    if let Err(e) = cycle.record_exception(&task, &e.to_string(), Utc::now()) {
                        warn!(task_id = %task.task_id, error = %e, "Could not record cycle failure");
                    }
                }
            });
            self.spawned.insert(handle.id(), snapshot);
        }
        launched
    }

    fn reap(&mut self) {
        while let Some(result) = self.running.try_join_next_with_id() {
            self.settle(result);
        }
    }

    /// Wait for every in-flight cycle to finish.
    pub async fn drain(&mut self) {
        while let Some(result) = self.running.join_next_with_id().await {
            self.settle(result);
        }
    }

    fn settle(&mut self, result: Result<(Id, ()), JoinError>) {
        let e = match result {
            Ok((id, ())) => {
                self.spawned.remove(&id);
                return;
            }
            Err(e) => e,
        };

        let task = self.spawned.remove(&e.id());
        if !e.is_panic() {
            warn!(error = %e, "Task cycle cancelled");
            return;
        }
        let error = format!("task cycle panicked: {}", panic_message(e.into_panic().as_ref()));
        warn!(error = %error, "Task cycle panicked");

        let Some(task) = task else {
            return;
        };
        if let Err(e) = self.cycle.record_exception(&task, &error, Utc::now()) {
            warn!(task_id = %task.task_id, error = %e, "Could not record cycle failure");
        }
    }

    /// Run until `shutdown` resolves, then drain and clear the liveness
    /// record.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let pid = std::process::id();
        if let Err(e) = self.daemon_state.mark_running(pid) {
            warn!(error = %e, "Could not write daemon state");
        }
        info!(pid, tick_ms = self.tick.as_millis() as u64, "Automation scheduler started");

        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    let launched = self.tick(Utc::now());
                    if !launched.is_empty() {
                        debug!(count = launched.len(), "Launched task cycles");
                    }
                }
            }
        }

        info!(in_flight = self.running.len(), "Shutting down, waiting for running cycles");
        self.drain().await;
        if let Err(e) = self.daemon_state.clear() {
            warn!(error = %e, "Could not clear daemon state");
        }
        info!("Automation scheduler stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
