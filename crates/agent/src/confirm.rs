//! Confirmation gate for dangerous tool calls.
//!
//! The approver may answer before the agent loop reaches its await point
//! (the answer is buffered) or after (the waiting loop is woken). The gate
//! holds at most one buffered answer.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Default)]
struct Slot {
    waiter: Option<oneshot::Sender<bool>>,
    buffered: Option<bool>,
}

/// A cloneable handle shared between the agent loop and whoever approves
/// tool calls (terminal prompt, test harness).
#[derive(Debug, Clone, Default)]
pub struct ConfirmationGate {
    slot: Arc<Mutex<Slot>>,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deliver a decision.
    ///
    /// Wakes the pending waiter if there is one, otherwise buffers the
    /// answer. Returns `false` when an answer is already buffered; the new
    /// one is discarded.
    pub fn decide(&self, approved: bool) -> bool {
        let mut slot = self.lock();
        if let Some(waiter) = slot.waiter.take() {
            match waiter.send(approved) {
                Ok(()) => return true,
                // Waiter went away; fall through and buffer
                Err(_) => debug!("Confirmation waiter dropped before decision"),
            }
        }
        if slot.buffered.is_some() {
            return false;
        }
        slot.buffered = Some(approved);
        true
    }

    /// Wait for a decision, consuming a buffered one immediately if present.
    ///
    /// A dropped gate counts as a denial.
    pub async fn wait(&self) -> bool {
        let rx = {
            let mut slot = self.lock();
            if let Some(answer) = slot.buffered.take() {
                return answer;
            }
            let (tx, rx) = oneshot::channel();
            slot.waiter = Some(tx);
            rx
        };
        rx.await.unwrap_or(false)
    }

    /// Whether a waiter is currently suspended on this gate.
    pub fn is_waiting(&self) -> bool {
        self.lock().waiter.as_ref().is_some_and(|w| !w.is_closed())
    }

    /// Drop any buffered answer and release a pending waiter as denied.
    pub fn reset(&self) {
        let mut slot = self.lock();
        slot.buffered = None;
        if let Some(waiter) = slot.waiter.take() {
            let _ = waiter.send(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn decision_before_wait_is_buffered() {
        let gate = ConfirmationGate::new();
        assert!(gate.decide(true));
        assert!(gate.wait().await);
    }

    #[tokio::test]
    async fn decision_after_wait_wakes_waiter() {
        let gate = ConfirmationGate::new();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };
        while !gate.is_waiting() {
            tokio::task::yield_now().await;
        }
        assert!(gate.decide(false));
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn buffered_answer_consumed_exactly_once() {
        let gate = ConfirmationGate::new();
        gate.decide(true);
        assert!(gate.wait().await);

        let second = tokio::time::timeout(Duration::from_millis(50), gate.wait()).await;
        assert!(second.is_err(), "second wait must not see the consumed answer");
    }

    #[test]
    fn single_slot_rejects_second_buffered_answer() {
        let gate = ConfirmationGate::new();
        assert!(gate.decide(false));
        assert!(!gate.decide(true));
    }

    #[tokio::test]
    async fn reset_releases_waiter_as_denied() {
        let gate = ConfirmationGate::new();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };
        while !gate.is_waiting() {
            tokio::task::yield_now().await;
        }
        gate.reset();
        assert!(!waiter.await.unwrap());
    }
}
