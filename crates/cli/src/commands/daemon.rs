//! `starbot daemon`: run the automation scheduler in the foreground.

use std::sync::Arc;
use std::time::Duration;

use starbot_automation::{
    DaemonStateStore, DecisionModule, LlmDecisionModule, NoopNotifier, Notifier, ResultStore, Scheduler,
    SystemNotifier, TaskCycle, TaskStore,
};
use starbot_config::AppConfig;
use starbot_core::event::{DomainEvent, EventBus};
use starbot_providers::OpenAiCompatProvider;
use tracing::{info, warn};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let data_dir = config.data_dir();

    let daemon_state = DaemonStateStore::in_data_dir(&data_dir);
    let status = daemon_state.status();
    if status.running && status.pid != Some(std::process::id()) {
        let pid = status.pid.map(|p| p.to_string()).unwrap_or_default();
        return Err(format!("Daemon already running (pid {pid})").into());
    }

    let tasks = Arc::new(TaskStore::in_data_dir(&data_dir));
    let results = Arc::new(ResultStore::in_data_dir(&data_dir));
    let active = tasks.list().iter().filter(|t| t.is_active()).count();

    println!("StarBot daemon starting");
    println!("  Data dir:  {}", data_dir.display());
    println!("  Jobs:      {active} active");
    println!("  Tick:      {} ms", config.automation.tick_ms);
    println!(
        "  Decision:  {}",
        if config.decision_api_key().is_some() {
            config.decision.model.as_str()
        } else {
            "not configured (fallback: escalate)"
        }
    );
    println!("  Press Ctrl+C to stop.");

    let event_bus = Arc::new(EventBus::new(256));
    tokio::spawn(log_events(event_bus.clone()));

    let cycle = TaskCycle::new(tasks, results)
        .with_notifier(notifier(&config))
        .with_decision_module(decision_module(&config))
        .with_event_bus(event_bus);

    Scheduler::new(Arc::new(cycle), daemon_state)
        .with_tick(Duration::from_millis(config.automation.tick_ms))
        .run(shutdown_signal())
        .await;

    println!("StarBot daemon stopped");
    Ok(())
}

fn notifier(config: &AppConfig) -> Arc<dyn Notifier> {
    if config.automation.notify {
        Arc::new(SystemNotifier)
    } else {
        Arc::new(NoopNotifier)
    }
}

fn decision_module(config: &AppConfig) -> Arc<dyn DecisionModule> {
    match config.decision_api_key() {
        Some(key) => {
            let provider = OpenAiCompatProvider::new("decision", config.decision_base_url(), key);
            Arc::new(LlmDecisionModule::new(Arc::new(provider), &config.decision.model))
        }
        None => Arc::new(LlmDecisionModule::unconfigured()),
    }
}

async fn log_events(bus: Arc<EventBus>) {
    let mut rx = bus.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => match event.as_ref() {
                DomainEvent::TaskCycleFinished {
                    task_id, event, status, ..
                } => info!(task_id = %task_id, event = %event, status = %status, "Cycle finished"),
                DomainEvent::DecisionMade {
                    task_id,
                    recommended_action,
                    ..
                } => info!(task_id = %task_id, action = %recommended_action, "Decision made"),
                _ => {}
            },
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event log fell behind");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decision_module_without_key_falls_back() {
        let config = AppConfig::default();
        let module = decision_module(&config);
        let input = starbot_automation::DecisionInput {
            task_id: "t".into(),
            event_type: "file_detected_but_action_failed".into(),
            decision_required: "classify".into(),
            context: starbot_automation::EventContext {
                action_success: false,
                error_streak: 2,
                unknown_pattern: false,
                metrics_conflict: false,
                last_error: Some("permission denied".into()),
            },
            timestamp: chrono::Utc::now(),
        };

        let decision = starbot_automation::decide_with_fallback(module.as_ref(), &input).await;
        assert_eq!(decision.analysis.recommended_action, "escalate");
        assert_eq!(decision.analysis.reason_codes, vec!["missing_api_key".to_string()]);
    }
}
