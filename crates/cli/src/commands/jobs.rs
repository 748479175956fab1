//! `starbot jobs`: inspect and manage unattended jobs.

use starbot_automation::{AutomationTask, NewFileDeleteTask, TaskPatch, TaskStatus, TaskStore};

pub struct CreateArgs {
    pub task_id: String,
    pub file_path: String,
    pub interval: i64,
    pub end_at: Option<String>,
    pub conversation: String,
    pub notify: bool,
}

fn store() -> Result<TaskStore, Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    Ok(TaskStore::in_data_dir(&config.data_dir()))
}

/// Accept either the store id or the human-readable task name.
fn resolve(store: &TaskStore, key: &str) -> Result<AutomationTask, Box<dyn std::error::Error>> {
    let tasks = store.list();
    if let Some(task) = tasks.iter().find(|t| t.id == key) {
        return Ok(task.clone());
    }
    let mut named = tasks.into_iter().filter(|t| t.task_id == key);
    match (named.next(), named.next()) {
        (Some(task), None) => Ok(task),
        (Some(_), Some(_)) => Err(format!("More than one job is named '{key}'; use its id").into()),
        (None, _) => Err(format!("No job '{key}'").into()),
    }
}

pub fn create(args: CreateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = store()?;
    let task = store
        .create_file_delete_task(NewFileDeleteTask {
            origin_conversation_id: args.conversation,
            task_id: args.task_id,
            file_path: args.file_path,
            interval_sec: args.interval,
            end_at: args.end_at,
            notify: args.notify,
            escalation: None,
        })
        .map_err(|e| format!("Could not create job: {e}"))?;

    println!("Created job {} ({})", task.task_id, task.id);
    println!("  Every {}s, watching {}", task.interval_sec, task.watcher.target());
    println!("  Start `starbot daemon` to run it.");
    Ok(())
}

pub fn list() -> Result<(), Box<dyn std::error::Error>> {
    let tasks = store()?.list();

    if tasks.is_empty() {
        println!("No jobs.");
        println!();
        println!("  Create one with:");
        println!("  starbot jobs create tmp-cleanup /tmp/stale.lock --interval 30");
        return Ok(());
    }

    println!("Jobs ({}):", tasks.len());
    println!("{:-<80}", "");
    for task in &tasks {
        println!("{}", format_task(task));
    }
    Ok(())
}

fn format_task(task: &AutomationTask) -> String {
    let state = match (task.enabled, task.status) {
        (_, TaskStatus::Completed) => "done",
        (true, TaskStatus::Running) => "on",
        (false, TaskStatus::Running) => "paused",
    };
    let last_run = task
        .last_run_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".into());

    let mut line = format!(
        "  [{state:<6}] {:<20} every {:>5}s  last: {} ({})  {}",
        task.task_id,
        task.interval_sec,
        last_run,
        task.last_status.as_str(),
        task.watcher.target()
    );
    line.push_str(&format!("\n           id: {}", task.id));
    if !task.last_error.is_empty() {
        line.push_str(&format!("\n           error: {}", task.last_error));
    }
    line
}

pub fn set_enabled(key: &str, enabled: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = store()?;
    let task = resolve(&store, key)?;
    let patch = TaskPatch {
        enabled: Some(enabled),
        status: enabled.then_some(TaskStatus::Running),
        ..Default::default()
    };
    let task = store.update(&task.id, patch).map_err(|e| format!("Could not update job: {e}"))?;

    let verb = if enabled { "Enabled" } else { "Disabled" };
    println!("{verb} job {} ({})", task.task_id, task.id);
    Ok(())
}

pub fn remove(key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = store()?;
    let task = resolve(&store, key)?;
    if store.remove(&task.id).map_err(|e| format!("Could not remove job: {e}"))? {
        println!("Removed job {} ({})", task.task_id, task.id);
    } else {
        println!("Job {} was already gone", task.task_id);
    }
    Ok(())
}
