//! `starbot status`: show config, daemon and job status.

use starbot_automation::{DaemonStateStore, ResultStore, TaskStore};
use starbot_config::AppConfig;
use starbot_memory::ConversationStore;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let data_dir = config.data_dir();

    println!("StarBot Status");
    println!("==============");
    println!("  Data dir:     {}", data_dir.display());
    println!("  Endpoint:     {}", config.base_url);
    println!("  Model:        {}", config.model);
    println!("  Temperature:  {}", config.temperature);
    println!("  API key:      {}", if config.has_api_key() { "set" } else { "missing" });
    println!(
        "  Iterations:   {}",
        config
            .agent
            .iteration_limit()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unbounded".into())
    );
    println!(
        "  Confirm:      {}",
        if config.agent.confirm_dangerous { "dangerous tools" } else { "off" }
    );

    let daemon = DaemonStateStore::in_data_dir(&data_dir).status();
    match (daemon.running, daemon.pid, daemon.started_at) {
        (true, Some(pid), Some(started)) => {
            println!("  Daemon:       running (pid {pid}, since {})", started.to_rfc3339())
        }
        (true, Some(pid), None) => println!("  Daemon:       running (pid {pid})"),
        _ => println!("  Daemon:       stopped"),
    }

    let tasks = TaskStore::in_data_dir(&data_dir).list();
    let active = tasks.iter().filter(|t| t.is_active()).count();
    println!("  Jobs:         {} total, {active} active", tasks.len());

    let pending = ResultStore::in_data_dir(&data_dir)
        .list_all()
        .into_iter()
        .filter(|r| !r.reported)
        .count();
    println!("  Unreported:   {pending} result(s)");

    let conversations = ConversationStore::in_data_dir(&data_dir).list(usize::MAX).len();
    println!("  History:      {conversations} conversation(s)");

    let config_path = AppConfig::default_data_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file. Run `starbot init` first");
    }

    Ok(())
}
