//! `starbot chat`: interactive or single-message chat mode.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use starbot_agent::{Agent, AgentEvent};
use starbot_automation::{
    DaemonStateStore, ResultStore, TaskStore, collect_conversation_summary, mark_digest_reported,
    register_job_tools,
};
use starbot_config::AppConfig;
use starbot_core::provider::Provider;
use starbot_memory::{ConversationStore, MemoryLimits};
use starbot_providers::OpenAiCompatProvider;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, warn};

const RESULT_PREVIEW_CHARS: usize = 400;

type StdinLines = Lines<BufReader<Stdin>>;

pub async fn run(message: Option<String>, resume: Option<String>, confirm: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Export STARBOT_API_KEY, or add api_key to:");
        eprintln!("    {}", AppConfig::default_data_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let data_dir = config.data_dir();
    let history = ConversationStore::in_data_dir(&data_dir);
    let results = ResultStore::in_data_dir(&data_dir);

    let conversation_id = resume
        .clone()
        .unwrap_or_else(|| format!("chat-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S")));

    let mut agent = build_agent(&config, &data_dir, &conversation_id);
    if confirm {
        agent = agent.with_confirm_dangerous(true);
    }

    if let Some(id) = &resume {
        let record = history.load(id).ok_or_else(|| format!("No saved conversation '{id}'"))?;
        agent.load_messages(record.messages, true);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if let Some(msg) = message {
        report_pending(&results, &conversation_id);
        drive_turn(&mut agent, &msg, &mut lines).await?;
        save(&history, &agent);
        return Ok(());
    }

    println!();
    println!("  StarBot, interactive mode");
    println!();
    println!("  Model:         {}", config.model);
    println!("  Conversation:  {conversation_id}");
    println!("  Tools:         {}", agent_tool_names(&agent));
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type '/reset' to start over, 'exit' or Ctrl+C to quit.");
    println!();

    loop {
        report_pending(&results, &conversation_id);

        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q") {
            break;
        }
        if line == "/reset" {
            agent.reset();
            println!("  Conversation cleared.");
            continue;
        }

        drive_turn(&mut agent, line, &mut lines).await?;
        save(&history, &agent);
    }

    println!();
    println!("  Resume later with: starbot chat --resume {conversation_id}");
    Ok(())
}

/// Wire an agent the way the config describes it, with the job tools bound
/// to the shared data directory.
pub(crate) fn build_agent(config: &AppConfig, data_dir: &Path, conversation_id: &str) -> Agent {
    let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::new(
        "openai",
        &config.base_url,
        config.api_key.clone().unwrap_or_default(),
    ));

    let mut tools = starbot_tools::default_registry();
    register_job_tools(
        &mut tools,
        Arc::new(TaskStore::in_data_dir(data_dir)),
        Arc::new(DaemonStateStore::in_data_dir(data_dir)),
    );

    let mut agent = Agent::new(provider, Arc::new(tools), &config.model);
    if let Some(prompt) = &config.agent.system_prompt {
        agent = agent.with_system_prompt(prompt);
    }

    agent
        .with_memory_limits(MemoryLimits {
            max_history_messages: config.memory.max_history_messages,
            max_tool_output_chars: config.memory.max_tool_output_chars,
        })
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
        .with_max_iterations(config.agent.iteration_limit())
        .with_confirm_dangerous(config.agent.confirm_dangerous)
        .with_conversation_id(conversation_id)
}

fn agent_tool_names(agent: &Agent) -> String {
    agent.tool_names().join(", ")
}

/// Show the outbox digest for this conversation, then mark it delivered.
fn report_pending(results: &ResultStore, conversation_id: &str) {
    let Some(digest) = collect_conversation_summary(results, conversation_id) else {
        return;
    };

    println!();
    for line in digest.text.lines() {
        println!("  {line}");
    }
    println!();

    if let Err(e) = mark_digest_reported(results, &digest) {
        warn!(conversation_id, error = %e, "Could not mark results as reported");
    }
}

async fn drive_turn(agent: &mut Agent, input: &str, lines: &mut StdinLines) -> Result<(), Box<dyn std::error::Error>> {
    let gate = agent.confirmation_gate();
    let mut turn = agent.run(input);
    let mut mid_line = false;

    while let Some(event) = turn.next().await {
        if mid_line && !matches!(event, AgentEvent::Text { .. } | AgentEvent::Usage { .. }) {
            println!();
            mid_line = false;
        }

        match event {
            AgentEvent::Text { content } => {
                if !mid_line {
                    print!("  Bot > ");
                    mid_line = true;
                }
                print!("{content}");
                std::io::stdout().flush()?;
            }
            AgentEvent::ToolCall { name, arguments, .. } => {
                println!("  [tool] {name} {arguments}");
            }
            AgentEvent::ConfirmationRequested { name, arguments, .. } => {
                print!("  Allow {name} {arguments}? [y/N] ");
                std::io::stdout().flush()?;
                let answer = lines.next_line().await?.unwrap_or_default();
                gate.decide(is_yes(&answer));
            }
            AgentEvent::ToolResult { name, output, .. } => {
                println!("  [{name}] {}", preview(&output));
            }
            AgentEvent::Usage { request, cumulative } => {
                debug!(
                    request_tokens = request.total_tokens,
                    total_tokens = cumulative.total_tokens,
                    "Token usage"
                );
            }
            AgentEvent::Error { message } => {
                eprintln!("  Error: {message}");
            }
        }
    }

    if mid_line {
        println!();
    }
    println!();
    Ok(())
}

fn save(history: &ConversationStore, agent: &Agent) {
    let Some(id) = agent.conversation_id() else {
        return;
    };
    if let Err(e) = history.save(id, agent.messages()) {
        warn!(conversation_id = id, error = %e, "Could not save conversation");
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn preview(output: &str) -> String {
    let single_line = output.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= RESULT_PREVIEW_CHARS {
        return single_line;
    }
    let head: String = single_line.chars().take(RESULT_PREVIEW_CHARS).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_answers() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES \n"));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
        assert!(!is_yes("yep"));
    }

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("a\n  b\tc"), "a b c");
        let long = "x".repeat(RESULT_PREVIEW_CHARS + 10);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), RESULT_PREVIEW_CHARS + 3);
    }

    #[test]
    fn build_agent_applies_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.api_key = Some("sk-test".into());
        config.agent.system_prompt = Some("Be brief.".into());

        let agent = build_agent(&config, dir.path(), "conv-9");
        assert_eq!(agent.conversation_id(), Some("conv-9"));
        assert_eq!(agent.messages()[0].content.as_deref(), Some("Be brief."));
        assert!(agent.tool_names().contains(&"unattended_watch_delete_file"));
        assert!(agent.tool_names().contains(&"shell_exec"));
    }
}
