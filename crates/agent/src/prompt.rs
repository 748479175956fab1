//! The built-in system prompt.

/// Appended when a saved conversation is resumed.
pub const CONTINUE_REMINDER: &str =
    "Resuming a previous conversation: read the history above before answering the user's current request.";

fn os_name() -> &'static str {
    match std::env::consts::OS {
        "windows" => "Windows",
        "macos" => "macOS",
        "linux" => "Linux",
        other => other,
    }
}

/// Describe the host environment and the expected working style.
pub fn default_system_prompt() -> String {
    let shell = if cfg!(target_os = "windows") { "cmd/powershell" } else { "sh/bash" };
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".into());
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| ".".into());
    let date = chrono::Local::now().format("%Y-%m-%d");

    format!(
        "You are StarBot, a local assistant that completes tasks by calling tools. Be concise and direct.
<environment>
os: {os}
shell: {shell}
user: {user}
cwd: {cwd}
date: {date}
</environment>
<behavior>
1) Call tools directly to get the task done.
2) Chain several tools for multi-step work.
3) When a tool fails, read the error before retrying.
4) For recurring checks, register an unattended job instead of looping with wait.
5) Finish each step with a short conclusion.
</behavior>",
        os = os_name(),
    )
}
