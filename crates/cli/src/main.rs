//! StarBot CLI, the main entry point.
//!
//! Commands:
//! - `init`     Write a default config file
//! - `chat`     Interactive or single-message chat
//! - `daemon`   Run the automation scheduler in the foreground
//! - `jobs`     Inspect and manage unattended jobs
//! - `status`   Show config, daemon and job status
//! - `history`  List, show and delete saved conversations

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "starbot",
    about = "StarBot: terminal agent with unattended file automation",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file to ~/.starbot/config.toml
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue a saved conversation
        #[arg(short, long)]
        resume: Option<String>,

        /// Ask before running dangerous tools, whatever the config says
        #[arg(long)]
        confirm: bool,
    },

    /// Run the automation scheduler until interrupted
    Daemon,

    /// Manage unattended jobs
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Show system status
    Status,

    /// Browse saved conversations
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum JobsAction {
    /// Watch for a file and delete it whenever it appears
    Create {
        /// Human-readable job name
        task_id: String,

        /// Absolute path of the file to watch
        file_path: String,

        /// Seconds between checks (1..=86400)
        #[arg(short, long, default_value_t = 1)]
        interval: i64,

        /// Stop after this RFC 3339 timestamp
        #[arg(long)]
        end_at: Option<String>,

        /// Conversation that receives the results
        #[arg(long, default_value = "cli")]
        conversation: String,

        /// Disable desktop notifications for this job
        #[arg(long)]
        no_notify: bool,
    },

    /// List all jobs
    List,

    /// Resume a job
    Enable { id: String },

    /// Pause a job
    Disable { id: String },

    /// Delete a job
    Remove { id: String },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List saved conversations, newest first
    List {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Print a saved conversation
    Show { id: String },

    /// Delete a saved conversation
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init { force } => commands::init::run(force)?,
        Commands::Chat {
            message,
            resume,
            confirm,
        } => commands::chat::run(message, resume, confirm).await?,
        Commands::Daemon => commands::daemon::run().await?,
        Commands::Jobs { action } => match action {
            JobsAction::Create {
                task_id,
                file_path,
                interval,
                end_at,
                conversation,
                no_notify,
            } => commands::jobs::create(commands::jobs::CreateArgs {
                task_id,
                file_path,
                interval,
                end_at,
                conversation,
                notify: !no_notify,
            })?,
            JobsAction::List => commands::jobs::list()?,
            JobsAction::Enable { id } => commands::jobs::set_enabled(&id, true)?,
            JobsAction::Disable { id } => commands::jobs::set_enabled(&id, false)?,
            JobsAction::Remove { id } => commands::jobs::remove(&id)?,
        },
        Commands::Status => commands::status::run()?,
        Commands::History { action } => match action {
            HistoryAction::List { limit } => commands::history::list(limit)?,
            HistoryAction::Show { id } => commands::history::show(&id)?,
            HistoryAction::Delete { id } => commands::history::delete(&id)?,
        },
    }

    Ok(())
}
