//! `starbot history`: browse saved conversations.

use starbot_core::message::{Message, Role};
use starbot_memory::ConversationStore;

fn store() -> Result<ConversationStore, Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    Ok(ConversationStore::in_data_dir(&config.data_dir()))
}

pub fn list(limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let conversations = store()?.list(limit);

    if conversations.is_empty() {
        println!("No saved conversations.");
        return Ok(());
    }

    println!("Conversations ({}):", conversations.len());
    println!("{:-<72}", "");
    for summary in &conversations {
        println!(
            "  {:<24} {}  {:>4} msgs  {}",
            summary.id,
            summary.updated_at.format("%Y-%m-%d %H:%M"),
            summary.message_count,
            summary.title
        );
    }
    println!();
    println!("  Resume one with: starbot chat --resume <id>");
    Ok(())
}

pub fn show(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let record = store()?.load(id).ok_or_else(|| format!("No saved conversation '{id}'"))?;

    println!("{} ({})", record.title, record.id);
    println!("  created {}, updated {}", record.created_at.to_rfc3339(), record.updated_at.to_rfc3339());
    println!();
    for message in record.messages.iter().filter(|m| m.role != Role::System) {
        println!("{}", render(message));
    }
    Ok(())
}

pub fn delete(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    if store()?.delete(id) {
        println!("Deleted conversation {id}");
    } else {
        println!("No saved conversation '{id}'");
    }
    Ok(())
}

fn render(message: &Message) -> String {
    let label = match message.role {
        Role::User => "You",
        Role::Assistant => "Bot",
        Role::Tool => "Tool",
        Role::System => "System",
    };
    let mut text = format!("  {label} > {}", message.content.as_deref().unwrap_or_default());
    for call in &message.tool_calls {
        text.push_str(&format!("\n        [call] {} {}", call.name, call.arguments));
    }
    text
}
