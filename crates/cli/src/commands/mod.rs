pub mod chat;
pub mod daemon;
pub mod history;
pub mod init;
pub mod jobs;
pub mod status;

use starbot_config::AppConfig;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}
