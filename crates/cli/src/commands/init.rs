//! `starbot init`: write a default config file.

use starbot_config::AppConfig;

pub fn run(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let dir = AppConfig::default_data_dir();
    let path = dir.join("config.toml");

    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        println!("  Re-run with --force to overwrite it.");
        return Ok(());
    }

    std::fs::create_dir_all(&dir).map_err(|e| format!("Failed to create {}: {e}", dir.display()))?;
    std::fs::write(&path, AppConfig::default_toml())
        .map_err(|e| format!("Failed to write {}: {e}", path.display()))?;

    println!("Wrote {}", path.display());
    println!("  Set api_key there, or export STARBOT_API_KEY.");
    Ok(())
}
