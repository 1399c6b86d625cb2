//! `stridecoach onboard` — First-time setup.

use super::runtime::load_config;
use std::path::Path;
use stridecoach_config::AppConfig;

pub fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let default_path = AppConfig::config_dir().join("config.toml");
    let config_path = config_path.unwrap_or(&default_path);

    println!("🏃 StrideCoach — First-Time Setup");
    println!("=================================\n");

    if let Some(dir) = config_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if dir.exists() {
            println!("  Config directory exists: {}", dir.display());
        } else {
            std::fs::create_dir_all(dir)?;
            println!("✅ Created config directory: {}", dir.display());
        }
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        // Surface validation problems in the existing file
        load_config(Some(config_path))?;
        println!("✅ Existing config is valid.\n");
        return Ok(());
    }

    std::fs::write(config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set GEMINI_API_KEY (or api_key in the config)");
    println!("   2. Fill in [profile] with your race, date and target time");
    println!("   3. Point storage.training_data at your activity export");
    println!("   4. Run: stridecoach ping, then stridecoach chat\n");

    Ok(())
}
