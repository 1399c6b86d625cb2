//! `stridecoach history` — Show persisted chat history.

use super::runtime::load_config;
use chrono::Local;
use std::path::Path;
use stridecoach_core::history::load_recent;
use stridecoach_core::message::Role;
use stridecoach_memory::open_chat_history;

pub async fn run(config_path: Option<&Path>, limit: usize) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let path = config.storage.history_path();
    if config.storage.history_backend == "sqlite" && !path.exists() {
        println!("💬 No chat history yet ({}).", path.display());
        return Ok(());
    }

    let store = open_chat_history(&config.storage.history_backend, &path).await?;
    let total = store.count().await?;
    let records = load_recent(store.as_ref(), limit).await?;

    println!("💬 Chat history ({} of {total} messages)", records.len());
    println!("==================================");
    for record in &records {
        let who = match record.role {
            Role::User => "You  ",
            Role::Assistant => "Coach",
        };
        let when = record.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M");
        let mut lines = record.content.lines();
        println!("  [{when}] {who} > {}", lines.next().unwrap_or_default());
        for line in lines {
            println!("  {:>25}{line}", "");
        }
    }

    Ok(())
}
