//! `stridecoach context` — Preview the next context package and check weekly load.

use super::runtime::{load_config, open_training_store};
use chrono::{Duration, Local};
use std::path::Path;
use std::sync::Arc;
use stridecoach_agent::ContextAssembler;
use stridecoach_core::memory::MemoryStore;
use stridecoach_memory::FileSessionMemory;
use stridecoach_tools::analytics::{LoadStatus, load_progression, weekly_stats};

/// Weeks compared by the load-progression check.
const LOAD_CHECK_WEEKS: i64 = 4;

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let training = open_training_store(&config)?;
    let memory: Arc<dyn MemoryStore> = Arc::new(FileSessionMemory::open(
        config.storage.memory_path(),
        config.profile.to_fixed_profile(),
    ));

    let now = Local::now().naive_local();
    let assembler = ContextAssembler::new((&config.context).into());
    let package = assembler.gather(training.as_ref(), memory.as_ref(), now).await;

    println!("{}", package.text);
    println!();

    let meta = &package.metadata;
    println!("📦 Context package");
    println!("  Words:      {} / {}", meta.word_count, meta.budget);
    println!("  Sessions:   {} of {}", meta.records_included, meta.records_total);
    println!("  Memory:     {} of {} entries", meta.memory_items_included, meta.memory_items_total);
    if meta.commentary_dropped {
        println!("  Commentary: dropped to fit the budget");
    }
    if meta.truncated {
        println!("  Text:       cut at the budget");
    }
    for section in &meta.per_section {
        println!("    {:<18} {:>5} words", section.name, section.words);
    }
    println!();

    let recent = training
        .activities_since(now - Duration::weeks(LOAD_CHECK_WEEKS))
        .await?;
    let check = load_progression(&weekly_stats(&recent));
    println!("📈 Weekly load check");
    match check.status {
        LoadStatus::InsufficientData => println!("  Not enough weeks to compare yet."),
        _ => {
            println!(
                "  This week {:.1} km vs {:.1} km average ({:+.1}%)",
                check.current_week_km, check.avg_previous_weeks_km, check.increase_pct
            );
            match &check.warning {
                Some(warning) => println!("  ⚠️  {warning}"),
                None => println!("  ✅ Progression within the safe range"),
            }
        }
    }

    Ok(())
}
