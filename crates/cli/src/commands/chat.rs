//! `stridecoach chat` — Interactive or single-message coaching chat.

use super::runtime::Runtime;
use chrono::Local;
use std::io::Write;
use std::path::Path;
use stridecoach_agent::{SessionState, TurnFailure, TurnOutcome, contextual_greeting};
use stridecoach_core::event::DomainEvent;
use stridecoach_core::history::load_recent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

pub async fn run(config_path: Option<&Path>, message: Option<String>) -> anyhow::Result<()> {
    let runtime = Runtime::build(config_path).await?;

    // Check for an API key early and give a clear error
    if !runtime.config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export GEMINI_API_KEY=...        (recommended)");
        eprintln!("    export STRIDECOACH_API_KEY=...   (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", stridecoach_config::AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        anyhow::bail!("No API key found. See above for setup instructions.");
    }

    spawn_progress_printer(&runtime);

    let mut session = resume_session(&runtime).await;

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let report = runtime.orchestrator.run_turn(session, &msg).await;
        eprint!("\r              \r");
        return match report.outcome {
            TurnOutcome::Answered(answer) => {
                println!("{}", answer.text);
                Ok(())
            }
            TurnOutcome::Failed(failure) => {
                print_failure(&failure);
                anyhow::bail!("turn failed: {}", failure.kind)
            }
        };
    }

    // Interactive mode
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║       StrideCoach — Interactive Coaching      ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {}", runtime.config.provider);
    println!("  Model:     {}", runtime.config.model);
    println!("  Tools:     {} capabilities", runtime.orchestrator.registry().len());
    println!("  Race:      {} ({})", runtime.config.profile.race_name, runtime.config.profile.race_date);
    println!("  History:   {} earlier messages", session.conversation.len());
    println!("  Memory:    {} session notes", runtime.memory.count().await.unwrap_or_default());
    println!();
    let greeting = contextual_greeting(runtime.training.as_ref(), Local::now().naive_local()).await;
    println!("  Coach > {greeting}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            prompt()?;
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        eprint!("  ...");
        let report = runtime.orchestrator.run_turn(session, input).await;
        eprint!("\r     \r");
        session = report.session;

        match report.outcome {
            TurnOutcome::Answered(answer) => {
                println!();
                for line in answer.text.lines() {
                    println!("  Coach > {line}");
                }
                if !answer.functions_executed.is_empty() {
                    println!("  (functions: {})", answer.functions_executed.join(", "));
                }
                println!();
            }
            TurnOutcome::Failed(failure) => {
                print_failure(&failure);
                println!();
            }
        }

        prompt()?;
    }

    println!();
    println!(
        "  Goodbye! {} turns, {} function calls this session.",
        session.turns_completed,
        session.functions_log.len()
    );
    println!();

    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

/// Continue from persisted history, or start fresh if it cannot be read.
async fn resume_session(runtime: &Runtime) -> SessionState {
    match load_recent(runtime.history.as_ref(), runtime.config.coach.history_window).await {
        Ok(records) => SessionState::resume(records),
        Err(e) => {
            warn!(error = %e, "Could not load chat history, starting a fresh session");
            SessionState::new()
        }
    }
}

/// Show capability progress on stderr while a turn runs.
fn spawn_progress_printer(runtime: &Runtime) {
    let mut rx = runtime.event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let DomainEvent::ToolExecuted { tool_name, success, duration_ms, .. } = event.as_ref() {
                let mark = if *success { "✓" } else { "✗" };
                eprintln!("\r  {mark} {tool_name} ({duration_ms} ms)");
            }
        }
    });
}

fn print_failure(failure: &TurnFailure) {
    eprintln!("  [{}] {}", failure.kind, failure.message);
    eprintln!("  → {}", failure.recovery.hint());
    if let Some(reason) = &failure.diagnostic.finish_reason {
        eprintln!("  finish reason: {reason}");
    }
    if let Some(detail) = &failure.diagnostic.detail {
        eprintln!("  details: {detail}");
    }
    if failure.has_fallback() {
        eprintln!("  Data gathered before the failure:");
        for result in &failure.fallback {
            let payload = serde_json::to_string_pretty(&result.payload).unwrap_or_default();
            eprintln!("  • {}:", result.name);
            for line in payload.lines() {
                eprintln!("      {line}");
            }
        }
    }
}
