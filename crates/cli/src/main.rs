//! StrideCoach CLI — the main entry point.
//!
//! Commands:
//! - `onboard`  — Write a default config
//! - `chat`     — Interactive coaching chat or single-message mode
//! - `ping`     — Check the model connection
//! - `context`  — Show the context package the next turn would send
//! - `history`  — Show persisted chat history
//! - `tools`    — List the capabilities offered to the model

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "stridecoach",
    about = "StrideCoach — a function-calling running coach",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.stridecoach/config.toml)
    #[arg(short, long, global = true, env = "STRIDECOACH_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration
    Onboard,

    /// Chat with the coach
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Check that the model answers within the health-check deadline
    Ping,

    /// Preview the context package and the weekly load check
    Context,

    /// Show persisted chat history
    History {
        /// Number of messages to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// List the capabilities the model may call
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Onboard => commands::onboard::run(config)?,
        Commands::Chat { message } => commands::chat::run(config, message).await?,
        Commands::Ping => commands::ping::run(config).await?,
        Commands::Context => commands::context::run(config).await?,
        Commands::History { limit } => commands::history::run(config, limit).await?,
        Commands::Tools => commands::tools::run(config)?,
    }

    Ok(())
}
