//! `stridecoach ping` — Connectivity check against the configured model.

use super::runtime::Runtime;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let runtime = Runtime::build(config_path).await?;

    println!("📡 Pinging {} ({})", runtime.config.provider, runtime.config.model);
    match runtime.orchestrator.ping().await {
        Ok(latency) => {
            println!("  ✅ Model answered in {} ms", latency.as_millis());
            Ok(())
        }
        Err(failure) => {
            println!("  ❌ {}", failure.message);
            println!("     {}", failure.recovery.hint());
            anyhow::bail!("connectivity check failed: {}", failure.kind)
        }
    }
}
