//! `stridecoach tools` — List the capabilities offered to the model.

use super::runtime::{build_registry, load_config};
use std::path::Path;
use std::sync::Arc;
use stridecoach_tools::InMemoryTrainingStore;

pub fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let registry = build_registry(&config, Arc::new(InMemoryTrainingStore::new()))?;

    println!("🛠️  Capabilities ({})", registry.len());
    println!("==================");
    for descriptor in registry.descriptors() {
        let params = descriptor.parameters["properties"]
            .as_object()
            .map(|props| props.keys().cloned().collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        println!("  {}({params})", descriptor.name);
        println!("      {}", descriptor.description);
    }

    Ok(())
}
