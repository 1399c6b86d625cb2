//! Wiring shared by the commands: config, stores, registry and orchestrator.

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use stridecoach_agent::TurnOrchestrator;
use stridecoach_config::AppConfig;
use stridecoach_core::event::EventBus;
use stridecoach_core::history::ChatHistoryStore;
use stridecoach_core::memory::MemoryStore;
use stridecoach_core::tool::CapabilityRegistry;
use stridecoach_core::training::TrainingStore;
use stridecoach_memory::{FileSessionMemory, open_chat_history};
use stridecoach_tools::{InMemoryTrainingStore, coach_registry};
use tracing::{debug, warn};

pub struct Runtime {
    pub config: AppConfig,
    pub training: Arc<dyn TrainingStore>,
    pub memory: Arc<dyn MemoryStore>,
    pub history: Arc<dyn ChatHistoryStore>,
    pub event_bus: Arc<EventBus>,
    pub orchestrator: TurnOrchestrator,
}

/// Load `path`, or the default location, with env overrides applied.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(p) => AppConfig::load_with_env(p),
        None => AppConfig::load(),
    };
    config.context("Failed to load config")
}

/// The training store named by `storage.training_data`, or an empty one.
pub fn open_training_store(config: &AppConfig) -> anyhow::Result<Arc<dyn TrainingStore>> {
    match config.storage.training_data_path() {
        Some(path) => {
            let store = InMemoryTrainingStore::from_json_file(&path)
                .with_context(|| format!("Failed to load training data from {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("No storage.training_data configured, starting with an empty training log");
            Ok(Arc::new(InMemoryTrainingStore::new()))
        }
    }
}

/// The coach registry, narrowed to `coach.enabled_tools` when set.
pub fn build_registry(config: &AppConfig, training: Arc<dyn TrainingStore>) -> anyhow::Result<CapabilityRegistry> {
    let registry = coach_registry(training)?;
    if config.coach.enabled_tools.is_empty() {
        return Ok(registry);
    }
    registry
        .restrict(&config.coach.enabled_tools)
        .context("Invalid coach.enabled_tools")
}

impl Runtime {
    pub async fn build(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config = load_config(config_path)?;

        let training = open_training_store(&config)?;
        let registry = Arc::new(build_registry(&config, training.clone())?);

        let memory: Arc<dyn MemoryStore> = Arc::new(FileSessionMemory::open(
            config.storage.memory_path(),
            config.profile.to_fixed_profile(),
        ));

        let history_path = config.storage.history_path();
        if let Some(parent) = history_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let history = open_chat_history(&config.storage.history_backend, &history_path)
            .await
            .context("Failed to open chat history")?;

        let router = stridecoach_providers::build_from_config(&config);
        let provider = router
            .default()
            .with_context(|| format!("Provider '{}' is not configured", config.provider))?;

        let event_bus = Arc::new(EventBus::default());
        let orchestrator = TurnOrchestrator::new(
            provider,
            registry,
            training.clone(),
            memory.clone(),
            event_bus.clone(),
        )
        .with_config(&config)
        .with_history(history.clone());

        debug!(
            provider = %config.provider,
            model = %config.model,
            history_backend = history.name(),
            memory_backend = memory.name(),
            "Runtime ready"
        );

        Ok(Self {
            config,
            training,
            memory,
            history,
            event_bus,
            orchestrator,
        })
    }
}
