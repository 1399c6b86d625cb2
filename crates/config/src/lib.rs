//! Configuration loading, validation, and management for StrideCoach.
//!
//! Loads configuration from `~/.stridecoach/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use stridecoach_core::FixedProfile;

/// The root configuration structure.
///
/// Maps directly to `~/.stridecoach/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// LLM provider: "gemini" or an OpenAI-compatible name
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Max tokens per model response
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Turn orchestration settings
    #[serde(default)]
    pub coach: CoachConfig,

    /// Context package budget settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Fixed profile facts
    #[serde(default)]
    pub profile: ProfileConfig,

    /// Where history, memory and training data live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.0-flash-exp".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.95
}
fn default_top_k() -> u32 {
    40
}
fn default_max_output_tokens() -> u32 {
    4096
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("coach", &self.coach)
            .field("context", &self.context)
            .field("profile", &self.profile)
            .field("storage", &self.storage)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Turn orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachConfig {
    /// Model round-trips allowed per turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Deadline for each generation call
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,

    /// Deadline for connectivity checks
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout_secs: u64,

    /// Prior conversation messages sent with each turn
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Replace the built-in coach persona
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Capabilities exposed to the model (empty = all)
    #[serde(default)]
    pub enabled_tools: Vec<String>,
}

fn default_max_iterations() -> u32 {
    5
}
fn default_generation_timeout() -> u64 {
    30
}
fn default_health_check_timeout() -> u64 {
    10
}
fn default_history_window() -> usize {
    10
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            generation_timeout_secs: default_generation_timeout(),
            health_check_timeout_secs: default_health_check_timeout(),
            history_window: default_history_window(),
            system_prompt: None,
            enabled_tools: vec![],
        }
    }
}

/// Context package budget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Hard ceiling on the package's word count
    #[serde(default = "default_word_budget")]
    pub word_budget: usize,

    /// Words kept free below the budget while sizing the history
    #[serde(default = "default_safety_margin")]
    pub safety_margin: usize,

    /// History records to start from
    #[serde(default = "default_target_records")]
    pub target_records: usize,

    /// Record floor before commentary is dropped
    #[serde(default = "default_min_records")]
    pub min_records: usize,

    /// Session memory entries rendered
    #[serde(default = "default_memory_items")]
    pub memory_items: usize,

    /// Per-entry character ceiling for session memory
    #[serde(default = "default_memory_entry_chars")]
    pub memory_entry_chars: usize,

    /// Per-record character ceiling for activity commentary
    #[serde(default = "default_commentary_chars")]
    pub commentary_chars: usize,

    /// Window for the KPI block
    #[serde(default = "default_kpi_window_weeks")]
    pub kpi_window_weeks: u32,
}

fn default_word_budget() -> usize {
    3500
}
fn default_safety_margin() -> usize {
    200
}
fn default_target_records() -> usize {
    20
}
fn default_min_records() -> usize {
    5
}
fn default_memory_items() -> usize {
    5
}
fn default_memory_entry_chars() -> usize {
    160
}
fn default_commentary_chars() -> usize {
    120
}
fn default_kpi_window_weeks() -> u32 {
    4
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            word_budget: default_word_budget(),
            safety_margin: default_safety_margin(),
            target_records: default_target_records(),
            min_records: default_min_records(),
            memory_items: default_memory_items(),
            memory_entry_chars: default_memory_entry_chars(),
            commentary_chars: default_commentary_chars(),
            kpi_window_weeks: default_kpi_window_weeks(),
        }
    }
}

/// Fixed profile facts, rendered at the top of every context package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_runner_since")]
    pub runner_since: String,

    #[serde(default = "default_sessions_per_week")]
    pub sessions_per_week: u32,

    #[serde(default = "default_race_name")]
    pub race_name: String,

    #[serde(default = "default_race_date")]
    pub race_date: NaiveDate,

    #[serde(default = "default_race_distance_km")]
    pub race_distance_km: f64,

    /// `H:MM:SS`
    #[serde(default = "default_target_time")]
    pub target_time: String,

    #[serde(default = "default_safety_rule")]
    pub safety_rule: String,
}

fn default_runner_since() -> String {
    "early 2025".into()
}
fn default_sessions_per_week() -> u32 {
    3
}
fn default_race_name() -> String {
    "Barcelona Half Marathon".into()
}
fn default_race_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2027, 2, 14).unwrap_or_default()
}
fn default_race_distance_km() -> f64 {
    21.0975
}
fn default_target_time() -> String {
    "1:34:56".into()
}
fn default_safety_rule() -> String {
    "weekly training load progression of 10-15% at most".into()
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            runner_since: default_runner_since(),
            sessions_per_week: default_sessions_per_week(),
            race_name: default_race_name(),
            race_date: default_race_date(),
            race_distance_km: default_race_distance_km(),
            target_time: default_target_time(),
            safety_rule: default_safety_rule(),
        }
    }
}

impl ProfileConfig {
    pub fn to_fixed_profile(&self) -> FixedProfile {
        FixedProfile {
            runner_since: self.runner_since.clone(),
            sessions_per_week: self.sessions_per_week,
            race_name: self.race_name.clone(),
            race_date: self.race_date,
            race_distance_km: self.race_distance_km,
            target_time: self.target_time.clone(),
            safety_rule: self.safety_rule.clone(),
        }
    }
}

/// Storage locations. Relative paths resolve against the config directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_history_backend")]
    pub history_backend: String,

    #[serde(default = "default_history_path")]
    pub history_path: String,

    /// JSONL session memory log
    #[serde(default = "default_memory_path")]
    pub memory_path: String,

    /// JSON export of activities, plans and profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_data: Option<String>,
}

fn default_history_backend() -> String {
    "sqlite".into()
}
fn default_history_path() -> String {
    "chat_history.db".into()
}
fn default_memory_path() -> String {
    "session_memory.jsonl".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_backend: default_history_backend(),
            history_path: default_history_path(),
            memory_path: default_memory_path(),
            training_data: None,
        }
    }
}

impl StorageConfig {
    pub fn history_path(&self) -> PathBuf {
        resolve(&self.history_path)
    }

    pub fn memory_path(&self) -> PathBuf {
        resolve(&self.memory_path)
    }

    pub fn training_data_path(&self) -> Option<PathBuf> {
        self.training_data.as_deref().map(resolve)
    }
}

fn resolve(path: &str) -> PathBuf {
    let p = PathBuf::from(path);
    if p.is_absolute() {
        p
    } else {
        AppConfig::config_dir().join(p)
    }
}

/// Environment variables consulted for the API key, highest priority first.
pub const API_KEY_VARS: [&str; 4] = [
    "STRIDECOACH_API_KEY",
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "DEEPINFRA_API_KEY",
];

impl AppConfig {
    /// Load configuration from the default path (~/.stridecoach/config.toml)
    /// and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path` and apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = API_KEY_VARS.iter().find_map(|var| lookup(var));
        }

        if let Some(provider) = lookup("STRIDECOACH_PROVIDER") {
            self.provider = provider;
        }

        if let Some(model) = lookup("STRIDECOACH_MODEL") {
            self.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stridecoach")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.coach.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "coach.max_iterations must be at least 1".into(),
            ));
        }

        if self.coach.generation_timeout_secs == 0 || self.coach.health_check_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "coach timeouts must be greater than zero".into(),
            ));
        }

        if self.context.min_records > self.context.target_records {
            return Err(ConfigError::ValidationError(
                "context.min_records must not exceed context.target_records".into(),
            ));
        }

        if self.context.safety_margin >= self.context.word_budget {
            return Err(ConfigError::ValidationError(
                "context.safety_margin must be smaller than context.word_budget".into(),
            ));
        }

        if !matches!(self.storage.history_backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "storage.history_backend must be 'sqlite' or 'memory', got '{}'",
                self.storage.history_backend
            )));
        }

        Ok(())
    }

    /// The API key for `provider`: its own entry first, then the top-level key.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key_for(&self.provider).is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_output_tokens: default_max_output_tokens(),
            coach: CoachConfig::default(),
            context: ContextConfig::default(),
            profile: ProfileConfig::default(),
            storage: StorageConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "gemini");
        assert_eq!(config.coach.max_iterations, 5);
        assert_eq!(config.context.word_budget, 3500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.profile.race_date, config.profile.race_date);
        assert_eq!(parsed.context.min_records, config.context.min_records);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let toml_str = r#"
provider = "deepinfra"

[coach]
max_iterations = 3

[profile]
race_name = "Valencia Marathon"
race_distance_km = 42.195
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider, "deepinfra");
        assert_eq!(config.coach.max_iterations, 3);
        assert_eq!(config.coach.generation_timeout_secs, 30);
        assert_eq!(config.profile.race_name, "Valencia Marathon");
        assert_eq!(config.profile.sessions_per_week, 3);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AppConfig::default();
        config.coach.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = AppConfig::default();
        config.coach.health_check_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn record_floor_above_target_rejected() {
        let mut config = AppConfig::default();
        config.context.min_records = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn margin_must_fit_budget() {
        let mut config = AppConfig::default();
        config.context.word_budget = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_history_backend_rejected() {
        let mut config = AppConfig::default();
        config.storage.history_backend = "postgres".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.model, "gemini-2.0-flash-exp");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = \"gemini-1.5-pro\"\n[context]\nword_budget = 1000\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.model, "gemini-1.5-pro");
        assert_eq!(config.context.word_budget, 1000);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "temperature = \"hot\"").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply_in_priority_order() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| match key {
            "GOOGLE_API_KEY" => Some("google-key".into()),
            "DEEPINFRA_API_KEY" => Some("deepinfra-key".into()),
            "STRIDECOACH_MODEL" => Some("gemini-1.5-flash".into()),
            _ => None,
        });
        assert_eq!(config.api_key.as_deref(), Some("google-key"));
        assert_eq!(config.model, "gemini-1.5-flash");
        assert_eq!(config.provider, "gemini");
    }

    #[test]
    fn file_api_key_beats_env() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env_overrides(|_| Some("from-env".into()));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn per_provider_key_wins() {
        let mut config = AppConfig {
            api_key: Some("global".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "deepinfra".into(),
            ProviderConfig { api_key: Some("di".into()), api_url: None, model: None },
        );
        assert_eq!(config.api_key_for("deepinfra").as_deref(), Some("di"));
        assert_eq!(config.api_key_for("gemini").as_deref(), Some("global"));
    }

    #[test]
    fn debug_redacts_keys() {
        let config = AppConfig {
            api_key: Some("super-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn profile_converts_to_fixed_profile() {
        let profile = ProfileConfig::default().to_fixed_profile();
        assert_eq!(profile.race_name, "Barcelona Half Marathon");
        assert_eq!(profile.target_seconds(), Some(5696));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gemini-2.0-flash-exp"));
        assert!(toml_str.contains("[coach]"));
        assert!(toml_str.contains("word_budget"));
    }
}
