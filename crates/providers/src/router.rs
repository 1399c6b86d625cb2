//! Provider router — selects the configured LLM provider.
//!
//! Handles provider creation from config and lookup by name.

use std::collections::HashMap;
use std::sync::Arc;
use stridecoach_config::AppConfig;
use stridecoach_core::provider::Provider;
use crate::gemini::GeminiProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Holds the configured providers and knows which one is selected.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the selected provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build providers from configuration.
///
/// Every `[providers.<name>]` entry is registered, and the selected
/// `provider` is always present even without its own entry.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.provider);

    let mut names: Vec<&str> = config.providers.keys().map(|s| s.as_str()).collect();
    if !config.providers.contains_key(&config.provider) {
        names.push(&config.provider);
    }

    for name in names {
        let entry = config.providers.get(name);
        let api_key = config.api_key_for(name).unwrap_or_default();
        let model = entry
            .and_then(|p| p.model.clone())
            .unwrap_or_else(|| config.model.clone());
        let api_url = entry.and_then(|p| p.api_url.clone());

        let provider: Arc<dyn Provider> = if name == "gemini" {
            let mut p = GeminiProvider::new(&api_key).with_default_model(&model);
            if let Some(url) = api_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        } else {
            let base_url = api_url.unwrap_or_else(|| default_base_url(name));
            Arc::new(OpenAiCompatProvider::new(name, &base_url, &api_key).with_default_model(&model))
        };

        router.register(name, provider);
    }

    router
}

/// Get the default base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "deepinfra" => "https://api.deepinfra.com/v1/openai".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stridecoach_config::ProviderConfig;

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new("deepinfra");
        router.register("deepinfra", Arc::new(OpenAiCompatProvider::deepinfra("di-test")));

        assert!(router.get("deepinfra").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default().is_some());
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("deepinfra").contains("deepinfra.com"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn build_from_default_config_selects_gemini() {
        let config = AppConfig::default();
        let router = build_from_config(&config);
        let provider = router.default().unwrap();
        assert_eq!(provider.name(), "gemini");
        assert_eq!(provider.default_model(), "gemini-2.0-flash-exp");
    }

    #[test]
    fn configured_providers_are_registered() {
        let mut config = AppConfig {
            provider: "deepinfra".into(),
            ..AppConfig::default()
        };
        config.providers.insert(
            "deepinfra".into(),
            ProviderConfig {
                api_key: Some("di".into()),
                api_url: None,
                model: Some("meta-llama/Llama-3.3-70B-Instruct".into()),
            },
        );
        let router = build_from_config(&config);
        assert_eq!(router.list(), vec!["deepinfra"]);
        let provider = router.default().unwrap();
        assert_eq!(provider.name(), "deepinfra");
        assert_eq!(provider.default_model(), "meta-llama/Llama-3.3-70B-Instruct");
    }
}
