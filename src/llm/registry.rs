use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::errors::{TapClawError, TapClawResult};
use crate::llm::provider::InferenceProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Registry of all available inference providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn InferenceProvider>>,
    active: String,
}

impl ProviderRegistry {
    pub fn new(active: String) -> Self {
        Self {
            providers: HashMap::new(),
            active,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn InferenceProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> TapClawResult<Arc<dyn InferenceProvider>> {
        self.providers
            .get(&self.active)
            .cloned()
            .ok_or_else(|| TapClawError::Config(format!("Active provider '{}' not found in registry", self.active)))
    }

    pub fn set_active(&mut self, name: String) -> TapClawResult<()> {
        if self.providers.contains_key(&name) {
            self.active = name;
            Ok(())
        } else {
            Err(TapClawError::Config(format!("Provider '{name}' not registered")))
        }
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a registry from the loaded app config.
    /// API keys are read from environment variables named `TAPCLAW_<ID>_API_KEY`,
    /// falling back to `api_key` in config.toml.
    pub fn from_config(config: &AppConfig) -> Self {
        let _ = dotenvy::dotenv();
        let mut registry = Self::new(config.llm.active_provider.clone());
        for (id, entry) in &config.llm.providers {
            let api_key = std::env::var(format!("TAPCLAW_{}_API_KEY", id.to_uppercase()))
                .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());
            let provider = OpenAiCompatibleProvider::new(
                id.clone(),
                entry.api_base.clone(),
                api_key,
                CallConfig {
                    model: entry.model.clone(),
                    stream: entry.stream,
                    temperature: entry.temperature,
                },
            );
            tracing::debug!(provider = %id, model = %entry.model, "inference provider registered");
            registry.register(Arc::new(provider));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderEntry;

    #[test]
    fn active_provider_selection() {
        let mut cfg = AppConfig::default();
        cfg.llm.active_provider = "local".into();
        for id in ["local", "cloud"] {
            cfg.llm.providers.insert(
                id.into(),
                ProviderEntry {
                    display_name: id.into(),
                    api_base: "http://127.0.0.1:9/v1/chat/completions".into(),
                    model: "m".into(),
                    temperature: 0.1,
                    api_key: None,
                    stream: true,
                },
            );
        }

        let mut registry = ProviderRegistry::from_config(&cfg);
        assert_eq!(registry.list_names(), vec!["cloud", "local"]);
        assert_eq!(registry.get_active().unwrap().name(), "local");
        registry.set_active("cloud".into()).unwrap();
        assert_eq!(registry.get_active().unwrap().name(), "cloud");
        assert!(registry.set_active("missing".into()).is_err());
    }
}
