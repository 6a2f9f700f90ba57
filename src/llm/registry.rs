use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{AppConfig, LlmConfig, RoleEntry};
use crate::errors::{AgentError, AgentResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// What a model call is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    /// Screen analysis and action recommendation.
    Vision,
    /// Short yes/no classification.
    Classifier,
}

impl ModelRole {
    fn entry<'a>(&self, cfg: &'a LlmConfig) -> Option<&'a RoleEntry> {
        match self {
            ModelRole::Vision => cfg.roles.vision.as_ref(),
            ModelRole::Classifier => cfg.roles.classifier.as_ref(),
        }
    }
}

const CLASSIFIER_MAX_TOKENS: u32 = 10;

/// Registry of all available LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(llm_config: LlmConfig) -> Self {
        Self {
            providers: HashMap::new(),
            active: llm_config.active_provider.clone(),
            llm_config,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> AgentResult<Arc<dyn LlmProvider>> {
        self.providers
            .get(&self.active)
            .cloned()
            .ok_or_else(|| AgentError::Config(format!("Active provider '{}' not found in registry", self.active)))
    }

    pub fn list_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Return the provider and call configuration for a model role.
    ///
    /// Role resolution order:
    /// 1. `[llm.roles.<role>]` in config.toml
    /// 2. Fallback: active provider with its default model. The classifier
    ///    role always defaults to temperature 0 and a tiny completion budget.
    pub fn call_config_for_role(&self, role: ModelRole) -> AgentResult<(Arc<dyn LlmProvider>, CallConfig)> {
        let classifier = role == ModelRole::Classifier;

        if let Some(entry) = role.entry(&self.llm_config) {
            let provider = self.providers.get(&entry.provider).cloned().ok_or_else(|| {
                AgentError::Config(format!(
                    "Role '{:?}' references unknown provider '{}'",
                    role, entry.provider
                ))
            })?;
            let defaults = self.llm_config.providers.get(&entry.provider);
            let temperature = entry.temperature.unwrap_or_else(|| {
                if classifier {
                    0.0
                } else {
                    defaults.map(|p| p.temperature).unwrap_or(0.3)
                }
            });
            let max_tokens = entry.max_tokens.unwrap_or_else(|| {
                if classifier {
                    CLASSIFIER_MAX_TOKENS
                } else {
                    defaults.map(|p| p.max_tokens).unwrap_or(2000)
                }
            });
            tracing::debug!(
                role = ?role,
                provider = %entry.provider,
                model = %entry.model,
                temperature,
                "resolved role config"
            );
            return Ok((provider, CallConfig {
                model: entry.model.clone(),
                temperature,
                max_tokens,
            }));
        }

        // Fallback: active provider, provider-level defaults
        let provider = self.get_active()?;
        let entry = self.llm_config.providers.get(&self.active);
        let model = entry.map(|p| p.model.clone()).unwrap_or_default();
        let (temperature, max_tokens) = if classifier {
            (0.0, CLASSIFIER_MAX_TOKENS)
        } else {
            entry
                .map(|p| (p.temperature, p.max_tokens))
                .unwrap_or((0.3, 2000))
        };
        tracing::debug!(
            role = ?role,
            provider = %self.active,
            model = %model,
            "role not configured, using active provider fallback"
        );
        Ok((provider, CallConfig { model, temperature, max_tokens }))
    }

    /// Build a registry from the loaded app config.
    /// API keys are read from environment variables named `MACAGENT_<ID>_API_KEY`.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new(config.llm.clone());
        for (id, entry) in &config.llm.providers {
            let api_key = std::env::var(format!("MACAGENT_{}_API_KEY", id.to_uppercase()))
                .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());
            if api_key.is_empty() {
                tracing::warn!(provider = %id, "no API key configured; calls will be rejected upstream");
            }
            let provider = OpenAiCompatibleProvider::new(id.clone(), entry.api_base.clone(), api_key);
            registry.register(Arc::new(provider));
        }
        registry
    }
}
