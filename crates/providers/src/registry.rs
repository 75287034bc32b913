//! Model registry.
//!
//! Constructs and holds all configured LLM provider instances. At startup
//! the registry reads the [`LlmConfig`], resolves API keys from the
//! environment, and instantiates the appropriate adapter for each entry.
//! Resolution is by model name: a provider claims the models listed in
//! its config.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tm_domain::config::{LlmConfig, ProviderKind};
use tm_domain::error::{Error, Result};

/// Holds all instantiated LLM providers, keyed by the models they serve.
pub struct ModelRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    /// model name -> provider id
    model_claims: HashMap<String, String>,
}

impl ModelRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Each configured provider is instantiated eagerly (env vars are
    /// read at this point). A provider that fails to initialize aborts
    /// startup: a task submitted against a missing model must fail at
    /// task start, not at call time.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let mut model_claims: HashMap<String, String> = HashMap::new();

        for pc in &config.providers {
            let provider: Arc<dyn LlmProvider> = match pc.kind {
                ProviderKind::Anthropic => Arc::new(AnthropicProvider::from_config(pc)?),
                ProviderKind::OpenaiCompat => Arc::new(OpenAiCompatProvider::from_config(pc)?),
            };

            tracing::info!(
                provider_id = %pc.id,
                kind = ?pc.kind,
                models = pc.models.len(),
                "registered LLM provider"
            );

            for model in &pc.models {
                model_claims.insert(model.clone(), pc.id.clone());
            }
            providers.insert(pc.id.clone(), provider);
        }

        Ok(Self {
            providers,
            model_claims,
        })
    }

    /// Resolve the provider serving `model`.
    pub fn for_model(&self, model: &str) -> Result<Arc<dyn LlmProvider>> {
        let provider_id = self
            .model_claims
            .get(model)
            .ok_or_else(|| Error::Config(format!("no provider configured for model '{model}'")))?;
        self.providers
            .get(provider_id)
            .cloned()
            .ok_or_else(|| Error::Config(format!("provider '{provider_id}' not registered")))
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}
