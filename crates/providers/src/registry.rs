//! Provider registry.
//!
//! Constructs and holds all configured LLM provider instances. At startup the
//! registry reads the [`LlmConfig`], resolves authentication, and
//! instantiates an adapter for each configured provider.

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;
use kp_domain::config::{LlmConfig, ProviderKind};
use kp_domain::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Providers that fail to initialize are logged and skipped; an error
    /// is returned only when none of the configured providers came up.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();

        for pc in &config.providers {
            let result: Result<Arc<dyn LlmProvider>> = match pc.kind {
                ProviderKind::OpenaiCompat => OpenAiCompatProvider::from_config(pc, connect_timeout)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
            };

            match result {
                Ok(provider) => {
                    tracing::info!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        "registered LLM provider"
                    );
                    providers.insert(pc.id.clone(), provider);
                }
                Err(e) => {
                    tracing::warn!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        error = %e,
                        "failed to initialize LLM provider, skipping"
                    );
                }
            }
        }

        if providers.is_empty() && !config.providers.is_empty() {
            return Err(Error::Config(
                "all configured LLM providers failed to initialize".into(),
            ));
        }

        Ok(Self { providers })
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Like [`get`](Self::get) but with a config error naming the role.
    pub fn require(&self, provider_id: &str, role: &str) -> Result<Arc<dyn LlmProvider>> {
        self.get(provider_id).ok_or_else(|| {
            Error::Config(format!(
                "{role}: provider \"{provider_id}\" is not configured or failed to initialize"
            ))
        })
    }

    /// List all registered provider IDs (sorted).
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kp_domain::config::{AuthConfig, AuthMode, ProviderConfig};

    #[test]
    fn default_config_registers_local_provider() {
        let reg = ProviderRegistry::from_config(&LlmConfig::default()).unwrap();
        assert_eq!(reg.list_providers(), vec!["ollama".to_string()]);
        assert!(reg.require("ollama", "generator").is_ok());
    }

    #[test]
    fn failing_provider_is_skipped() {
        let mut cfg = LlmConfig::default();
        cfg.providers.push(ProviderConfig {
            id: "broken".into(),
            kind: ProviderKind::OpenaiCompat,
            base_url: "https://example.invalid/v1".into(),
            auth: AuthConfig {
                mode: AuthMode::ApiKey,
                env: Some("KP_TEST_REGISTRY_MISSING_KEY_5521".into()),
                ..Default::default()
            },
            default_model: None,
        });
        let reg = ProviderRegistry::from_config(&cfg).unwrap();
        assert!(reg.get("broken").is_none());
        let err = reg.require("broken", "classifier").err().unwrap();
        assert!(err.to_string().contains("classifier"));
    }

    #[test]
    fn all_failing_is_an_error() {
        let cfg = LlmConfig {
            connect_timeout_ms: 1000,
            providers: vec![ProviderConfig {
                id: "broken".into(),
                kind: ProviderKind::OpenaiCompat,
                base_url: "https://example.invalid/v1".into(),
                auth: AuthConfig {
                    mode: AuthMode::ApiKey,
                    ..Default::default()
                },
                default_model: None,
            }],
        };
        assert!(ProviderRegistry::from_config(&cfg).is_err());
    }
}
