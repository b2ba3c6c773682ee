mod agents;
mod llm;
mod observability;
mod server;
mod sessions;
mod triage;

pub use agents::*;
pub use llm::*;
pub use observability::*;
pub use server::*;
pub use sessions::*;
pub use triage::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub triage: TriageConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub privacy: PrivacyConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.max_concurrent_requests == 0 {
            errors.push(ConfigError::error(
                "server.max_concurrent_requests",
                "must be greater than 0",
            ));
        }

        if self.llm.providers.is_empty() {
            errors.push(ConfigError::error("llm.providers", "no LLM providers configured"));
        }
        for (i, provider) in self.llm.providers.iter().enumerate() {
            if provider.id.is_empty() {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].id"),
                    "provider id must not be empty",
                ));
            }
            if provider.base_url.is_empty() {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].base_url"),
                    "provider base_url must not be empty",
                ));
            }
        }

        // Every role must point at a configured provider.
        let roles = [
            ("generator.provider", &self.generator.provider, true),
            ("classifier.provider", &self.classifier.provider, true),
            ("matching.provider", &self.matching.provider, self.matching.enabled),
        ];
        for (field, id, required) in roles {
            if required && self.llm.provider(id).is_none() {
                errors.push(ConfigError::error(
                    field,
                    format!("unknown provider \"{id}\""),
                ));
            }
        }

        if self.generator.timeout_secs == 0 {
            errors.push(ConfigError::error("generator.timeout_secs", "must be greater than 0"));
        }
        if self.classifier.timeout_secs == 0 {
            errors.push(ConfigError::error("classifier.timeout_secs", "must be greater than 0"));
        }
        if self.generator.history_window == 0 {
            errors.push(ConfigError::warning(
                "generator.history_window",
                "0 sends only the system prompt and the new message",
            ));
        }

        let t = &self.triage;
        for (field, value) in [
            ("triage.probe_risk_threshold", t.probe_risk_threshold),
            ("triage.peer_route_risk_threshold", t.peer_route_risk_threshold),
            ("triage.match_risk_threshold", t.match_risk_threshold),
        ] {
            if !(1..=10).contains(&value) {
                errors.push(ConfigError::error(field, "must be between 1 and 10"));
            }
        }

        let threshold = self.matching.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            errors.push(ConfigError::error(
                "matching.similarity_threshold",
                "must be between 0.0 and 1.0",
            ));
        }

        if self.storage.state_path.is_empty() {
            errors.push(ConfigError::error("storage.state_path", "must not be empty"));
        }

        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError::warning(
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            ));
        }

        if !self.privacy.scrub_pii {
            errors.push(ConfigError::warning(
                "privacy.scrub_pii",
                "user messages are stored and logged unredacted",
            ));
        }

        errors
    }
}
