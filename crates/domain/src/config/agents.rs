use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Generator (user-facing listener)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Provider id from `[[llm.providers]]`.
    #[serde(default = "d_provider")]
    pub provider: String,
    #[serde(default = "d_generator_model")]
    pub model: String,
    #[serde(default = "d_generator_temperature")]
    pub temperature: f32,
    #[serde(default = "d_generator_max_tokens")]
    pub max_tokens: u32,
    /// Number of trailing conversation entries sent with each request,
    /// the new user message included.
    #[serde(default = "d_history_window")]
    pub history_window: usize,
    #[serde(default = "d_generator_stop")]
    pub stop: Vec<String>,
    /// Bound on the whole streamed response. Expiry fails the turn.
    #[serde(default = "d_generator_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: d_provider(),
            model: d_generator_model(),
            temperature: d_generator_temperature(),
            max_tokens: d_generator_max_tokens(),
            history_window: d_history_window(),
            stop: d_generator_stop(),
            timeout_secs: d_generator_timeout(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classifier (background profile mapper)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "d_provider")]
    pub provider: String,
    #[serde(default = "d_classifier_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "d_classifier_max_tokens")]
    pub max_tokens: u32,
    /// Number of prior history entries rendered into the transcript.
    #[serde(default = "d_transcript_window")]
    pub transcript_window: usize,
    /// Expiry yields the default profile.
    #[serde(default = "d_classifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: d_provider(),
            model: d_classifier_model(),
            temperature: 0.0,
            max_tokens: d_classifier_max_tokens(),
            transcript_window: d_transcript_window(),
            timeout_secs: d_classifier_timeout(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_provider() -> String {
    "ollama".into()
}
fn d_generator_model() -> String {
    "mistral:7b-instruct".into()
}
fn d_generator_temperature() -> f32 {
    0.6
}
fn d_generator_max_tokens() -> u32 {
    300
}
fn d_history_window() -> usize {
    5
}
fn d_generator_stop() -> Vec<String> {
    vec!["\n\n".into(), "User:".into(), "You:".into()]
}
fn d_generator_timeout() -> u64 {
    120
}
fn d_classifier_model() -> String {
    "gemma3:4b".into()
}
fn d_classifier_max_tokens() -> u32 {
    200
}
fn d_transcript_window() -> usize {
    4
}
fn d_classifier_timeout() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_is_deterministic_by_default() {
        let cfg: ClassifierConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.temperature, 0.0);
        assert_eq!(cfg.transcript_window, 4);
    }

    #[test]
    fn generator_overrides_parse() {
        let cfg: GeneratorConfig = toml::from_str(
            r#"
            model = "llama3.1:8b"
            history_window = 8
            stop = []
            "#,
        )
        .unwrap();
        assert_eq!(cfg.model, "llama3.1:8b");
        assert_eq!(cfg.history_window, 8);
        assert!(cfg.stop.is_empty());
        assert_eq!(cfg.max_tokens, 300);
    }
}
