//! Background profile mapper.
//!
//! Sends the rendered transcript to a JSON-mode chat completion and
//! leniently parses the reply into a [`Profile`]. Any failure along the
//! way (transport, empty reply, malformed JSON, missing summary) yields
//! [`Profile::fallback`] and a `ClassifierFallback` trace event.

use std::sync::Arc;
use std::time::Instant;

use kp_domain::config::ClassifierConfig;
use kp_domain::message::Message;
use kp_domain::profile::{clamp_risk, Profile, RiskBand, RootCause, MIN_RISK};
use kp_domain::trace::TraceEvent;
use serde_json::{Map, Value};

use crate::prompts::MAPPER_SYSTEM_PROMPT;
use crate::traits::{ChatRequest, Classifier, LlmProvider};

/// Keys accepted for the root cause, in lookup order.
const ROOT_CAUSE_KEYS: &[&str] = &[
    "root_cause_of_the_distress",
    "root_cause_candidate",
    "root_cause",
];

pub struct LlmClassifier {
    provider: Arc<dyn LlmProvider>,
    cfg: ClassifierConfig,
}

impl LlmClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>, cfg: ClassifierConfig) -> Self {
        Self { provider, cfg }
    }

    fn build_request(&self, transcript: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![
                Message::system(MAPPER_SYSTEM_PROMPT),
                Message::user(transcript),
            ],
            temperature: Some(self.cfg.temperature),
            max_tokens: Some(self.cfg.max_tokens),
            stop: Vec::new(),
            json_mode: true,
            model: Some(self.cfg.model.clone()),
        }
    }
}

#[async_trait::async_trait]
impl Classifier for LlmClassifier {
    async fn analyze(&self, transcript: &str) -> Profile {
        let req = self.build_request(transcript);
        let started = Instant::now();
        let result = self.provider.chat(&req).await;

        TraceEvent::LlmRequest {
            provider: self.provider.provider_id().to_owned(),
            model: self.cfg.model.clone(),
            purpose: "mapper".into(),
            streaming: false,
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        let raw = match result {
            Ok(resp) => resp.content,
            Err(e) => {
                tracing::warn!(error = %e, "mapper request failed");
                return fallback(format!("request failed: {e}"));
            }
        };

        tracing::debug!(raw = %raw, "mapper raw output");
        match parse_profile(&raw) {
            Some(profile) => profile,
            None => fallback("unparseable output".into()),
        }
    }
}

fn fallback(reason: String) -> Profile {
    TraceEvent::ClassifierFallback { reason }.emit();
    Profile::fallback()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Best-effort parse of raw model output.
///
/// The span from the first `{` to the last `}` is tried first (models
/// like to wrap JSON in prose or code fences), then the whole text.
/// Returns `None` unless the result is an object with a non-empty
/// `clinical_summary`. Missing fields take the safe defaults and
/// `risk_score` is clamped into range.
pub fn parse_profile(raw: &str) -> Option<Profile> {
    let raw = raw.trim();
    let obj = extract_object(raw)?;

    let clinical_summary = obj
        .get("clinical_summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?
        .to_owned();

    let risk_score = obj
        .get("risk_score")
        .and_then(lenient_int)
        .map(clamp_risk)
        .unwrap_or(MIN_RISK);

    let detected_risk = obj
        .get("detected_risk")
        .and_then(Value::as_str)
        .map(RiskBand::parse)
        .unwrap_or_default();

    let self_harm_indicators = obj
        .get("self_harm_indicators")
        .and_then(lenient_bool)
        .unwrap_or(false);

    let root_cause_candidate = ROOT_CAUSE_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(RootCause::parse)
        .unwrap_or_default();

    let primary_emotion = obj
        .get("primary_emotion")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    Some(Profile {
        risk_score,
        detected_risk,
        self_harm_indicators,
        root_cause_candidate,
        clinical_summary,
        primary_emotion,
    })
}

fn extract_object(raw: &str) -> Option<Map<String, Value>> {
    let braced = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&raw[start..=end]),
        _ => None,
    };
    let candidates = braced.into_iter().chain(std::iter::once(raw));
    for text in candidates {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
            return Some(map);
        }
    }
    None
}

fn lenient_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    }
}

fn lenient_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ChatResponse, EmbeddingsRequest, EmbeddingsResponse};
    use kp_domain::error::{Error, Result};
    use kp_domain::profile::FALLBACK_SUMMARY;
    use kp_domain::stream::{BoxStream, StreamEvent};

    struct CannedProvider(std::result::Result<&'static str, &'static str>);

    #[async_trait::async_trait]
    impl LlmProvider for CannedProvider {
        async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
            assert!(req.json_mode);
            match self.0 {
                Ok(content) => Ok(ChatResponse {
                    content: content.into(),
                    usage: None,
                    model: "canned".into(),
                    finish_reason: Some("stop".into()),
                }),
                Err(msg) => Err(Error::Http(msg.into())),
            }
        }

        async fn chat_stream(
            &self,
            _req: &ChatRequest,
        ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            Err(Error::Other("unused".into()))
        }

        async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            Err(Error::Other("unused".into()))
        }

        fn provider_id(&self) -> &str {
            "canned"
        }
    }

    fn classifier(reply: std::result::Result<&'static str, &'static str>) -> LlmClassifier {
        LlmClassifier::new(Arc::new(CannedProvider(reply)), ClassifierConfig::default())
    }

    #[tokio::test]
    async fn transport_error_yields_fallback() {
        let p = classifier(Err("connection refused")).analyze("User: hi").await;
        assert_eq!(p, Profile::fallback());
        assert_eq!(p.clinical_summary, FALLBACK_SUMMARY);
    }

    #[tokio::test]
    async fn garbage_yields_fallback() {
        let p = classifier(Ok("I cannot help with that.")).analyze("User: hi").await;
        assert_eq!(p, Profile::fallback());
    }

    #[tokio::test]
    async fn valid_reply_is_parsed() {
        let p = classifier(Ok(
            r#"{"clinical_summary":"Grieving.","risk_score":6,"detected_risk":"moderate","self_harm_indicators":false,"root_cause_of_the_distress":"Bereavement"}"#,
        ))
        .analyze("User: my dad died")
        .await;
        assert_eq!(p.risk_score, 6);
        assert_eq!(p.root_cause_candidate, RootCause::Set("Bereavement".into()));
    }

    #[test]
    fn lenient_scalars() {
        assert_eq!(lenient_int(&serde_json::json!("7")), Some(7));
        assert_eq!(lenient_int(&serde_json::json!(6.6)), Some(7));
        assert_eq!(lenient_bool(&serde_json::json!("True")), Some(true));
        assert_eq!(lenient_bool(&serde_json::json!(null)), None);
    }
}
