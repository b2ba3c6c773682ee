//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Ollama, vLLM, LM Studio, Together, and any other
//! endpoint that follows the OpenAI chat completions contract.

use crate::traits::{
    ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider,
};
use crate::util::{from_reqwest, resolve_api_key};
use kp_domain::config::ProviderConfig;
use kp_domain::error::{Error, Result};
use kp_domain::message::{Message, Role};
use kp_domain::stream::{BoxStream, StreamEvent, Usage};
use serde_json::Value;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    /// Pre-rendered `(header, value)` pair, absent for keyless local servers.
    auth_header: Option<(String, String)>,
    default_model: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn from_config(cfg: &ProviderConfig, connect_timeout: Duration) -> Result<Self> {
        let auth_header = resolve_api_key(&cfg.auth)?.map(|key| {
            let header = cfg
                .auth
                .header
                .clone()
                .unwrap_or_else(|| "Authorization".into());
            let prefix = cfg.auth.prefix.clone().unwrap_or_else(|| "Bearer ".into());
            (header, format!("{prefix}{key}"))
        });

        // No overall request timeout: streamed bodies are bounded by the
        // caller, which knows how long a whole turn may take.
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            auth_header,
            default_model: cfg.default_model.clone(),
            client,
        })
    }

    // ── Internal: build authenticated request builder ──────────────

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        match &self.auth_header {
            Some((name, value)) => builder.header(name.as_str(), value.as_str()),
            None => builder,
        }
    }

    fn effective_model(&self, requested: Option<&str>) -> Result<String> {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_model.clone())
            .ok_or_else(|| Error::Provider {
                provider: self.id.clone(),
                message: "no model given and no default_model configured".into(),
            })
    }

    fn build_chat_body(&self, req: &ChatRequest, stream: bool) -> Result<Value> {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();

        let mut body = serde_json::json!({
            "model": self.effective_model(req.model.as_deref())?,
            "messages": messages,
            "stream": stream,
        });

        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if !req.stop.is_empty() {
            body["stop"] = serde_json::json!(req.stop);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        Ok(body)
    }

    async fn send_json(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        let resp = self.post(url).json(body).send().await.map_err(from_reqwest)?;
        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), err_text),
            });
        }
        Ok(resp)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    serde_json::json!({
        "role": role_to_str(msg.role),
        "content": msg.content,
    })
}

fn parse_chat_response(provider: &str, body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: provider.into(),
            message: "no choices in response".into(),
        })?;

    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let usage = body.get("usage").and_then(parse_openai_usage);

    Ok(ChatResponse {
        content,
        usage,
        model,
        finish_reason,
    })
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

/// Map one streamed `data:` payload to events.
fn parse_sse_data(data: &str) -> Vec<Result<StreamEvent>> {
    if data.trim() == "[DONE]" {
        return vec![Ok(StreamEvent::Done {
            usage: None,
            finish_reason: Some("stop".into()),
        })];
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    if let Some(err) = v.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| err.to_string());
        return vec![Ok(StreamEvent::Error { message })];
    }

    let Some(choice) = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
    else {
        return Vec::new();
    };

    let mut events = Vec::new();
    if let Some(text) = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(|v| v.as_str())
    {
        if !text.is_empty() {
            events.push(Ok(StreamEvent::Token {
                text: text.to_string(),
            }));
        }
    }
    if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        events.push(Ok(StreamEvent::Done {
            usage: v.get("usage").and_then(parse_openai_usage),
            finish_reason: Some(fr.to_string()),
        }));
    }
    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req, false)?;

        tracing::debug!(provider = %self.id, url = %url, "openai_compat chat request");

        let resp = self.send_json(&url, &body).await?;
        let resp_json: Value = resp.json().await.map_err(from_reqwest)?;
        parse_chat_response(&self.id, &resp_json)
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req, true)?;

        tracing::debug!(provider = %self.id, url = %url, "openai_compat stream request");

        let resp = self.send_json(&url, &body).await?;
        Ok(crate::sse::sse_response_stream(resp, parse_sse_data))
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.effective_model(req.model.as_deref())?,
            "input": req.input,
        });

        let resp = self.send_json(&url, &body).await?;
        let resp_json: Value = resp.json().await.map_err(from_reqwest)?;
        let data = resp_json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| Error::Provider {
                provider: self.id.clone(),
                message: "missing 'data' array in embeddings response".into(),
            })?;

        let embeddings: Vec<Vec<f32>> = data
            .iter()
            .filter_map(|item| {
                let embedding = item.get("embedding")?.as_array()?;
                Some(
                    embedding
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect(),
                )
            })
            .collect();

        if embeddings.len() != req.input.len() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!(
                    "expected {} embeddings, got {}",
                    req.input.len(),
                    embeddings.len()
                ),
            });
        }

        Ok(EmbeddingsResponse { embeddings })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kp_domain::config::{AuthConfig, AuthMode, ProviderKind};

    fn provider(default_model: Option<&str>) -> OpenAiCompatProvider {
        let cfg = ProviderConfig {
            id: "local".into(),
            kind: ProviderKind::OpenaiCompat,
            base_url: "http://localhost:11434/v1/".into(),
            auth: AuthConfig::default(),
            default_model: default_model.map(String::from),
        };
        OpenAiCompatProvider::from_config(&cfg, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        assert_eq!(provider(None).base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn keyless_provider_sends_no_auth_header() {
        assert!(provider(None).auth_header.is_none());
    }

    #[test]
    fn keyed_provider_renders_bearer_header() {
        let cfg = ProviderConfig {
            id: "openai".into(),
            kind: ProviderKind::OpenaiCompat,
            base_url: "https://api.openai.com/v1".into(),
            auth: AuthConfig {
                mode: AuthMode::ApiKey,
                key: Some("sk-abc".into()),
                ..Default::default()
            },
            default_model: None,
        };
        let p = OpenAiCompatProvider::from_config(&cfg, Duration::from_secs(1)).unwrap();
        assert_eq!(
            p.auth_header,
            Some(("Authorization".to_string(), "Bearer sk-abc".to_string()))
        );
    }

    #[test]
    fn chat_body_carries_sampling_and_json_mode() {
        let req = ChatRequest {
            messages: vec![Message::system("sys"), Message::user("hi")],
            temperature: Some(0.0),
            max_tokens: Some(200),
            stop: vec!["User:".into()],
            json_mode: true,
            model: Some("gemma3:4b".into()),
        };
        let body = provider(None).build_chat_body(&req, false).unwrap();
        assert_eq!(body["model"], "gemma3:4b");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["max_tokens"], 200);
        assert_eq!(body["stop"][0], "User:");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn missing_model_is_a_provider_error() {
        let req = ChatRequest::default();
        assert!(provider(None).build_chat_body(&req, true).is_err());
        let body = provider(Some("llama3")).build_chat_body(&req, true).unwrap();
        assert_eq!(body["model"], "llama3");
        assert!(body.get("stop").is_none());
    }

    #[test]
    fn sse_content_delta_becomes_token() {
        let events = parse_sse_data(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#);
        assert!(matches!(&events[..], [Ok(StreamEvent::Token { text })] if text == "Hel"));
    }

    #[test]
    fn sse_final_chunk_yields_token_then_done() {
        let events = parse_sse_data(
            r#"{"choices":[{"delta":{"content":"!"},"finish_reason":"stop"}]}"#,
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Ok(StreamEvent::Done { .. })));
    }

    #[test]
    fn sse_done_sentinel_and_errors() {
        assert!(matches!(
            &parse_sse_data("[DONE]")[..],
            [Ok(StreamEvent::Done { .. })]
        ));
        assert!(matches!(
            &parse_sse_data(r#"{"error":{"message":"model not found"}}"#)[..],
            [Ok(StreamEvent::Error { message })] if message == "model not found"
        ));
        assert!(matches!(&parse_sse_data("{not json")[..], [Err(_)]));
    }

    #[test]
    fn chat_response_is_parsed() {
        let body = serde_json::json!({
            "model": "gemma3:4b",
            "choices": [{"message": {"content": "{}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        });
        let resp = parse_chat_response("local", &body).unwrap();
        assert_eq!(resp.content, "{}");
        assert_eq!(resp.usage.unwrap().total_tokens, 4);
    }
}
