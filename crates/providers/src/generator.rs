//! The user-facing listener: a streaming chat completion conditioned on
//! the current phase and context anchor.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use kp_domain::config::GeneratorConfig;
use kp_domain::error::{Error, Result};
use kp_domain::message::{HistoryEntry, Message};
use kp_domain::stream::{BoxStream, StreamEvent};
use kp_domain::trace::TraceEvent;

use crate::prompts::listener_system_prompt;
use crate::traits::{ChatRequest, FragmentStream, GenerationRequest, Generator, LlmProvider};

pub struct LlmGenerator {
    provider: Arc<dyn LlmProvider>,
    cfg: GeneratorConfig,
}

impl LlmGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, cfg: GeneratorConfig) -> Self {
        Self { provider, cfg }
    }

    /// System prompt followed by the trailing `history_window` entries of
    /// the conversation, the new message included.
    fn build_request(&self, req: &GenerationRequest) -> ChatRequest {
        let pending = HistoryEntry::user(req.message.clone());
        let window = self.cfg.history_window.max(1);
        let total = req.history.len() + 1;
        let skip = total.saturating_sub(window);

        let mut messages = Vec::with_capacity(window + 1);
        messages.push(Message::system(listener_system_prompt(
            req.phase,
            &req.context_anchor,
        )));
        messages.extend(
            req.history
                .iter()
                .chain(std::iter::once(&pending))
                .skip(skip)
                .map(Message::from),
        );

        ChatRequest {
            messages,
            temperature: Some(self.cfg.temperature),
            max_tokens: Some(self.cfg.max_tokens),
            stop: self.cfg.stop.clone(),
            json_mode: false,
            model: Some(self.cfg.model.clone()),
        }
    }
}

#[async_trait::async_trait]
impl Generator for LlmGenerator {
    async fn stream(&self, req: GenerationRequest) -> Result<FragmentStream> {
        let chat = self.build_request(&req);
        tracing::debug!(
            provider = %self.provider.provider_id(),
            model = %self.cfg.model,
            phase = %req.phase,
            messages = chat.messages.len(),
            "listener request"
        );
        let started = Instant::now();
        let events = self.provider.chat_stream(&chat).await?;
        Ok(fragments(
            events,
            self.provider.provider_id().to_owned(),
            self.cfg.model.clone(),
            started,
        ))
    }
}

/// Reduce provider stream events to text fragments.
///
/// Tokens pass through, `Done` ends the stream, and an in-band error
/// becomes an `Err` item followed by the end of the stream.
fn fragments(
    events: BoxStream<'static, Result<StreamEvent>>,
    provider: String,
    model: String,
    started: Instant,
) -> FragmentStream {
    Box::pin(async_stream::stream! {
        let mut events = events;
        while let Some(event) = events.next().await {
            match event {
                Ok(StreamEvent::Token { text }) => yield Ok(text),
                Ok(StreamEvent::Done { .. }) => break,
                Ok(StreamEvent::Error { message }) => {
                    yield Err(Error::Provider { provider: provider.clone(), message });
                    return;
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        TraceEvent::LlmRequest {
            provider,
            model,
            purpose: "listener".into(),
            streaming: true,
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();
    })
}
