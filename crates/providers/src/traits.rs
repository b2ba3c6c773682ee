use kp_domain::error::Result;
use kp_domain::message::{HistoryEntry, Message};
use kp_domain::peer::PeerMatch;
use kp_domain::profile::Profile;
use kp_domain::stream::{BoxStream, StreamEvent, Usage};
use kp_domain::triage::Phase;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 – 2.0). `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// Stop sequences; generation halts before emitting any of them.
    pub stop: Vec<String>,
    /// When `true`, request the model to respond with valid JSON only.
    pub json_mode: bool,
    /// Model identifier override. When `None`, the provider uses its default.
    pub model: Option<String>,
}

/// A provider-agnostic chat completion response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Option<Usage>,
    /// The model that actually produced the response.
    pub model: String,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingsRequest {
    pub input: Vec<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingsResponse {
    /// One embedding vector per input text.
    pub embeddings: Vec<Vec<f32>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait that every LLM adapter must implement.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// Send a chat completion request and return a stream of events.
    async fn chat_stream(&self, req: &ChatRequest)
        -> Result<BoxStream<'static, Result<StreamEvent>>>;

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse>;

    fn provider_id(&self) -> &str;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn collaborators
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lazy stream of response fragments. Concatenating every `Ok` item in
/// order yields the full response text.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Everything the generator is allowed to see for one turn.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Committed history, not including the new message.
    pub history: Vec<HistoryEntry>,
    /// The staged user message for this turn.
    pub message: String,
    /// Phase captured before any of this turn's state changes.
    pub phase: Phase,
    /// Context anchor captured before any of this turn's state changes.
    pub context_anchor: String,
}

/// User-facing response generator.
///
/// An `Err` from `stream`, or any `Err` item in the returned stream,
/// fails the turn.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    async fn stream(&self, req: GenerationRequest) -> Result<FragmentStream>;
}

/// Background profile classifier.
///
/// Never fails: every internal error collapses to [`Profile::fallback`].
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn analyze(&self, transcript: &str) -> Profile;
}

/// Root-cause to peer lookup.
///
/// Returns `None` for an empty root cause, for a best score under the
/// similarity threshold, and whenever the lookup itself fails.
#[async_trait::async_trait]
pub trait PeerMatcher: Send + Sync {
    async fn find_match(&self, root_cause: &str) -> Option<PeerMatch>;
}
