//! LLM-backed collaborators for the turn orchestrator: the OpenAI-compatible
//! provider adapter, the streaming listener, the profile mapper and the
//! embedding peer matcher.

pub mod classifier;
pub mod generator;
pub mod matcher;
pub mod openai_compat;
pub mod prompts;
pub mod registry;
pub mod traits;
pub(crate) mod sse;
pub(crate) mod util;

// Re-exports for convenience.
pub use classifier::LlmClassifier;
pub use generator::LlmGenerator;
pub use matcher::{DisabledMatcher, EmbeddingPeerMatcher};
pub use registry::ProviderRegistry;
pub use traits::{
    ChatRequest, ChatResponse, Classifier, EmbeddingsRequest, EmbeddingsResponse,
    FragmentStream, GenerationRequest, Generator, LlmProvider, PeerMatcher,
};
