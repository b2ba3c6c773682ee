use std::sync::Arc;

use chrono::{DateTime, Utc};
use kp_domain::config::Config;
use kp_providers::registry::ProviderRegistry;
use kp_sessions::SessionStore;

use crate::runtime::Orchestrator;

/// Shared application state passed to all API handlers and CLI commands.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub llm: Arc<ProviderRegistry>,
    pub sessions: Arc<SessionStore>,
    pub orchestrator: Arc<Orchestrator>,
    /// Peers loaded for matching (0 when matching is disabled).
    pub peer_count: usize,
    pub started_at: DateTime<Utc>,
}
