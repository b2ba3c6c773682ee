//! AppState construction shared by `serve`, `run` and `chat`, so every
//! entry point boots the same runtime with or without an HTTP listener.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use kp_domain::config::{Config, ConfigSeverity};
use kp_providers::matcher::load_peers;
use kp_providers::registry::ProviderRegistry;
use kp_providers::traits::PeerMatcher;
use kp_providers::{DisabledMatcher, EmbeddingPeerMatcher, LlmClassifier, LlmGenerator};
use kp_sessions::{JsonlTurnLog, SessionStore};

use crate::privacy::PiiScrubber;
use crate::runtime::{Collaborators, Orchestrator, TurnSettings};
use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let error_count = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if error_count > 0 {
        anyhow::bail!("config validation failed with {error_count} error(s)");
    }

    // ── LLM providers ────────────────────────────────────────────────
    let llm = Arc::new(
        ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?,
    );
    tracing::info!(providers = ?llm.list_providers(), "LLM provider registry ready");

    let generator = Arc::new(LlmGenerator::new(
        llm.require(&config.generator.provider, "generator")?,
        config.generator.clone(),
    ));
    let classifier = Arc::new(LlmClassifier::new(
        llm.require(&config.classifier.provider, "classifier")?,
        config.classifier.clone(),
    ));
    tracing::info!(
        generator_model = %config.generator.model,
        classifier_model = %config.classifier.model,
        "generator and classifier ready"
    );

    // ── Peer matching ────────────────────────────────────────────────
    let (matcher, peer_count): (Arc<dyn PeerMatcher>, usize) = if config.matching.enabled {
        let peers = match load_peers(Path::new(&config.matching.peers_path)) {
            Ok(peers) => peers,
            Err(e) => {
                tracing::warn!(
                    path = %config.matching.peers_path,
                    error = %e,
                    "could not load peers file, peer matching will never match"
                );
                Vec::new()
            }
        };
        let matcher = EmbeddingPeerMatcher::new(
            llm.require(&config.matching.provider, "matching")?,
            config.matching.clone(),
            peers,
        );
        let count = matcher.peer_count();
        tracing::info!(
            peers = count,
            threshold = config.matching.similarity_threshold,
            "peer matcher ready"
        );
        (Arc::new(matcher), count)
    } else {
        tracing::info!("peer matching disabled");
        (Arc::new(DisabledMatcher), 0)
    };

    // ── Turn log ─────────────────────────────────────────────────────
    let turn_log = Arc::new(
        JsonlTurnLog::new(Path::new(&config.storage.state_path))
            .context("initializing turn log")?,
    );
    tracing::info!(state_path = %config.storage.state_path, "turn log ready");

    // ── Sessions + orchestrator ──────────────────────────────────────
    let sessions = Arc::new(SessionStore::new(config.sessions.greeting.clone()));

    let scrubber = if config.privacy.scrub_pii {
        Some(PiiScrubber::new().context("compiling PII patterns")?)
    } else {
        None
    };

    let orchestrator = Arc::new(
        Orchestrator::new(
            Collaborators {
                generator,
                classifier,
                matcher,
                turn_log,
            },
            sessions.clone(),
            TurnSettings::from_config(&config),
        )
        .with_scrubber(scrubber),
    );
    tracing::info!(
        busy_policy = ?config.sessions.busy_policy,
        offer_policy = ?config.matching.offer_policy,
        "turn orchestrator ready"
    );

    Ok(AppState {
        config,
        llm,
        sessions,
        orchestrator,
        peer_count,
        started_at: chrono::Utc::now(),
    })
}
