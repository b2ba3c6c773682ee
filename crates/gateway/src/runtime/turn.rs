//! The turn orchestrator.
//!
//! One user message becomes one spawned turn task. Inside it the
//! classifier runs as its own task while the generator stream is consumed
//! in place, forwarding fragments to the caller. Both are joined at a
//! single point, after which the session update, phase/action derivation
//! and peer gating happen in one synchronous commit under the session
//! lock. A failed or stopped turn commits nothing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::Instrument;

use kp_domain::config::{BusyPolicy, Config, OfferPolicy, TriageConfig};
use kp_domain::message::render_transcript;
use kp_domain::peer::PeerMatch;
use kp_domain::profile::{clamp_risk, Profile, RootCause};
use kp_domain::trace::TraceEvent;
use kp_domain::triage::{
    derive_action, derive_phase, match_eligible, word_count, Action, Phase, TurnSignals,
};
use kp_providers::traits::{Classifier, GenerationRequest, Generator, PeerMatcher};
use kp_sessions::{
    SessionBusy, SessionGuard, SessionStore, TurnCommit, TurnLogSink, TurnRecord,
};

use crate::privacy::PiiScrubber;

use super::cancel::{CancelMap, CancelToken};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted during a single turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    /// Incremental text from the generator.
    #[serde(rename = "assistant_delta")]
    AssistantDelta { text: String },

    /// The committed outcome of the turn.
    #[serde(rename = "final")]
    Final { result: Box<TurnResult> },

    /// The turn was stopped before committing.
    #[serde(rename = "stopped")]
    Stopped {
        /// Partial content streamed before the stop.
        content: String,
    },

    /// The turn failed; the session is unchanged.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Everything a caller learns about a completed turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResult {
    pub session_id: String,
    pub turn: u32,
    pub response: String,
    /// Phase the next turn will run in.
    pub phase: Phase,
    pub action: Action,
    pub peer_match: Option<PeerMatch>,
    /// The classifier profile with the locked root cause restored.
    pub profile: Profile,
    /// Phase and anchor the generator actually ran with.
    pub listener_phase: Phase,
    pub listener_context: String,
    pub risk_score: u8,
    pub root_cause: RootCause,
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Busy(#[from] SessionBusy),
    #[error("generator failed: {0}")]
    Generator(kp_domain::error::Error),
    #[error("generator timed out after {0}s")]
    GeneratorTimeout(u64),
    #[error("turn stopped")]
    Stopped { partial: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to a single turn.
pub struct TurnInput {
    /// Existing session to continue; `None` starts a new one.
    pub session_id: Option<String>,
    pub message: String,
}

/// A submitted turn: the session it runs on and its event stream.
///
/// Dropping the receiver stops the turn without committing it.
pub struct TurnHandle {
    pub session_id: String,
    pub events: mpsc::Receiver<TurnEvent>,
}

impl TurnHandle {
    /// Drain every event until the turn task finishes.
    pub async fn collect(mut self) -> Vec<TurnEvent> {
        let mut out = Vec::new();
        while let Some(event) = self.events.recv().await {
            out.push(event);
        }
        out
    }
}

/// Per-deployment knobs read once from [`Config`].
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub triage: TriageConfig,
    pub offer_policy: OfferPolicy,
    pub transcript_window: usize,
    pub busy_policy: BusyPolicy,
    pub generator_timeout: Duration,
    pub classifier_timeout: Duration,
    pub matcher_timeout: Duration,
}

impl TurnSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            triage: config.triage.clone(),
            offer_policy: config.matching.offer_policy,
            transcript_window: config.classifier.transcript_window,
            busy_policy: config.sessions.busy_policy,
            generator_timeout: Duration::from_secs(config.generator.timeout_secs),
            classifier_timeout: Duration::from_secs(config.classifier.timeout_secs),
            matcher_timeout: Duration::from_secs(config.matching.timeout_secs),
        }
    }
}

/// The four external collaborators a turn talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn Generator>,
    pub classifier: Arc<dyn Classifier>,
    pub matcher: Arc<dyn PeerMatcher>,
    pub turn_log: Arc<dyn TurnLogSink>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Orchestrator {
    deps: Collaborators,
    sessions: Arc<SessionStore>,
    cancel_map: Arc<CancelMap>,
    scrubber: Option<PiiScrubber>,
    settings: TurnSettings,
}

impl Orchestrator {
    pub fn new(deps: Collaborators, sessions: Arc<SessionStore>, settings: TurnSettings) -> Self {
        Self {
            deps,
            sessions,
            cancel_map: Arc::new(CancelMap::new()),
            scrubber: None,
            settings,
        }
    }

    pub fn with_scrubber(mut self, scrubber: Option<PiiScrubber>) -> Self {
        self.scrubber = scrubber;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Request a stop of the session's running turn, if any.
    pub fn stop(&self, session_id: &str) -> bool {
        self.cancel_map.cancel(session_id)
    }

    pub fn is_running(&self, session_id: &str) -> bool {
        self.cancel_map.is_running(session_id)
    }

    /// Submit one user message.
    ///
    /// Waits for (or, under the `reject` policy, refuses) any turn already
    /// running on the session, then spawns the turn and returns its event
    /// stream. The stream ends with exactly one `Final`, `Stopped` or
    /// `Error` event.
    pub async fn submit(self: &Arc<Self>, input: TurnInput) -> Result<TurnHandle, TurnError> {
        let message = input.message.trim();
        if message.is_empty() {
            return Err(TurnError::EmptyMessage);
        }
        let message = match &self.scrubber {
            Some(s) => s.scrub(message),
            None => message.to_owned(),
        };

        let session_id = self.sessions.open(input.session_id.as_deref());
        let mut session = self
            .sessions
            .acquire(&session_id, self.settings.busy_policy)
            .await?;
        let cancel = self.cancel_map.register(&session_id);

        let (tx, rx) = mpsc::channel::<TurnEvent>(64);
        let turn_span = tracing::info_span!(
            "turn",
            session_id = %session_id,
            turn = session.turn_count + 1,
            "otel.kind" = "SERVER",
        );

        let this = self.clone();
        let sid = session_id.clone();
        tokio::spawn(
            async move {
                tracing::debug!("turn started");
                let result = this.run_turn(&mut session, message, &tx, &cancel).await;

                // The token must go before the session lock is released,
                // or it could remove the next queued turn's token.
                this.cancel_map.remove(&sid);
                drop(session);

                match result {
                    Ok(()) => {}
                    Err(TurnError::Stopped { partial }) => {
                        tracing::info!("turn stopped before commit");
                        let _ = tx.send(TurnEvent::Stopped { content: partial }).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "turn failed");
                        let _ = tx.send(TurnEvent::Error { message: e.to_string() }).await;
                    }
                }
            }
            .instrument(turn_span),
        );

        Ok(TurnHandle {
            session_id,
            events: rx,
        })
    }

    async fn run_turn(
        &self,
        session: &mut SessionGuard,
        message: String,
        tx: &mpsc::Sender<TurnEvent>,
        cancel: &CancelToken,
    ) -> Result<(), TurnError> {
        let started = Instant::now();

        // ── Snapshot what the generator sees ─────────────────────────
        let listener_phase = session.phase;
        let listener_context = session.context_anchor.clone();
        let history_before = session.history.len();

        // ── Fork: classifier task ────────────────────────────────────
        let transcript =
            render_transcript(&session.history, self.settings.transcript_window, &message);
        let classifier = self.deps.classifier.clone();
        let classifier_timeout = self.settings.classifier_timeout;
        let classify = tokio::spawn(
            async move {
                match tokio::time::timeout(classifier_timeout, classifier.analyze(&transcript))
                    .await
                {
                    Ok(profile) => profile,
                    Err(_) => {
                        TraceEvent::ClassifierFallback {
                            reason: format!("timed out after {}s", classifier_timeout.as_secs()),
                        }
                        .emit();
                        Profile::fallback()
                    }
                }
            }
            .in_current_span(),
        );

        // ── Fork: generator stream (consumed here) ───────────────────
        let request = GenerationRequest {
            history: session.history.clone(),
            message: message.clone(),
            phase: listener_phase,
            context_anchor: listener_context.clone(),
        };
        let generated = tokio::time::timeout(
            self.settings.generator_timeout,
            self.stream_response(request, tx, cancel),
        )
        .await;
        let response = match generated {
            Ok(Ok(text)) => text,
            // Dropping the handle detaches the classifier; its profile is discarded.
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(TurnError::GeneratorTimeout(
                    self.settings.generator_timeout.as_secs(),
                ))
            }
        };

        // ── Join ─────────────────────────────────────────────────────
        let joined = tokio::select! {
            joined = classify => joined,
            _ = cancel.cancelled() => return Err(TurnError::Stopped { partial: response }),
            _ = tx.closed() => return Err(TurnError::Stopped { partial: response }),
        };
        let mut profile = joined.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "classifier task failed");
            TraceEvent::ClassifierFallback {
                reason: format!("task failed: {e}"),
            }
            .emit();
            Profile::fallback()
        });
        profile.risk_score = clamp_risk(i64::from(profile.risk_score));

        // ── Gating on the effective state ────────────────────────────
        let effective = session.preview_update(&profile);
        let signals = TurnSignals {
            self_harm: profile.self_harm_indicators,
            root_cause_locked: effective.root_cause.is_set(),
            risk_score: effective.risk_score,
            word_count: word_count(&message),
        };
        let next_phase = derive_phase(&self.settings.triage, signals);
        let action = derive_action(&self.settings.triage, signals);
        let peer_match = if match_eligible(&self.settings.triage, signals, history_before) {
            self.find_peer(session, &effective.root_cause).await
        } else {
            None
        };

        if cancel.is_cancelled() || tx.is_closed() {
            return Err(TurnError::Stopped { partial: response });
        }

        // ── Commit ───────────────────────────────────────────────────
        let (turn, effective) = session.commit_turn(TurnCommit {
            user_message: message.clone(),
            response: response.clone(),
            profile: &mut profile,
            next_phase,
            offered_peer: peer_match.as_ref().map(|m| m.peer_id.clone()),
        });
        session.publish();

        let session_id = session.session_id.clone();
        if effective.newly_locked {
            TraceEvent::RootCauseLocked {
                session_id: session_id.clone(),
                turn,
                root_cause: effective.root_cause.to_string(),
            }
            .emit();
        }
        if let Some(m) = &peer_match {
            TraceEvent::PeerMatched {
                session_id: session_id.clone(),
                turn,
                peer_id: m.peer_id.clone(),
                score: m.score,
            }
            .emit();
        }
        TraceEvent::TurnCompleted {
            session_id: session_id.clone(),
            turn,
            phase: next_phase.to_string(),
            action: action.to_string(),
            risk_score: effective.risk_score,
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        // ── Emit, then log ───────────────────────────────────────────
        let result = TurnResult {
            session_id: session_id.clone(),
            turn,
            response: response.clone(),
            phase: next_phase,
            action,
            peer_match: peer_match.clone(),
            profile: profile.clone(),
            listener_phase,
            listener_context: listener_context.clone(),
            risk_score: effective.risk_score,
            root_cause: effective.root_cause,
        };
        let _ = tx
            .send(TurnEvent::Final {
                result: Box::new(result),
            })
            .await;

        let record = TurnRecord {
            timestamp: Utc::now(),
            session_id,
            turn,
            user_input: message,
            assistant_response: response,
            listener_phase,
            listener_context,
            action,
            peer_group_match: peer_match,
            clinical_profile: profile,
        };
        if let Err(e) = self.deps.turn_log.append(&record).await {
            tracing::warn!(error = %e, turn, "turn log append failed");
        }

        Ok(())
    }

    /// Consume the generator stream, forwarding each fragment.
    ///
    /// Stops on an explicit cancel or when the caller drops its receiver.
    async fn stream_response(
        &self,
        request: GenerationRequest,
        tx: &mpsc::Sender<TurnEvent>,
        cancel: &CancelToken,
    ) -> Result<String, TurnError> {
        let mut stream = self
            .deps
            .generator
            .stream(request)
            .await
            .map_err(TurnError::Generator)?;

        let mut text = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TurnError::Stopped { partial: text }),
                _ = tx.closed() => return Err(TurnError::Stopped { partial: text }),
                next = stream.next() => next,
            };
            let Some(fragment) = next else { break };
            let fragment = fragment.map_err(TurnError::Generator)?;
            if fragment.is_empty() {
                continue;
            }
            text.push_str(&fragment);
            if tx.send(TurnEvent::AssistantDelta { text: fragment }).await.is_err() {
                return Err(TurnError::Stopped { partial: text });
            }
        }
        Ok(text)
    }

    /// Ask the matcher for a peer, bounded by the matcher timeout and
    /// filtered by the offer policy.
    async fn find_peer(&self, session: &SessionGuard, root_cause: &RootCause) -> Option<PeerMatch> {
        let cause = root_cause.as_deref()?;
        let found = match tokio::time::timeout(
            self.settings.matcher_timeout,
            self.deps.matcher.find_match(cause),
        )
        .await
        {
            Ok(found) => found,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.settings.matcher_timeout.as_secs(),
                    "peer matcher timed out"
                );
                None
            }
        }?;

        if self.settings.offer_policy == OfferPolicy::OncePerPeer
            && session.has_offered(&found.peer_id)
        {
            tracing::debug!(peer_id = %found.peer_id, "peer already offered in this session");
            return None;
        }
        Some(found)
    }
}
