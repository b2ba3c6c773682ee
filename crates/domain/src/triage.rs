//! Pure gating rules evaluated once per turn.
//!
//! - [`derive_phase`] picks the conversational phase for the next turn
//!   from a priority-ordered candidate set.
//! - [`derive_action`] picks the informational escalation action.
//! - [`match_eligible`] decides whether the peer matcher is consulted.
//!
//! All three are deterministic functions of their inputs and the
//! [`TriageConfig`] thresholds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{EscalationTarget, TriageConfig};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Phase
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Conversational mode that governs the generator's instructions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Explore,
    Probe,
    Process,
    Crisis,
    Greeting,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Explore => "explore",
            Phase::Probe => "probe",
            Phase::Process => "process",
            Phase::Crisis => "crisis",
            Phase::Greeting => "greeting",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Action
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Informational routing decision recorded with each turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    EscalateToHuman,
    EscalateToTeleManas,
    RouteToPeerGroup,
    ContinueListening,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::EscalateToHuman => "escalate_to_human",
            Action::EscalateToTeleManas => "escalate_to_tele_manas",
            Action::RouteToPeerGroup => "route_to_peer_group",
            Action::ContinueListening => "continue_listening",
        }
    }

    pub fn is_escalation(self) -> bool {
        matches!(self, Action::EscalateToHuman | Action::EscalateToTeleManas)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The effective per-turn facts every rule reads.
///
/// `root_cause_locked` and `risk_score` are the session's values *after*
/// the write-once lock and the monotonic max have been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSignals {
    pub self_harm: bool,
    pub root_cause_locked: bool,
    pub risk_score: u8,
    pub word_count: usize,
}

/// Whitespace-separated word count of a message.
pub fn word_count(message: &str) -> usize {
    message.split_whitespace().count()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rules
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Select the next phase: every matching condition contributes a
/// `(priority, phase)` candidate and the smallest priority wins.
/// `explore` is always a candidate, so the function is total.
pub fn derive_phase(cfg: &TriageConfig, s: TurnSignals) -> Phase {
    let mut candidates: Vec<(u8, Phase)> = Vec::with_capacity(5);
    if s.self_harm {
        candidates.push((0, Phase::Crisis));
    }
    if s.root_cause_locked {
        candidates.push((1, Phase::Process));
    }
    if s.risk_score >= cfg.probe_risk_threshold {
        candidates.push((2, Phase::Probe));
    }
    if s.word_count < cfg.greeting_max_words && s.risk_score == crate::profile::MIN_RISK {
        candidates.push((3, Phase::Greeting));
    }
    candidates.push((4, Phase::Explore));

    candidates
        .into_iter()
        .min_by_key(|(priority, _)| *priority)
        .map(|(_, phase)| phase)
        .unwrap_or_default()
}

/// Self-harm escalates; a locked cause at or above the routing threshold
/// routes to a peer group; anything else keeps listening.
pub fn derive_action(cfg: &TriageConfig, s: TurnSignals) -> Action {
    if s.self_harm {
        match cfg.escalation_target {
            EscalationTarget::Human => Action::EscalateToHuman,
            EscalationTarget::TeleManas => Action::EscalateToTeleManas,
        }
    } else if s.root_cause_locked && s.risk_score >= cfg.peer_route_risk_threshold {
        Action::RouteToPeerGroup
    } else {
        Action::ContinueListening
    }
}

/// Whether the peer matcher should be consulted this turn.
///
/// `history_len_before` is the history length before this turn's two
/// entries are appended.
pub fn match_eligible(cfg: &TriageConfig, s: TurnSignals, history_len_before: usize) -> bool {
    s.root_cause_locked
        && s.risk_score >= cfg.match_risk_threshold
        && history_len_before + 2 >= cfg.min_history_for_match
}
