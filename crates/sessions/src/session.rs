//! Per-session conversational state and its update rules.
//!
//! Two fields are irreversible: the root cause locks on the first turn
//! that produces one, and the risk score only ever rises. Everything a
//! turn changes is applied in one synchronous [`Session::commit_turn`]
//! call, so a holder of the session lock never leaves it half-updated.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kp_domain::message::HistoryEntry;
use kp_domain::profile::{Profile, RootCause, MIN_RISK};
use kp_domain::triage::Phase;

/// The session's root cause and risk after a profile has been folded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveState {
    pub root_cause: RootCause,
    pub risk_score: u8,
    /// True when this update is the one that set the root cause.
    pub newly_locked: bool,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub history: Vec<HistoryEntry>,
    pub phase: Phase,
    pub context_anchor: String,
    pub root_cause: RootCause,
    pub risk_score: u8,
    pub turn_count: u32,
    pub offered_peers: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A fresh session: explore phase, risk 1, no root cause.
    /// A greeting, when given, becomes the first assistant entry.
    pub fn new(session_id: impl Into<String>, greeting: Option<&str>) -> Self {
        let now = Utc::now();
        let history = greeting
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(|g| vec![HistoryEntry::assistant(g)])
            .unwrap_or_default();
        Self {
            session_id: session_id.into(),
            history,
            phase: Phase::Explore,
            context_anchor: String::new(),
            root_cause: RootCause::Unset,
            risk_score: MIN_RISK,
            turn_count: 0,
            offered_peers: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// What [`apply_turn_update`](Self::apply_turn_update) would produce,
    /// without touching the session.
    pub fn preview_update(&self, profile: &Profile) -> EffectiveState {
        let (root_cause, newly_locked) = match (&self.root_cause, &profile.root_cause_candidate) {
            (RootCause::Set(locked), _) => (RootCause::Set(locked.clone()), false),
            (RootCause::Unset, RootCause::Set(candidate)) => {
                (RootCause::Set(candidate.clone()), true)
            }
            (RootCause::Unset, RootCause::Unset) => (RootCause::Unset, false),
        };
        EffectiveState {
            root_cause,
            risk_score: self.risk_score.max(profile.risk_score),
            newly_locked,
        }
    }

    /// Fold a classifier profile into the session.
    ///
    /// The root cause is taken from the profile only while unset, and the
    /// locked value is written back into the profile so downstream readers
    /// see the effective one. Risk becomes `max(previous, profile)`.
    pub fn apply_turn_update(&mut self, profile: &mut Profile) -> EffectiveState {
        let effective = self.preview_update(profile);
        self.root_cause = effective.root_cause.clone();
        self.risk_score = effective.risk_score;
        profile.root_cause_candidate = effective.root_cause.clone();
        effective
    }

    /// Apply a completed turn in one step and return the new turn number.
    pub fn commit_turn(&mut self, commit: TurnCommit<'_>) -> (u32, EffectiveState) {
        let effective = self.apply_turn_update(commit.profile);
        self.phase = commit.next_phase;
        self.context_anchor = commit.profile.clinical_summary.clone();
        self.history.push(HistoryEntry::user(commit.user_message));
        self.history.push(HistoryEntry::assistant(commit.response));
        if let Some(peer_id) = commit.offered_peer {
            self.offered_peers.insert(peer_id);
        }
        self.turn_count += 1;
        self.updated_at = Utc::now();
        (self.turn_count, effective)
    }

    pub fn has_offered(&self, peer_id: &str) -> bool {
        self.offered_peers.contains(peer_id)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            history: self.history.clone(),
            phase: self.phase,
            context_anchor: self.context_anchor.clone(),
            root_cause: self.root_cause.clone(),
            risk_score: self.risk_score,
            turn_count: self.turn_count,
            offered_peers: self.offered_peers.iter().cloned().collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Everything one successful turn writes into the session.
pub struct TurnCommit<'a> {
    pub user_message: String,
    pub response: String,
    pub profile: &'a mut Profile,
    pub next_phase: Phase,
    pub offered_peer: Option<String>,
}

/// Read-only copy of a session, as published after each commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub history: Vec<HistoryEntry>,
    pub phase: Phase,
    pub context_anchor: String,
    pub root_cause: RootCause,
    pub risk_score: u8,
    pub turn_count: u32,
    #[serde(default)]
    pub offered_peers: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(risk: u8, cause: &str) -> Profile {
        Profile {
            risk_score: risk,
            root_cause_candidate: RootCause::parse(cause),
            clinical_summary: format!("summary r{risk}"),
            ..Profile::default()
        }
    }

    #[test]
    fn new_session_defaults() {
        let s = Session::new("s1", None);
        assert_eq!(s.phase, Phase::Explore);
        assert_eq!(s.risk_score, 1);
        assert_eq!(s.root_cause, RootCause::Unset);
        assert!(s.history.is_empty());
        assert_eq!(s.turn_count, 0);
    }

    #[test]
    fn greeting_seeds_history() {
        let s = Session::new("s1", Some("Hi, I'm here to listen."));
        assert_eq!(s.history, vec![HistoryEntry::assistant("Hi, I'm here to listen.")]);
        assert!(Session::new("s2", Some("   ")).history.is_empty());
    }

    #[test]
    fn risk_never_decreases() {
        let mut s = Session::new("s", None);
        let mut seen = Vec::new();
        for r in [3, 7, 2, 5, 9, 1] {
            let e = s.apply_turn_update(&mut profile(r, "-"));
            seen.push(e.risk_score);
        }
        assert_eq!(seen, vec![3, 7, 7, 7, 9, 9]);
    }

    #[test]
    fn root_cause_is_write_once() {
        let mut s = Session::new("s", None);

        let e = s.apply_turn_update(&mut profile(2, "-"));
        assert_eq!(e.root_cause, RootCause::Unset);
        assert!(!e.newly_locked);

        let mut first = profile(2, "Job loss");
        let e = s.apply_turn_update(&mut first);
        assert!(e.newly_locked);
        assert_eq!(first.root_cause_candidate, RootCause::Set("Job loss".into()));

        let mut second = profile(2, "Breakup");
        let e = s.apply_turn_update(&mut second);
        assert!(!e.newly_locked);
        assert_eq!(e.root_cause, RootCause::Set("Job loss".into()));
        // the locked value is restored into the profile
        assert_eq!(second.root_cause_candidate, RootCause::Set("Job loss".into()));

        let mut unset = profile(2, "none");
        s.apply_turn_update(&mut unset);
        assert_eq!(s.root_cause, RootCause::Set("Job loss".into()));
        assert_eq!(unset.root_cause_candidate, RootCause::Set("Job loss".into()));
    }

    #[test]
    fn preview_does_not_mutate() {
        let s = Session::new("s", None);
        let e = s.preview_update(&profile(8, "Exams"));
        assert_eq!(e.risk_score, 8);
        assert!(e.newly_locked);
        assert_eq!(s.risk_score, 1);
        assert_eq!(s.root_cause, RootCause::Unset);
    }

    #[test]
    fn commit_applies_whole_turn() {
        let mut s = Session::new("s", None);
        let mut p = profile(6, "Bereavement");
        let (turn, effective) = s.commit_turn(TurnCommit {
            user_message: "my dad died".into(),
            response: "I'm so sorry.".into(),
            profile: &mut p,
            next_phase: Phase::Process,
            offered_peer: Some("peer-7".into()),
        });
        assert_eq!(turn, 1);
        assert_eq!(effective.risk_score, 6);
        assert_eq!(s.phase, Phase::Process);
        assert_eq!(s.context_anchor, "summary r6");
        assert_eq!(
            s.history,
            vec![HistoryEntry::user("my dad died"), HistoryEntry::assistant("I'm so sorry.")]
        );
        assert!(s.has_offered("peer-7"));

        let snap = s.snapshot();
        assert_eq!(snap.turn_count, 1);
        assert_eq!(snap.root_cause, RootCause::Set("Bereavement".into()));
        assert_eq!(snap.offered_peers, vec!["peer-7".to_string()]);
    }

    #[test]
    fn empty_summary_still_overwrites_anchor() {
        let mut s = Session::new("s", None);
        s.context_anchor = "old".into();
        let mut p = Profile::default();
        s.commit_turn(TurnCommit {
            user_message: "hi".into(),
            response: "hello".into(),
            profile: &mut p,
            next_phase: Phase::Greeting,
            offered_peer: None,
        });
        assert_eq!(s.context_anchor, "");
    }
}
