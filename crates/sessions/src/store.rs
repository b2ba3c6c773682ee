//! In-memory session store.
//!
//! Each session id maps to a slot holding the live [`Session`] behind an
//! async mutex plus the last published [`SessionSnapshot`]. A turn holds
//! the mutex for its whole duration, which serializes turns on one
//! session; readers only ever see the published snapshot, which is
//! replaced after a turn has fully committed.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use kp_domain::config::BusyPolicy;
use kp_domain::profile::RootCause;
use kp_domain::trace::TraceEvent;
use kp_domain::triage::Phase;

use crate::session::{Session, SessionSnapshot};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slots and guards
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct SessionSlot {
    state: Arc<Mutex<Session>>,
    published: RwLock<SessionSnapshot>,
}

impl SessionSlot {
    fn new(session: Session) -> Self {
        let snapshot = session.snapshot();
        Self {
            state: Arc::new(Mutex::new(session)),
            published: RwLock::new(snapshot),
        }
    }
}

/// Exclusive access to one session for the duration of a turn.
///
/// Dropping the guard releases the session to the next queued turn.
pub struct SessionGuard {
    slot: Arc<SessionSlot>,
    session: OwnedMutexGuard<Session>,
}

impl SessionGuard {
    /// Make the current state visible to snapshot readers.
    pub fn publish(&self) {
        *self.slot.published.write() = self.session.snapshot();
    }
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

/// Returned under the `reject` busy policy when a turn is already running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBusy {
    pub session_id: String,
}

impl std::fmt::Display for SessionBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session {} is busy: a turn is already in progress", self.session_id)
    }
}

impl std::error::Error for SessionBusy {}

/// Listing row for `GET /v1/sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub turn_count: u32,
    pub phase: Phase,
    pub risk_score: u8,
    pub root_cause: RootCause,
    pub updated_at: DateTime<Utc>,
}

impl From<&SessionSnapshot> for SessionSummary {
    fn from(s: &SessionSnapshot) -> Self {
        Self {
            session_id: s.session_id.clone(),
            turn_count: s.turn_count,
            phase: s.phase,
            risk_score: s.risk_score,
            root_cause: s.root_cause.clone(),
            updated_at: s.updated_at,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionStore {
    slots: RwLock<HashMap<String, Arc<SessionSlot>>>,
    greeting: Option<String>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SessionStore {
    pub fn new(greeting: Option<String>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            greeting,
        }
    }

    /// Return the id of an existing session, or create one. A missing or
    /// blank id gets a fresh UUID.
    pub fn open(&self, session_id: Option<&str>) -> String {
        let id = match session_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_owned(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        self.slot(&id);
        id
    }

    fn slot(&self, session_id: &str) -> Arc<SessionSlot> {
        if let Some(slot) = self.slots.read().get(session_id) {
            return slot.clone();
        }
        let mut slots = self.slots.write();
        slots
            .entry(session_id.to_owned())
            .or_insert_with(|| {
                let session = Session::new(session_id, self.greeting.as_deref());
                TraceEvent::SessionCreated {
                    session_id: session_id.to_owned(),
                    seeded_greeting: !session.history.is_empty(),
                }
                .emit();
                Arc::new(SessionSlot::new(session))
            })
            .clone()
    }

    /// Take exclusive hold of a session, creating it if needed.
    ///
    /// Under [`BusyPolicy::Queue`] this waits for any running turn to
    /// finish; under [`BusyPolicy::Reject`] it fails immediately instead.
    pub async fn acquire(
        &self,
        session_id: &str,
        policy: BusyPolicy,
    ) -> Result<SessionGuard, SessionBusy> {
        let slot = self.slot(session_id);
        let session = match policy {
            BusyPolicy::Queue => slot.state.clone().lock_owned().await,
            BusyPolicy::Reject => slot.state.clone().try_lock_owned().map_err(|_| SessionBusy {
                session_id: session_id.to_owned(),
            })?,
        };
        Ok(SessionGuard { slot, session })
    }

    /// Last published snapshot of a session.
    pub fn get(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.slots
            .read()
            .get(session_id)
            .map(|slot| slot.published.read().clone())
    }

    /// All sessions, most recently updated first.
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut rows: Vec<SessionSummary> = self
            .slots
            .read()
            .values()
            .map(|slot| SessionSummary::from(&*slot.published.read()))
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        rows
    }

    /// End a session. A turn still running on it finishes against the
    /// detached state and is not visible afterwards.
    pub fn remove(&self, session_id: &str) -> Option<SessionSnapshot> {
        let slot = self.slots.write().remove(session_id)?;
        let snapshot = slot.published.read().clone();
        TraceEvent::SessionEnded {
            session_id: snapshot.session_id.clone(),
            turns: snapshot.turn_count,
            final_risk: snapshot.risk_score,
        }
        .emit();
        Some(snapshot)
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kp_domain::message::HistoryEntry;
    use std::time::Duration;

    #[test]
    fn open_assigns_uuid_when_missing() {
        let store = SessionStore::default();
        let a = store.open(None);
        let b = store.open(Some("  "));
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
        assert_eq!(store.open(Some("fixed")), "fixed");
        assert_eq!(store.open(Some("fixed")), "fixed");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn greeting_is_seeded_into_new_sessions() {
        let store = SessionStore::new(Some("Hello there.".into()));
        let id = store.open(None);
        let snap = store.get(&id).unwrap();
        assert_eq!(snap.history, vec![HistoryEntry::assistant("Hello there.")]);
    }

    #[tokio::test]
    async fn changes_are_invisible_until_published() {
        let store = SessionStore::default();
        let mut guard = store.acquire("s1", BusyPolicy::Queue).await.unwrap();
        guard.risk_score = 7;
        assert_eq!(store.get("s1").unwrap().risk_score, 1);
        guard.publish();
        assert_eq!(store.get("s1").unwrap().risk_score, 7);
    }

    #[tokio::test]
    async fn reject_policy_fails_fast() {
        let store = SessionStore::default();
        let _held = store.acquire("s1", BusyPolicy::Reject).await.unwrap();
        let err = store.acquire("s1", BusyPolicy::Reject).await.err().unwrap();
        assert_eq!(err.session_id, "s1");
        // other sessions are unaffected
        assert!(store.acquire("s2", BusyPolicy::Reject).await.is_ok());
    }

    #[tokio::test]
    async fn queue_policy_waits_for_release() {
        let store = Arc::new(SessionStore::default());
        let first = store.acquire("s1", BusyPolicy::Queue).await.unwrap();

        let store2 = store.clone();
        let waiter = tokio::spawn(async move {
            let guard = store2.acquire("s1", BusyPolicy::Queue).await.unwrap();
            guard.turn_count
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        let mut first = first;
        first.turn_count = 1;
        drop(first);

        assert_eq!(waiter.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn remove_ends_session() {
        let store = SessionStore::default();
        store.open(Some("gone"));
        let snap = store.remove("gone").unwrap();
        assert_eq!(snap.session_id, "gone");
        assert!(store.get("gone").is_none());
        assert!(store.remove("gone").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn list_is_sorted_by_recency() {
        let store = SessionStore::default();
        store.open(Some("old"));
        tokio::time::sleep(Duration::from_millis(5)).await;
        let mut g = store.acquire("new", BusyPolicy::Queue).await.unwrap();
        g.updated_at = Utc::now();
        g.publish();
        let ids: Vec<String> = store.list().into_iter().map(|r| r.session_id).collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
    }
}
