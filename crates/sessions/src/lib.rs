//! Session state for Kalpana.
//!
//! Holds the per-session record and its irreversible update rules, the
//! in-memory store that serializes turns per session, and the durable
//! append-only turn log.

pub mod session;
pub mod store;
pub mod turn_log;

pub use session::{EffectiveState, Session, SessionSnapshot, TurnCommit};
pub use store::{SessionBusy, SessionGuard, SessionStore, SessionSummary};
pub use turn_log::{JsonlTurnLog, TurnLogSink, TurnRecord};
