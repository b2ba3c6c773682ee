//! Shared domain types for the Kalpana support-session gateway.
//!
//! Everything here is free of I/O: configuration, the error type, the
//! classifier profile, peer records, conversation messages, and the pure
//! triage rules (phase derivation, escalation action, peer-match gating).

pub mod config;
pub mod error;
pub mod message;
pub mod peer;
pub mod profile;
pub mod stream;
pub mod trace;
pub mod triage;
