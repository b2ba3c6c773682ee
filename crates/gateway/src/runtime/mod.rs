//! Core runtime: the turn orchestrator and its cancellation plumbing.
//!
//! Entry point: [`Orchestrator::submit`] takes a session id + user message
//! and returns a stream of [`TurnEvent`]s suitable for SSE or
//! non-streaming aggregation.

pub mod cancel;
pub mod turn;

pub use cancel::{CancelMap, CancelToken};
pub use turn::{
    Collaborators, Orchestrator, TurnError, TurnEvent, TurnHandle, TurnInput, TurnResult,
    TurnSettings,
};
