//! Kalpana gateway: the turn orchestrator plus its HTTP and CLI surfaces.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod privacy;
pub mod runtime;
pub mod state;
