use serde::Serialize;

/// Structured trace events emitted across all Kalpana crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_id: String,
        seeded_greeting: bool,
    },
    SessionEnded {
        session_id: String,
        turns: u32,
        final_risk: u8,
    },
    LlmRequest {
        provider: String,
        model: String,
        purpose: String,
        streaming: bool,
        duration_ms: u64,
    },
    ClassifierFallback {
        reason: String,
    },
    RootCauseLocked {
        session_id: String,
        turn: u32,
        root_cause: String,
    },
    PeerMatched {
        session_id: String,
        turn: u32,
        peer_id: String,
        score: f32,
    },
    TurnCompleted {
        session_id: String,
        turn: u32,
        phase: String,
        action: String,
        risk_score: u8,
        duration_ms: u64,
    },
    TurnLogAppend {
        session_id: String,
        turn: u32,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "kp_event");
    }
}
