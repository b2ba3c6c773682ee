use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Triage thresholds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Thresholds read by the phase, action and peer-match rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    /// Effective risk at or above which the `probe` phase is a candidate.
    #[serde(default = "d_5")]
    pub probe_risk_threshold: u8,
    /// Messages with fewer words than this (at risk 1) count as greetings.
    #[serde(default = "d_greeting_words")]
    pub greeting_max_words: usize,
    /// Effective risk at or above which a locked cause routes to a peer group.
    #[serde(default = "d_5")]
    pub peer_route_risk_threshold: u8,
    /// Effective risk at or above which the peer matcher is consulted.
    #[serde(default = "d_5")]
    pub match_risk_threshold: u8,
    /// Cumulative history entries (including this turn's two) required
    /// before the matcher is consulted.
    #[serde(default = "d_min_history")]
    pub min_history_for_match: usize,
    #[serde(default)]
    pub escalation_target: EscalationTarget,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            probe_risk_threshold: d_5(),
            greeting_max_words: d_greeting_words(),
            peer_route_risk_threshold: d_5(),
            match_risk_threshold: d_5(),
            min_history_for_match: d_min_history(),
            escalation_target: EscalationTarget::default(),
        }
    }
}

/// Which escalation action name this deployment emits on self-harm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTarget {
    #[default]
    Human,
    TeleManas,
}

fn d_5() -> u8 {
    5
}
fn d_greeting_words() -> usize {
    5
}
fn d_min_history() -> usize {
    4
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Peer matching
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Provider id used for the embeddings endpoint.
    #[serde(default = "d_provider")]
    pub provider: String,
    #[serde(default = "d_embedding_model")]
    pub embedding_model: String,
    /// JSON array of peer records.
    #[serde(default = "d_peers_path")]
    pub peers_path: String,
    /// Cosine similarity below this is "no match".
    #[serde(default = "d_threshold")]
    pub similarity_threshold: f32,
    #[serde(default)]
    pub offer_policy: OfferPolicy,
    /// Expiry yields "no match".
    #[serde(default = "d_match_timeout")]
    pub timeout_secs: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: d_provider(),
            embedding_model: d_embedding_model(),
            peers_path: d_peers_path(),
            similarity_threshold: d_threshold(),
            offer_policy: OfferPolicy::default(),
            timeout_secs: d_match_timeout(),
        }
    }
}

/// Whether a peer already attached to an earlier turn may be offered again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferPolicy {
    #[default]
    EveryEligibleTurn,
    OncePerPeer,
}

fn d_true() -> bool {
    true
}
fn d_provider() -> String {
    "ollama".into()
}
fn d_embedding_model() -> String {
    "nomic-embed-text".into()
}
fn d_peers_path() -> String {
    "./data/peers.json".into()
}
fn d_threshold() -> f32 {
    0.70
}
fn d_match_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triage_defaults_match_the_phase_table() {
        let cfg: TriageConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.probe_risk_threshold, 5);
        assert_eq!(cfg.greeting_max_words, 5);
        assert_eq!(cfg.min_history_for_match, 4);
        assert_eq!(cfg.escalation_target, EscalationTarget::Human);
    }

    #[test]
    fn escalation_target_parses() {
        let cfg: TriageConfig = toml::from_str(r#"escalation_target = "tele_manas""#).unwrap();
        assert_eq!(cfg.escalation_target, EscalationTarget::TeleManas);
    }

    #[test]
    fn matching_defaults() {
        let cfg = MatchingConfig::default();
        assert!(cfg.enabled);
        assert!((cfg.similarity_threshold - 0.70).abs() < f32::EPSILON);
        assert_eq!(cfg.offer_policy, OfferPolicy::EveryEligibleTurn);
    }

    #[test]
    fn offer_policy_parses() {
        let cfg: MatchingConfig = toml::from_str(r#"offer_policy = "once_per_peer""#).unwrap();
        assert_eq!(cfg.offer_policy, OfferPolicy::OncePerPeer);
    }
}
