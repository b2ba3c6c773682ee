//! The classifier's structured view of one turn.
//!
//! A [`Profile`] has a fixed shape with explicit defaults. The default value
//! is the safe fallback the classifier returns whenever its model call or
//! parsing fails: risk 1, band low, no self-harm, root cause unset.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lowest and highest risk scores a profile may carry.
pub const MIN_RISK: u8 = 1;
pub const MAX_RISK: u8 = 10;

/// Summary text attached to the fallback profile when classification fails.
pub const FALLBACK_SUMMARY: &str = "Parsing failed or format error.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Root cause
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The life event judged to underlie the user's distress, or the
/// "unset" sentinel.
///
/// Serialized as a JSON string, with `null` standing for unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum RootCause {
    #[default]
    Unset,
    Set(String),
}

impl RootCause {
    /// Normalize raw classifier text. Sentinel spellings (`-`, empty,
    /// `none`, `unknown`, `n/a`, `null`) map to [`RootCause::Unset`].
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lowered = trimmed.to_ascii_lowercase();
        match lowered.as_str() {
            "" | "-" | "none" | "unknown" | "n/a" | "na" | "null" | "unset" => RootCause::Unset,
            _ => RootCause::Set(trimmed.to_owned()),
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, RootCause::Set(_))
    }

    pub fn as_deref(&self) -> Option<&str> {
        match self {
            RootCause::Unset => None,
            RootCause::Set(s) => Some(s.as_str()),
        }
    }
}

impl From<Option<String>> for RootCause {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(s) => RootCause::parse(&s),
            None => RootCause::Unset,
        }
    }
}

impl From<RootCause> for Option<String> {
    fn from(value: RootCause) -> Self {
        match value {
            RootCause::Unset => None,
            RootCause::Set(s) => Some(s),
        }
    }
}

impl fmt::Display for RootCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootCause::Unset => write!(f, "-"),
            RootCause::Set(s) => write!(f, "{s}"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Risk band
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    #[default]
    Low,
    Moderate,
    High,
}

impl RiskBand {
    /// Lenient parse of a classifier label. Unknown labels fall back to low.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "moderate" | "medium" => RiskBand::Moderate,
            "high" | "severe" => RiskBand::High,
            _ => RiskBand::Low,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Profile
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub risk_score: u8,
    pub detected_risk: RiskBand,
    pub self_harm_indicators: bool,
    pub root_cause_candidate: RootCause,
    pub clinical_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_emotion: Option<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            risk_score: MIN_RISK,
            detected_risk: RiskBand::Low,
            self_harm_indicators: false,
            root_cause_candidate: RootCause::Unset,
            clinical_summary: String::new(),
            primary_emotion: None,
        }
    }
}

impl Profile {
    /// The profile used when the classifier cannot produce one.
    pub fn fallback() -> Self {
        Self {
            clinical_summary: FALLBACK_SUMMARY.into(),
            ..Self::default()
        }
    }
}

/// Clamp an arbitrary integer into the valid risk range.
pub fn clamp_risk(raw: i64) -> u8 {
    raw.clamp(MIN_RISK as i64, MAX_RISK as i64) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_the_safe_tuple() {
        let p = Profile::default();
        assert_eq!(p.risk_score, 1);
        assert_eq!(p.detected_risk, RiskBand::Low);
        assert!(!p.self_harm_indicators);
        assert_eq!(p.root_cause_candidate, RootCause::Unset);
    }

    #[test]
    fn fallback_differs_only_in_summary() {
        let f = Profile::fallback();
        assert_eq!(f.clinical_summary, FALLBACK_SUMMARY);
        assert_eq!(
            Profile { clinical_summary: String::new(), ..f },
            Profile::default()
        );
    }

    #[test]
    fn root_cause_sentinels_are_unset() {
        for raw in ["-", "", "  ", "None", "UNKNOWN", "n/a", "null"] {
            assert_eq!(RootCause::parse(raw), RootCause::Unset, "{raw:?}");
        }
        assert_eq!(RootCause::parse(" Job loss "), RootCause::Set("Job loss".into()));
    }

    #[test]
    fn root_cause_serializes_as_optional_string() {
        let set = serde_json::to_value(RootCause::Set("Breakup".into())).unwrap();
        assert_eq!(set, serde_json::json!("Breakup"));
        let unset = serde_json::to_value(RootCause::Unset).unwrap();
        assert!(unset.is_null());
        let back: RootCause = serde_json::from_value(serde_json::json!("-")).unwrap();
        assert_eq!(back, RootCause::Unset);
    }

    #[test]
    fn risk_is_clamped() {
        assert_eq!(clamp_risk(-3), 1);
        assert_eq!(clamp_risk(0), 1);
        assert_eq!(clamp_risk(7), 7);
        assert_eq!(clamp_risk(42), 10);
    }

    #[test]
    fn risk_band_parse_is_lenient() {
        assert_eq!(RiskBand::parse("High"), RiskBand::High);
        assert_eq!(RiskBand::parse("moderate"), RiskBand::Moderate);
        assert_eq!(RiskBand::parse("whatever"), RiskBand::Low);
    }
}
