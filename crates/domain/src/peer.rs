use serde::{Deserialize, Serialize};

/// A peer who has lived through a similar life event and agreed to be
/// contacted. Loaded from the peers file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub peer_id: String,
    /// Free-text description of the peer's own root cause; this is what
    /// gets embedded and compared.
    pub root_cause: String,
    #[serde(default)]
    pub primary_emotion: Option<String>,
    #[serde(default)]
    pub clinical_notes: Option<String>,
}

/// The matcher's answer: the closest peer and its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerMatch {
    pub peer_id: String,
    /// Cosine similarity, capped at 1.0.
    pub score: f32,
    pub root_cause: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_notes: Option<String>,
}

impl PeerMatch {
    pub fn from_record(record: &PeerRecord, score: f32) -> Self {
        Self {
            peer_id: record.peer_id.clone(),
            score: score.min(1.0),
            root_cause: record.root_cause.clone(),
            primary_emotion: record.primary_emotion.clone(),
            clinical_notes: record.clinical_notes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_capped() {
        let rec = PeerRecord {
            peer_id: "p1".into(),
            root_cause: "Job loss".into(),
            primary_emotion: None,
            clinical_notes: None,
        };
        assert_eq!(PeerMatch::from_record(&rec, 1.000_01).score, 1.0);
        assert!((PeerMatch::from_record(&rec, 0.8).score - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn record_optional_fields_default() {
        let rec: PeerRecord =
            serde_json::from_str(r#"{"peer_id":"p2","root_cause":"Breakup"}"#).unwrap();
        assert!(rec.primary_emotion.is_none());
        assert!(rec.clinical_notes.is_none());
    }
}
