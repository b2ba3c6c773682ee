//! Durable per-turn records.
//!
//! Every completed turn appends one JSON line to
//! `<state_path>/turns/<session_id>.jsonl`. Appends run on the blocking
//! pool so the runtime is never stalled on disk I/O.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kp_domain::error::{Error, Result};
use kp_domain::peer::PeerMatch;
use kp_domain::profile::Profile;
use kp_domain::trace::TraceEvent;
use kp_domain::triage::{Action, Phase};

/// One line of the turn log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub turn: u32,
    pub user_input: String,
    pub assistant_response: String,
    /// Phase supplied to the generator for this turn.
    pub listener_phase: Phase,
    /// Context anchor supplied to the generator for this turn.
    pub listener_context: String,
    pub action: Action,
    pub peer_group_match: Option<PeerMatch>,
    pub clinical_profile: Profile,
}

#[async_trait::async_trait]
pub trait TurnLogSink: Send + Sync {
    async fn append(&self, record: &TurnRecord) -> Result<()>;
}

/// JSONL files, one per session.
pub struct JsonlTurnLog {
    dir: PathBuf,
}

impl JsonlTurnLog {
    /// Create the log directory `<state_path>/turns`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("turns");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", file_stem(session_id)))
    }

    /// Read back every record of a session. A missing file is empty.
    pub fn read(&self, session_id: &str) -> Result<Vec<TurnRecord>> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        let mut records = Vec::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<TurnRecord>(line) {
                Ok(r) => records.push(r),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "skipping bad turn log line"
                ),
            }
        }
        Ok(records)
    }
}

#[async_trait::async_trait]
impl TurnLogSink for JsonlTurnLog {
    async fn append(&self, record: &TurnRecord) -> Result<()> {
        let mut buf = serde_json::to_string(record)?;
        buf.push('\n');
        let path = self.path_for(&record.session_id);

        tokio::task::spawn_blocking(move || {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(Error::Io)?;
            file.write_all(buf.as_bytes()).map_err(Error::Io)?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::TurnLog(format!("append task failed: {e}")))??;

        TraceEvent::TurnLogAppend {
            session_id: record.session_id.clone(),
            turn: record.turn,
        }
        .emit();
        Ok(())
    }
}

/// Session ids are caller-supplied. Bytes outside `[A-Za-z0-9_-]` are
/// percent-encoded, so the stem stays inside the log dir and distinct ids
/// never share a file.
fn file_stem(session_id: &str) -> String {
    use std::fmt::Write;

    let mut stem = String::with_capacity(session_id.len());
    for b in session_id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            stem.push(b as char);
        } else {
            let _ = write!(stem, "%{b:02X}");
        }
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;
    use kp_domain::profile::RootCause;

    fn record(session: &str, turn: u32) -> TurnRecord {
        TurnRecord {
            timestamp: Utc::now(),
            session_id: session.into(),
            turn,
            user_input: format!("message {turn}"),
            assistant_response: "I'm listening.".into(),
            listener_phase: Phase::Explore,
            listener_context: String::new(),
            action: Action::ContinueListening,
            peer_group_match: None,
            clinical_profile: Profile {
                root_cause_candidate: RootCause::Set("Exams".into()),
                ..Profile::fallback()
            },
        }
    }

    #[tokio::test]
    async fn appends_one_line_per_turn() {
        let tmp = tempfile::tempdir().unwrap();
        let log = JsonlTurnLog::new(tmp.path()).unwrap();
        log.append(&record("s1", 1)).await.unwrap();
        log.append(&record("s1", 2)).await.unwrap();
        log.append(&record("s2", 1)).await.unwrap();

        let raw = std::fs::read_to_string(log.path_for("s1")).unwrap();
        assert_eq!(raw.lines().count(), 2);

        let back = log.read("s1").unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[1].turn, 2);
        assert_eq!(back[0].clinical_profile.root_cause_candidate, RootCause::Set("Exams".into()));
        assert_eq!(log.read("s2").unwrap().len(), 1);
        assert!(log.read("nobody").unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_shape_uses_snake_case_labels() {
        let tmp = tempfile::tempdir().unwrap();
        let log = JsonlTurnLog::new(tmp.path()).unwrap();
        log.append(&record("s1", 1)).await.unwrap();
        let raw = std::fs::read_to_string(log.path_for("s1")).unwrap();
        let v: serde_json::Value = serde_json::from_str(raw.trim()).unwrap();
        assert_eq!(v["action"], "continue_listening");
        assert_eq!(v["listener_phase"], "explore");
        assert!(v["peer_group_match"].is_null());
        assert_eq!(v["clinical_profile"]["root_cause_candidate"], "Exams");
    }

    #[test]
    fn session_ids_cannot_escape_the_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let log = JsonlTurnLog::new(tmp.path()).unwrap();
        let path = log.path_for("../../etc/passwd");
        assert_eq!(path.parent().unwrap(), tmp.path().join("turns"));
    }

    #[tokio::test]
    async fn similar_session_ids_get_separate_files() {
        let tmp = tempfile::tempdir().unwrap();
        let log = JsonlTurnLog::new(tmp.path()).unwrap();
        assert_ne!(log.path_for("a.b"), log.path_for("a_b"));
        assert_ne!(log.path_for("a%2Eb"), log.path_for("a.b"));
        assert_eq!(log.path_for("a_b").file_name().unwrap(), "a_b.jsonl");

        log.append(&record("a.b", 1)).await.unwrap();
        log.append(&record("a_b", 1)).await.unwrap();
        log.append(&record("a_b", 2)).await.unwrap();
        assert_eq!(log.read("a.b").unwrap().len(), 1);
        assert_eq!(log.read("a_b").unwrap().len(), 2);
        assert!(log.read("a b").unwrap().is_empty());
    }
}
