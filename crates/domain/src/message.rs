use serde::{Deserialize, Serialize};

/// Who said a line of the session history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    /// Label used when a history line is rendered into a plain transcript.
    pub fn transcript_label(self) -> &'static str {
        match self {
            Speaker::User => "User",
            Speaker::Assistant => "Assistant",
        }
    }
}

/// One entry of a session's append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub speaker: Speaker,
    pub text: String,
}

impl HistoryEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::User, text: text.into() }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::Assistant, text: text.into() }
    }
}

/// A message sent to an LLM provider (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: text.into() }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: text.into() }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: text.into() }
    }
}

impl From<&HistoryEntry> for Message {
    fn from(entry: &HistoryEntry) -> Self {
        match entry.speaker {
            Speaker::User => Message::user(entry.text.clone()),
            Speaker::Assistant => Message::assistant(entry.text.clone()),
        }
    }
}

/// Render the tail of a history plus a new user line as the alternating
/// `User:` / `Assistant:` transcript the classifier reads.
///
/// `window` bounds how many prior entries are included.
pub fn render_transcript(history: &[HistoryEntry], window: usize, new_message: &str) -> String {
    let start = history.len().saturating_sub(window);
    let mut lines: Vec<String> = history[start..]
        .iter()
        .map(|e| format!("{}: {}", e.speaker.transcript_label(), e.text))
        .collect();
    lines.push(format!("{}: {}", Speaker::User.transcript_label(), new_message));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_includes_only_the_window() {
        let history = vec![
            HistoryEntry::user("one"),
            HistoryEntry::assistant("two"),
            HistoryEntry::user("three"),
            HistoryEntry::assistant("four"),
            HistoryEntry::user("five"),
            HistoryEntry::assistant("six"),
        ];
        let t = render_transcript(&history, 4, "seven");
        assert_eq!(
            t,
            "User: three\nAssistant: four\nUser: five\nAssistant: six\nUser: seven"
        );
    }

    #[test]
    fn transcript_of_empty_history_is_just_the_message() {
        assert_eq!(render_transcript(&[], 4, "hi"), "User: hi");
    }

    #[test]
    fn history_entry_converts_to_provider_message() {
        let m: Message = (&HistoryEntry::assistant("ok")).into();
        assert_eq!(m.role, Role::Assistant);
        assert_eq!(m.content, "ok");
    }
}
