//! `kalpana chat`: interactive REPL command.
//!
//! Opens a readline-based loop that sends each line as a turn and streams
//! the response back. Slash-commands manage the session.

use std::io::Write;
use std::sync::Arc;

use kp_domain::config::Config;

use crate::bootstrap;
use crate::runtime::{TurnEvent, TurnInput};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the interactive chat REPL.
pub async fn chat(config: Arc<Config>, session: Option<String>) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config).await?;
    let mut session_id = state.sessions.open(session.as_deref());

    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".kalpana")
        .join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    // Welcome on stderr keeps stdout clean for output.
    eprintln!("Kalpana interactive chat");
    eprintln!("Session: {session_id}  |  Type /help for commands, Ctrl+D to exit");
    eprintln!();
    print_greeting(&state, &session_id);

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    if handle_slash_command(trimmed, &state, &mut session_id) {
                        break;
                    }
                    continue;
                }

                if let Err(e) = send_message(&state, &session_id, trimmed).await {
                    eprintln!("\x1B[31merror: {e}\x1B[0m");
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    state.sessions.remove(&session_id);

    eprintln!("Take care.");
    Ok(())
}

/// Print the seeded greeting of a fresh session, if any.
fn print_greeting(state: &AppState, session_id: &str) {
    if let Some(snapshot) = state.sessions.get(session_id) {
        if snapshot.turn_count == 0 {
            if let Some(first) = snapshot.history.first() {
                println!("{}\n", first.text);
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash command handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process a slash command. Returns `true` if the REPL should exit.
fn handle_slash_command(input: &str, state: &AppState, session_id: &mut String) -> bool {
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim()).filter(|s| !s.is_empty());

    match cmd {
        "/exit" | "/quit" => return true,

        "/session" => match arg {
            Some(id) => {
                *session_id = state.sessions.open(Some(id));
                eprintln!("Session switched to: {session_id}");
                print_greeting(state, session_id);
            }
            None => match state.sessions.get(session_id) {
                Some(s) => eprintln!(
                    "Session {}: {} turn(s), phase {}, risk {}, root cause {}",
                    s.session_id, s.turn_count, s.phase, s.risk_score, s.root_cause
                ),
                None => eprintln!("Current session: {session_id}"),
            },
        },

        "/end" => {
            if let Some(s) = state.sessions.remove(session_id) {
                eprintln!(
                    "Session {} ended after {} turn(s).",
                    s.session_id, s.turn_count
                );
            }
            *session_id = state.sessions.open(None);
            eprintln!("New session: {session_id}");
            print_greeting(state, session_id);
        }

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /session         Show the current session state");
            eprintln!("  /session <id>    Switch to (or create) a session");
            eprintln!("  /end             End this session and start a new one");
            eprintln!("  /exit, /quit     Exit the chat");
            eprintln!("  /help            Show this help");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }

    false
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message sending + event streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn send_message(state: &AppState, session_id: &str, message: &str) -> anyhow::Result<()> {
    let mut handle = state
        .orchestrator
        .submit(TurnInput {
            session_id: Some(session_id.to_owned()),
            message: message.to_owned(),
        })
        .await?;

    while let Some(event) = handle.events.recv().await {
        match &event {
            TurnEvent::AssistantDelta { text } => {
                print!("{text}");
                std::io::stdout().flush().ok();
            }
            TurnEvent::Final { result } => {
                println!();
                if result.action.is_escalation() {
                    eprintln!(
                        "\x1B[33m[{}] If you are in danger, please reach out to someone you trust or a local helpline.\x1B[0m",
                        result.action
                    );
                }
                if let Some(m) = &result.peer_match {
                    eprintln!(
                        "\x1B[2m[someone who went through something similar is available: {}]\x1B[0m",
                        m.peer_id
                    );
                }
                println!();
            }
            TurnEvent::Error { message } => {
                eprintln!("\x1B[31merror: {message}\x1B[0m");
            }
            TurnEvent::Stopped { .. } => {
                eprintln!("(turn stopped)");
            }
        }
    }

    Ok(())
}
