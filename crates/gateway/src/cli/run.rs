//! `kalpana run`: one-shot execution command.
//!
//! Sends a single message, streams the response to stdout and exits.
//! Useful for scripting and quick checks of a deployment.

use std::io::Write;
use std::sync::Arc;

use kp_domain::config::Config;

use crate::bootstrap;
use crate::runtime::{TurnEvent, TurnInput};

/// Execute a single turn and print the response.
pub async fn run(
    config: Arc<Config>,
    message: String,
    session_id: Option<String>,
    json_output: bool,
) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config).await?;

    let mut handle = state
        .orchestrator
        .submit(TurnInput {
            session_id,
            message,
        })
        .await?;

    let mut exit_code: i32 = 0;
    let mut collected_events: Vec<TurnEvent> = Vec::new();

    while let Some(event) = handle.events.recv().await {
        if json_output {
            if matches!(event, TurnEvent::Error { .. }) {
                exit_code = 1;
            }
            collected_events.push(event);
            continue;
        }
        match &event {
            TurnEvent::AssistantDelta { text } => {
                print!("{text}");
                std::io::stdout().flush().ok();
            }
            TurnEvent::Final { result } => {
                println!();
                eprintln!(
                    "\x1b[2m[session {} | turn {} | phase {} | action {} | risk {}]\x1b[0m",
                    result.session_id, result.turn, result.phase, result.action, result.risk_score
                );
                if let Some(m) = &result.peer_match {
                    eprintln!("\x1b[2m[peer match: {} ({:.2})]\x1b[0m", m.peer_id, m.score);
                }
            }
            TurnEvent::Error { message } => {
                eprintln!("error: {message}");
                exit_code = 1;
            }
            TurnEvent::Stopped { .. } => {
                eprintln!("turn stopped");
            }
        }
    }

    if json_output {
        let json = serde_json::to_string_pretty(&collected_events)
            .map_err(|e| anyhow::anyhow!("serializing events: {e}"))?;
        println!("{json}");
    }

    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}
