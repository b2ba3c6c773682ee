pub mod chat;
pub mod config;
pub mod run;

use clap::{Parser, Subcommand};

/// Kalpana: a listening companion with background risk triage.
#[derive(Debug, Parser)]
#[command(name = "kalpana", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP server (default when no subcommand is given).
    Serve,
    /// Interactive chat session in the terminal.
    Chat {
        /// Continue an existing session id instead of starting a new one.
        #[arg(long)]
        session: Option<String>,
    },
    /// Send a single message and print the response.
    Run {
        /// The message to send.
        message: String,
        /// Session id (a new session is created when omitted).
        #[arg(long)]
        session: Option<String>,
        /// Output every turn event as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `KP_CONFIG` (or
/// `config.toml` by default). Returns the parsed [`Config`] and the
/// path that was used. A missing file yields the defaults.
///
/// [`Config`]: kp_domain::config::Config
pub fn load_config() -> anyhow::Result<(kp_domain::config::Config, String)> {
    let config_path = std::env::var("KP_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(std::path::Path::new(&config_path))?;
    Ok((config, config_path))
}

pub fn load_config_from(path: &std::path::Path) -> anyhow::Result<kp_domain::config::Config> {
    if !path.exists() {
        return Ok(kp_domain::config::Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_config_from(std::path::Path::new("/no/such/kalpana.toml")).unwrap();
        assert_eq!(cfg.server.port, 3210);
    }

    #[test]
    fn file_overrides_are_applied() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[triage]\nescalation_target = \"tele_manas\"").unwrap();
        let cfg = load_config_from(file.path()).unwrap();
        assert_eq!(
            cfg.triage.escalation_target,
            kp_domain::config::EscalationTarget::TeleManas
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        let err = load_config_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("parsing"));
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from(["kalpana", "run", "hello", "--session", "s1", "--json"])
            .unwrap();
        match cli.command {
            Some(Command::Run { message, session, json }) => {
                assert_eq!(message, "hello");
                assert_eq!(session.as_deref(), Some("s1"));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
