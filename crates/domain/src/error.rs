/// Error type shared by the Kalpana crates.
///
/// Classifier and matcher failures never surface as errors to callers;
/// they are absorbed into fallbacks where they happen.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    /// The peers file is unreadable or holds an invalid record.
    #[error("peers file {path}: {message}")]
    Peers { path: String, message: String },

    #[error("turn log: {0}")]
    TurnLog(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
