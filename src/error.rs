use std::path::PathBuf;

/// Failure of a single request/response call against the chat backend.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("not authenticated")]
    Unauthorized,

    #[error("invalid response: {0}")]
    Decode(String),
}

/// Conversation history could not be loaded.
#[derive(Debug, thiserror::Error)]
#[error("could not load messages: {0}")]
pub struct FetchError(#[from] pub ApiError);

/// A message was not accepted by the server.
#[derive(Debug, thiserror::Error)]
#[error("message not sent: {0}")]
pub struct SendError(#[from] pub ApiError);

/// Login, register or logout failed.
#[derive(Debug, thiserror::Error)]
#[error("authentication failed: {0}")]
pub struct AuthError(#[from] pub ApiError);

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("could not connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("channel closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session format: {0}")]
    Format(#[from] serde_json::Error),

    #[error("no configuration directory available")]
    NoConfigDir,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
