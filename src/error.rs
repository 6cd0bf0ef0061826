//! Error types for tgrelay

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tgrelay
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be read, parsed or written
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration was loaded but is not usable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Telegram client failure outside of a single RPC (connect, auth, resolve)
    #[error("Telegram client error: {0}")]
    TelegramClient(String),

    /// The user session exists but has not been signed in
    #[error("Telegram authentication required (run 'tgrelay auth')")]
    TelegramAuthRequired,

    /// A Telegram RPC call failed
    #[error("Telegram request failed: {0}")]
    Invocation(#[from] grammers_mtsender::InvocationError),

    /// The storage channel has no usable copy of the file
    #[error("Stored file not found: {0}")]
    NotFound(String),

    /// Every download slot stayed taken for too long
    #[error("Too many downloads in progress: {0}")]
    Busy(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Invocation(grammers_mtsender::InvocationError::Rpc(rpc)) => {
                // Flood waits and server-side hiccups; anything else is a bad request
                rpc.name.starts_with("FLOOD_WAIT") || rpc.code >= 500
            }
            Error::Invocation(_) | Error::Io(_) => true,
            _ => false,
        }
    }

    /// Whether this error means the connection to Telegram itself is gone,
    /// as opposed to a single request being refused
    pub fn is_connection_loss(&self) -> bool {
        match self {
            Error::Invocation(e) => invocation_lost_connection(e),
            Error::Io(_) => true,
            _ => false,
        }
    }
}

/// Anything but an RPC answer means the request never got a reply
pub(crate) fn invocation_lost_connection(e: &grammers_mtsender::InvocationError) -> bool {
    !matches!(e, grammers_mtsender::InvocationError::Rpc(_))
}
