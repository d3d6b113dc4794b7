//! Error taxonomy for strongbox operations

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the client core
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed path expression or segment text
    #[error("Parse error: {0}")]
    Parse(String),

    /// Well-formed input that is not allowed here
    #[error("{0}")]
    Validation(String),

    /// A lookup matched nothing, or more than one thing
    #[error("{0}")]
    NotFound(String),

    /// An envelope or body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The dispatcher or the remote side failed, including cancellation
    #[error("Transport error: {0}")]
    Transport(String),

    /// Bad command-line argument shape
    #[error("{0}")]
    Usage(String),
}

impl Error {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
