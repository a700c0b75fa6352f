//! Error types for the chat relay
//!
//! Defines relay-level errors and broadcaster send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Relay-level errors
///
/// Bind failures are fatal at startup. Everything else is scoped to a
/// single session and only ends that session.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Listener could not be bound (fatal)
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Socket IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error (over-long line, invalid UTF-8)
    #[error("line framing error: {0}")]
    Lines(#[from] LinesCodecError),

    /// Broadcaster loop is gone
    #[error("broadcaster closed")]
    BroadcasterClosed,
}

/// Broadcaster send errors
///
/// Occurs when submitting a command after the broadcaster loop has exited.
#[derive(Debug, Error)]
pub enum SendError {
    /// The broadcaster's command channel has been closed
    #[error("broadcaster closed")]
    BroadcasterClosed,
}

impl From<SendError> for RelayError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::BroadcasterClosed => RelayError::BroadcasterClosed,
        }
    }
}
