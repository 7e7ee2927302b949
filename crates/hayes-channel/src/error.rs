//! Error types for the command channel

use thiserror::Error;

/// Errors that can occur on the command channel
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Unclassified channel failure
    #[error("channel error: {0}")]
    Generic(String),

    /// A command exchange is already in flight
    #[error("another command is already pending")]
    CommandPending,

    /// The transport closed underneath the channel
    #[error("channel closed")]
    Closed,

    /// No terminal line arrived within the bound
    #[error("command timed out after {0}ms")]
    Timeout(u64),

    /// `submit` was called from the reader task, which would deadlock
    #[error("cannot submit a command from the reader task")]
    ReaderContext,

    /// The response did not match the declared command shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// I/O error on the transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
}
