//! Error types for the telephony layer

use thiserror::Error;

/// Errors surfaced by modem operations
#[derive(Debug, Error)]
pub enum ModemError {
    /// The command channel failed underneath us
    #[error("channel error: {0}")]
    Channel(#[from] hayes_channel::ChannelError),

    /// A response line did not parse
    #[error("parse error: {0}")]
    Parse(#[from] hayes_protocol::ParseError),

    /// The radio is off, unavailable, or not far enough through power-up
    /// for this operation
    #[error("radio not available")]
    RadioNotAvailable,

    /// The modem answered with an error final
    #[error("command rejected: {0}")]
    Command(String),

    /// The modem answered, but not with anything we can use
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The requested operation is not supported in this configuration
    #[error("operation not supported")]
    NotSupported,

    /// The operation needs network registration that is not there
    #[error("not registered on a network")]
    NotRegistered,

    /// The data link layer failed
    #[error("link error: {0}")]
    Link(#[from] std::io::Error),
}
