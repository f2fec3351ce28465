//! Channel error types.

use mailbridge_services::error::ServiceError;
use mailbridge_types::MailbridgeError;
use thiserror::Error;

/// Errors surfaced by mailbox operations.
///
/// Read failures never appear here: a message that cannot be read is
/// skipped by the search that found it.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ChannelError {
    /// The worker call failed (transport, timeout, protocol, termination).
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The channel configuration was rejected.
    #[error(transparent)]
    Config(#[from] MailbridgeError),

    /// The tool ran but reported failure (`isError` in its result).
    #[error("tool {tool} failed: {message}")]
    ToolFailed {
        /// Tool name.
        tool: String,
        /// Text the tool returned with the failure.
        message: String,
    },

    /// Reply input that cannot be sent (e.g. no recipient address).
    #[error("invalid reply: {0}")]
    InvalidReply(String),
}

impl ChannelError {
    /// Whether the worker itself is gone or unreachable, as opposed to a
    /// call that reached it and failed.
    pub fn is_worker_failure(&self) -> bool {
        matches!(self, Self::Service(e) if e.is_worker_failure())
    }
}

/// Convenience alias for channel results.
pub type Result<T> = std::result::Result<T, ChannelError>;
