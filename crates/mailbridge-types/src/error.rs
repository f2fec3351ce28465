//! Error types for the mailbridge framework.
//!
//! [`MailbridgeError`] covers failures that happen before any worker
//! traffic: loading and validating configuration. Protocol and transport
//! failures live in `mailbridge-services`.

use thiserror::Error;

/// Top-level error type for configuration handling.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MailbridgeError {
    /// Configuration is malformed or semantically invalid.
    #[error("invalid config: {reason}")]
    ConfigInvalid {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MailbridgeError {
    /// Shorthand for [`MailbridgeError::ConfigInvalid`].
    pub fn config(reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            reason: reason.into(),
        }
    }
}

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, MailbridgeError>;
