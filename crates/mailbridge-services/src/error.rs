//! Service error types.

use thiserror::Error;

/// Errors produced by the MCP worker client.
///
/// Malformed worker output never shows up here: the framer drops it
/// locally. Everything below reaches the immediate caller of
/// [`McpClient::call_tool`](crate::mcp::McpClient::call_tool).
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The worker is not running or its stdin is not writable.
    #[error("mcp transport error: {0}")]
    Transport(String),

    /// No response arrived within the call deadline.
    #[error("mcp request timed out after {secs}s (method: {method})")]
    Timeout {
        /// Method of the request that timed out.
        method: String,
        /// Deadline that elapsed, in whole seconds.
        secs: u64,
    },

    /// The worker answered with an explicit JSON-RPC error object.
    #[error("mcp protocol error: code={code}, message={message}")]
    Protocol {
        /// JSON-RPC error code.
        code: i64,
        /// Worker-supplied error message.
        message: String,
    },

    /// The worker exited while the call was outstanding.
    #[error("mcp worker exited (code: {})", display_code(.code))]
    Terminated {
        /// Process exit code, if the process reported one.
        code: Option<i32>,
    },

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none".into(),
    }
}

impl ServiceError {
    /// Whether the failure came from the worker process going away or
    /// never being reachable, so that a fresh `start()` may help.
    pub fn is_worker_failure(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Terminated { .. })
    }
}

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, ServiceError>;
