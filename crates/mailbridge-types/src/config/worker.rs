//! Mail worker process configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MailbridgeError, Result};

/// How to launch and talk to the external mail worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Command to spawn (e.g. `"gmail-mcp"`, `"npx"`).
    #[serde(default = "default_command")]
    pub command: String,

    /// Arguments for the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the worker.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Per-call response deadline in seconds.
    #[serde(default = "default_request_timeout", alias = "requestTimeoutSecs")]
    pub request_timeout_secs: u64,

    /// Protocol version announced in the `initialize` request.
    #[serde(default = "default_protocol_version", alias = "protocolVersion")]
    pub protocol_version: String,

    /// Client name announced in the `initialize` request.
    #[serde(default = "default_client_name", alias = "clientName")]
    pub client_name: String,

    /// Worker stderr lines containing any of these (case-insensitive)
    /// are dropped instead of logged.
    #[serde(default = "default_stderr_ignore", alias = "stderrIgnore")]
    pub stderr_ignore: Vec<String>,

    /// Upper bound on a single unterminated output record, in bytes.
    #[serde(default = "default_max_record_bytes", alias = "maxRecordBytes")]
    pub max_record_bytes: usize,
}

fn default_command() -> String {
    "gmail-mcp".into()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_protocol_version() -> String {
    "2024-11-05".into()
}
fn default_client_name() -> String {
    "mailbridge-email-channel".into()
}
fn default_stderr_ignore() -> Vec<String> {
    vec!["npm warn".into()]
}
fn default_max_record_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            env: HashMap::new(),
            request_timeout_secs: default_request_timeout(),
            protocol_version: default_protocol_version(),
            client_name: default_client_name(),
            stderr_ignore: default_stderr_ignore(),
            max_record_bytes: default_max_record_bytes(),
        }
    }
}

impl WorkerConfig {
    /// Per-call deadline as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether a stderr line is known benign noise.
    pub fn is_ignored_stderr(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.stderr_ignore
            .iter()
            .any(|pat| !pat.is_empty() && lower.contains(&pat.to_lowercase()))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(MailbridgeError::config("worker command is empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(MailbridgeError::config(
                "worker request_timeout_secs must be at least 1",
            ));
        }
        if self.max_record_bytes == 0 {
            return Err(MailbridgeError::config(
                "worker max_record_bytes must be at least 1",
            ));
        }
        Ok(())
    }
}
