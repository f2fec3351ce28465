//! Configuration schema for the email channel.
//!
//! All structs deserialize from JSON with `snake_case` field names and
//! accept `camelCase` aliases. Every field has a default, so an empty
//! object (`{}`) is a valid configuration.

mod worker;

pub use worker::WorkerConfig;

use serde::{Deserialize, Serialize};

use crate::error::{MailbridgeError, Result};

/// How inbound mail is selected for processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Mail carrying a given label.
    #[default]
    Label,
    /// Mail sent to a given recipient address.
    Address,
    /// Mail whose subject starts with a given prefix.
    Subject,
}

/// Trigger selecting which mail the agent acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Matching mode.
    #[serde(default)]
    pub mode: TriggerMode,

    /// Label name, recipient address or subject prefix, depending on `mode`.
    #[serde(default = "default_trigger_value")]
    pub value: String,
}

fn default_trigger_value() -> String {
    "nanoclaw".into()
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            mode: TriggerMode::default(),
            value: default_trigger_value(),
        }
    }
}

/// How envelopes are grouped into conversation contexts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    /// One context per mail thread.
    #[default]
    Thread,
    /// One context per sender.
    Sender,
    /// A single shared context.
    Single,
}

/// Email channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailChannelConfig {
    /// Whether this channel is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Which mail to act on.
    #[serde(default)]
    pub trigger: TriggerConfig,

    /// Conversation grouping mode.
    #[serde(default, alias = "contextMode")]
    pub context_mode: ContextMode,

    /// Result cap passed to each search call.
    #[serde(default = "default_max_results", alias = "maxResults")]
    pub max_results: u32,

    /// Polling interval in seconds.
    #[serde(default = "default_poll_interval", alias = "pollIntervalSecs")]
    pub poll_interval_secs: u64,

    /// Mail worker process settings.
    #[serde(default)]
    pub worker: WorkerConfig,
}

fn default_max_results() -> u32 {
    10
}
fn default_poll_interval() -> u64 {
    60
}

impl Default for EmailChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger: TriggerConfig::default(),
            context_mode: ContextMode::default(),
            max_results: default_max_results(),
            poll_interval_secs: default_poll_interval(),
            worker: WorkerConfig::default(),
        }
    }
}

impl EmailChannelConfig {
    /// Parse a configuration from a JSON string and validate it.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot drive a working channel.
    pub fn validate(&self) -> Result<()> {
        if self.trigger.value.trim().is_empty() {
            return Err(MailbridgeError::config("trigger value is empty"));
        }
        if self.max_results == 0 {
            return Err(MailbridgeError::config("max_results must be at least 1"));
        }
        if self.poll_interval_secs == 0 {
            return Err(MailbridgeError::config(
                "poll_interval_secs must be at least 1",
            ));
        }
        self.worker.validate()
    }
}
