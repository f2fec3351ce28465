//! CLI command implementations for `mailbridge`.
//!
//! - [`mailbox`] -- One-shot `search`, `read` and `reply`.
//! - [`poll`] -- Long-running poll loop.

pub mod mailbox;
pub mod poll;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use mailbridge_channels::{EmailChannel, MemoryProcessedStore};
use mailbridge_types::{EmailChannelConfig, TriggerMode};

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub trigger_mode: Option<TriggerMode>,
    pub trigger_value: Option<String>,
}

/// `~/.mailbridge/config.json`, if a home directory is known.
fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".mailbridge").join("config.json"))
}

/// Load the channel configuration.
///
/// Uses `path` when given (it must exist), else the default location when
/// a file exists there, else built-in defaults. Overrides are applied
/// before validation.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<EmailChannelConfig> {
    let file = match path {
        Some(p) => {
            if !p.exists() {
                anyhow::bail!("config file not found: {}", p.display());
            }
            Some(p.to_path_buf())
        }
        None => default_config_path().filter(|p| p.exists()),
    };

    let mut config = match &file {
        Some(p) => {
            let raw = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read config {}", p.display()))?;
            serde_json::from_str::<EmailChannelConfig>(&raw)
                .with_context(|| format!("failed to parse config {}", p.display()))?
        }
        None => EmailChannelConfig::default(),
    };

    if let Some(mode) = overrides.trigger_mode {
        config.trigger.mode = mode;
    }
    if let Some(value) = &overrides.trigger_value {
        config.trigger.value = value.clone();
    }

    config.validate().context("invalid configuration")?;
    tracing::debug!(
        path = ?file,
        trigger_mode = ?config.trigger.mode,
        trigger_value = %config.trigger.value,
        "configuration loaded"
    );
    Ok(config)
}

/// Build a channel with an in-memory processed store.
pub fn build_channel(config: EmailChannelConfig) -> anyhow::Result<EmailChannel> {
    let store = Arc::new(MemoryProcessedStore::new());
    Ok(EmailChannel::new(config, store)?)
}

/// `mailbridge info`: start the worker and print its handshake details.
pub async fn info(config: EmailChannelConfig) -> anyhow::Result<()> {
    let command = config.worker.command.clone();
    let channel = build_channel(config)?;
    channel
        .start()
        .await
        .with_context(|| format!("failed to start worker `{command}`"))?;

    let server = channel.server_info().await.unwrap_or_default();
    println!("worker:   {command}");
    println!("server:   {} {}", server.name, server.version);
    println!("protocol: {}", server.protocol_version);

    channel.stop().await;
    Ok(())
}
