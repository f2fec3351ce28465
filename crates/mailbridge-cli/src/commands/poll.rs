//! `mailbridge poll` -- print new mail as JSON lines until Ctrl-C.
//!
//! Each line is an object with the envelope fields plus `contextKey`.
//! Messages are remembered for the lifetime of the process only.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use mailbridge_channels::{EnvelopeHandler, Result};
use mailbridge_types::{EmailChannelConfig, MessageEnvelope};

use super::build_channel;

/// Writes each envelope to stdout.
struct PrintHandler;

#[async_trait]
impl EnvelopeHandler for PrintHandler {
    async fn handle(&self, envelope: &MessageEnvelope, context_key: &str) -> Result<()> {
        println!("{}", envelope_line(envelope, context_key));
        Ok(())
    }
}

fn envelope_line(envelope: &MessageEnvelope, context_key: &str) -> serde_json::Value {
    let mut line = serde_json::to_value(envelope).unwrap_or_default();
    if let Some(obj) = line.as_object_mut() {
        obj.insert("contextKey".into(), context_key.into());
    }
    line
}

pub async fn run(config: EmailChannelConfig) -> anyhow::Result<()> {
    let channel = build_channel(config)?;
    let poller = channel.poller();
    let cancel = CancellationToken::new();

    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { poller.run(Arc::new(PrintHandler), cancel).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, stopping");
    cancel.cancel();
    task.await?;
    Ok(())
}
