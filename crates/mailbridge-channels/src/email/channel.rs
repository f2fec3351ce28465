//! Email channel wiring: configuration, MCP client, store and mailbox.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use mailbridge_services::mcp::{McpClient, ServerInfo, ToolCaller};
use mailbridge_types::EmailChannelConfig;

use super::mailbox::Mailbox;
use super::poller::EmailPoller;
use super::store::ProcessedStore;
use crate::error::Result;

/// The email channel: one worker client plus the mailbox operations on
/// top of it.
#[derive(Debug)]
pub struct EmailChannel {
    config: EmailChannelConfig,
    client: Arc<McpClient>,
    mailbox: Arc<Mailbox>,
}

impl EmailChannel {
    /// Validate `config` and build a channel whose worker is spawned from
    /// `config.worker`. Nothing is spawned until first use.
    pub fn new(config: EmailChannelConfig, store: Arc<dyn ProcessedStore>) -> Result<Self> {
        let client = Arc::new(McpClient::new(config.worker.clone()));
        Self::with_client(config, client, store)
    }

    /// Like [`new`](Self::new) with a preconfigured client.
    pub fn with_client(
        config: EmailChannelConfig,
        client: Arc<McpClient>,
        store: Arc<dyn ProcessedStore>,
    ) -> Result<Self> {
        config.validate()?;
        let caller: Arc<dyn ToolCaller> = client.clone();
        let mailbox = Arc::new(Mailbox::new(&config, caller, store));
        Ok(Self {
            config,
            client,
            mailbox,
        })
    }

    pub fn config(&self) -> &EmailChannelConfig {
        &self.config
    }

    /// Mailbox operations (search, read, reply, trigger and context keys).
    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    /// Spawn the worker and complete its handshake ahead of first use.
    pub async fn start(&self) -> Result<()> {
        self.client.start().await?;
        if let Some(server) = self.client.server_info().await {
            info!(server = %server.name, version = %server.version, "email channel started");
        }
        Ok(())
    }

    /// Stop the worker.
    pub async fn stop(&self) {
        self.client.stop().await;
        info!("email channel stopped");
    }

    /// Handshake details of the running worker.
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.client.server_info().await
    }

    /// A poller over this channel's mailbox at the configured interval.
    pub fn poller(&self) -> EmailPoller {
        EmailPoller::new(
            Arc::clone(&self.mailbox),
            Duration::from_secs(self.config.poll_interval_secs),
        )
    }
}
