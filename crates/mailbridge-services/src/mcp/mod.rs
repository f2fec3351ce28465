//! MCP (Model Context Protocol) client over a worker's stdio.
//!
//! [`McpClient`] is the entry point: it lazily spawns the worker through a
//! [`WorkerSupervisor`], then issues `tools/call` requests correlated by
//! [`Correlator`] over newline-delimited JSON framed by [`LineFramer`].

pub mod correlator;
pub mod framing;
pub mod supervisor;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use mailbridge_types::WorkerConfig;

use crate::error::Result;

pub use correlator::Correlator;
pub use framing::LineFramer;
pub use supervisor::{ServerInfo, WorkerState, WorkerSupervisor};
pub use worker::{CommandSpawner, WorkerSpawner};

/// Anything that can invoke a named tool with JSON arguments.
///
/// Mailbox operations depend on this rather than on [`McpClient`] so they
/// can be exercised against canned results.
#[async_trait]
pub trait ToolCaller: Send + Sync {
    /// Invoke `name` with `arguments` and return the raw `result` payload.
    async fn call_tool(&self, name: &str, arguments: serde_json::Value)
    -> Result<serde_json::Value>;

    /// Release whatever backs the caller. Default: nothing to release.
    async fn shutdown(&self) {}
}

/// Tool-calling client bound to one worker command.
pub struct McpClient {
    supervisor: WorkerSupervisor,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("supervisor", &self.supervisor)
            .finish()
    }
}

impl McpClient {
    /// Client that spawns `config.command` as its worker.
    pub fn new(config: WorkerConfig) -> Self {
        let spawner = Arc::new(CommandSpawner::new(&config));
        Self::with_spawner(config, spawner)
    }

    /// Client using a custom spawner.
    pub fn with_spawner(config: WorkerConfig, spawner: Arc<dyn WorkerSpawner>) -> Self {
        Self {
            supervisor: WorkerSupervisor::new(config, spawner),
        }
    }

    /// Start the worker and complete the handshake if not already running.
    pub async fn start(&self) -> Result<()> {
        self.supervisor.start().await
    }

    /// Stop the worker; outstanding calls fail.
    pub async fn stop(&self) {
        self.supervisor.stop().await
    }

    pub async fn state(&self) -> WorkerState {
        self.supervisor.state().await
    }

    /// What the worker reported about itself during the handshake.
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.supervisor.server_info().await
    }

    /// Call a tool, starting the worker first if needed.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.supervisor.start().await?;
        debug!(tool = %name, "calling worker tool");
        self.supervisor
            .request(
                "tools/call",
                serde_json::json!({
                    "name": name,
                    "arguments": arguments,
                }),
            )
            .await
    }
}

#[async_trait]
impl ToolCaller for McpClient {
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value> {
        McpClient::call_tool(self, name, arguments).await
    }

    async fn shutdown(&self) {
        self.stop().await
    }
}
