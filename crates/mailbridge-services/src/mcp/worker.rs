//! Worker process spawning.
//!
//! [`WorkerSpawner`] produces the byte streams and lifecycle handle of one
//! worker instance. [`CommandSpawner`] launches the configured command as
//! a child process with piped stdio; tests substitute in-memory pipes.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::debug;

use mailbridge_types::WorkerConfig;

use crate::error::{Result, ServiceError};

/// Writable end of the worker's stdin.
pub type WorkerWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Readable end of the worker's stdout or stderr.
pub type WorkerReader = Pin<Box<dyn AsyncRead + Send>>;

/// Lifecycle handle of a running worker.
#[async_trait]
pub trait WorkerChild: Send {
    /// Wait for the worker to exit and return its exit code, if any.
    async fn wait(&mut self) -> std::io::Result<Option<i32>>;

    /// Forcefully terminate the worker.
    async fn kill(&mut self) -> std::io::Result<()>;
}

/// Streams and handle of one freshly spawned worker.
pub struct WorkerIo {
    /// Worker stdin (requests and notifications go here).
    pub stdin: WorkerWriter,
    /// Worker stdout (newline-delimited JSON-RPC messages).
    pub stdout: WorkerReader,
    /// Worker stderr (diagnostics), if captured.
    pub stderr: Option<WorkerReader>,
    /// Process handle.
    pub child: Box<dyn WorkerChild>,
}

impl std::fmt::Debug for WorkerIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerIo")
            .field("stderr", &self.stderr.is_some())
            .finish_non_exhaustive()
    }
}

/// Launches worker instances.
pub trait WorkerSpawner: Send + Sync {
    /// Spawn a new worker. Called once per `start()`.
    fn spawn(&self) -> Result<WorkerIo>;
}

/// Spawns the worker as a child process.
#[derive(Debug, Clone)]
pub struct CommandSpawner {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl CommandSpawner {
    /// Build a spawner for the command described by `config`.
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
        }
    }
}

impl WorkerSpawner for CommandSpawner {
    fn spawn(&self) -> Result<WorkerIo> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ServiceError::Transport(format!("failed to spawn {}: {e}", self.command))
        })?;
        debug!(command = %self.command, pid = ?child.id(), "spawned mcp worker");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ServiceError::Transport("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ServiceError::Transport("failed to capture stdout".into()))?;
        let stderr = child.stderr.take();

        Ok(WorkerIo {
            stdin: Box::pin(stdin),
            stdout: Box::pin(stdout),
            stderr: stderr.map(|s| Box::pin(s) as WorkerReader),
            child: Box::new(ProcessChild(child)),
        })
    }
}

struct ProcessChild(Child);

#[async_trait]
impl WorkerChild for ProcessChild {
    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        self.0.wait().await.map(|status| status.code())
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.0.kill().await
    }
}
