//! Worker process supervision.
//!
//! [`WorkerSupervisor`] owns one worker at a time. It spawns the worker,
//! wires stdout into a [`LineFramer`] feeding the [`Correlator`], forwards
//! stderr to the log, runs the `initialize` handshake and notices when the
//! worker exits on its own.
//!
//! # States
//!
//! ```text
//! Stopped ──start()──> Starting ──initialize ok──> Ready
//!    ^                     │                         │
//!    └──── stop() / handshake failure / exit ────────┘
//! ```
//!
//! An unexpected exit fails every outstanding call with
//! [`ServiceError::Terminated`]. The supervisor never restarts the worker
//! by itself; the next `start()` spawns a fresh one.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mailbridge_types::WorkerConfig;

use super::correlator::Correlator;
use super::framing::LineFramer;
use super::types::{InboundMessage, JsonRpcNotification, JsonRpcRequest};
use super::worker::{WorkerChild, WorkerReader, WorkerSpawner, WorkerWriter};
use crate::error::{Result, ServiceError};

/// How long to wait for the process to exit after its stdout closed.
const EXIT_WAIT: Duration = Duration::from_secs(2);

/// Read buffer size for worker stdout.
const READ_CHUNK: usize = 8 * 1024;

/// Worker stdin, locked on its own so a slow write never holds the slot.
type SharedWriter = Arc<Mutex<WorkerWriter>>;

/// Lifecycle state of the worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// No worker process.
    Stopped,
    /// Spawned, handshake in progress.
    Starting,
    /// Handshake complete; tool calls accepted.
    Ready,
}

/// Server identification returned from the `initialize` handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    #[serde(default)]
    pub name: String,
    /// Server version.
    #[serde(default)]
    pub version: String,
    /// Protocol version the server answered with.
    #[serde(default)]
    pub protocol_version: String,
}

/// Mutable worker resources, guarded together so that state changes,
/// request registration and mass rejection are ordered with respect to
/// each other.
struct WorkerSlot {
    state: WorkerState,
    /// Bumped on every spawn and every stop; background tasks carry the
    /// generation they were started for and ignore a mismatch.
    generation: u64,
    stdin: Option<SharedWriter>,
    child: Option<Box<dyn WorkerChild>>,
    tasks: Vec<JoinHandle<()>>,
    server: Option<ServerInfo>,
    /// Cancelled when this generation's worker goes away; aborts writes
    /// blocked on its stdin.
    closed: CancellationToken,
}

impl WorkerSlot {
    fn stopped() -> Self {
        Self {
            state: WorkerState::Stopped,
            generation: 0,
            stdin: None,
            child: None,
            tasks: Vec::new(),
            server: None,
            closed: CancellationToken::new(),
        }
    }

    /// Drop the worker's stdin and release writers blocked on it.
    fn close(&mut self) {
        self.closed.cancel();
        self.stdin = None;
        self.server = None;
    }
}

/// Owns the worker subprocess and its streams.
pub struct WorkerSupervisor {
    config: WorkerConfig,
    spawner: Arc<dyn WorkerSpawner>,
    correlator: Arc<Correlator>,
    slot: Arc<Mutex<WorkerSlot>>,
    /// Serializes `start()` so concurrent first calls share one handshake.
    start_gate: Mutex<()>,
}

impl std::fmt::Debug for WorkerSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSupervisor")
            .field("command", &self.config.command)
            .field("correlator", &self.correlator)
            .finish_non_exhaustive()
    }
}

impl WorkerSupervisor {
    /// Create a supervisor; no process is spawned until [`start`](Self::start).
    pub fn new(config: WorkerConfig, spawner: Arc<dyn WorkerSpawner>) -> Self {
        let correlator = Arc::new(Correlator::new(config.request_timeout()));
        Self {
            config,
            spawner,
            correlator,
            slot: Arc::new(Mutex::new(WorkerSlot::stopped())),
            start_gate: Mutex::new(()),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WorkerState {
        self.slot.lock().await.state
    }

    /// Server info from the last successful handshake, while running.
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.slot.lock().await.server.clone()
    }

    /// Number of calls awaiting a response.
    pub async fn outstanding_calls(&self) -> usize {
        self.correlator.outstanding().await
    }

    /// Spawn the worker and complete the handshake, unless it is already
    /// ready. Concurrent callers wait for the same handshake.
    pub async fn start(&self) -> Result<()> {
        let _gate = self.start_gate.lock().await;
        if self.state().await == WorkerState::Ready {
            return Ok(());
        }

        let io = self.spawner.spawn()?;
        let generation = {
            let mut slot = self.slot.lock().await;
            for task in slot.tasks.drain(..) {
                task.abort();
            }
            slot.close();
            slot.generation += 1;
            slot.state = WorkerState::Starting;
            slot.stdin = Some(Arc::new(Mutex::new(io.stdin)));
            slot.child = Some(io.child);
            slot.closed = CancellationToken::new();

            let generation = slot.generation;
            let reader = StdoutPump {
                slot: Arc::clone(&self.slot),
                correlator: Arc::clone(&self.correlator),
                generation,
                max_record_bytes: self.config.max_record_bytes,
                stall_after: self.correlator.timeout(),
            };
            slot.tasks.push(tokio::spawn(reader.run(io.stdout)));
            if let Some(stderr) = io.stderr {
                slot.tasks
                    .push(tokio::spawn(drain_stderr(stderr, self.config.clone())));
            }
            generation
        };
        info!(command = %self.config.command, generation, "mcp worker spawned");

        let server = match self.handshake().await {
            Ok(server) => server,
            Err(e) => {
                warn!(error = %e, "mcp worker handshake failed");
                self.stop().await;
                return Err(e);
            }
        };

        let mut slot = self.slot.lock().await;
        if slot.generation != generation || slot.state != WorkerState::Starting {
            return Err(ServiceError::Transport(
                "worker stopped during handshake".into(),
            ));
        }
        info!(
            server = %server.name,
            version = %server.version,
            protocol = %server.protocol_version,
            "mcp worker ready"
        );
        slot.state = WorkerState::Ready;
        slot.server = Some(server);
        Ok(())
    }

    /// Terminate the worker and reset to [`WorkerState::Stopped`].
    ///
    /// Idempotent. Calls still outstanding fail with a termination error.
    pub async fn stop(&self) {
        let child = {
            let mut slot = self.slot.lock().await;
            let was_running = slot.state != WorkerState::Stopped;
            slot.generation += 1;
            slot.state = WorkerState::Stopped;
            slot.close();
            for task in slot.tasks.drain(..) {
                task.abort();
            }
            let failed = self.correlator.fail_all(None).await;
            if failed > 0 {
                debug!(failed, "failed outstanding calls on stop");
            }
            if was_running {
                info!("mcp worker stopped");
            }
            slot.child.take()
        };

        if let Some(mut child) = child {
            if let Err(e) = child.kill().await {
                debug!(error = %e, "failed to kill mcp worker (already exited?)");
            }
        }
    }

    /// Send a request and wait for its response.
    ///
    /// Fails immediately with [`ServiceError::Transport`] when no worker
    /// is running or its stdin is not writable.
    pub async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let (handle, stdin, closed) = {
            let slot = self.slot.lock().await;
            if slot.state == WorkerState::Stopped {
                return Err(ServiceError::Transport("worker not running".into()));
            }
            let Some(stdin) = slot.stdin.clone() else {
                return Err(ServiceError::Transport("worker stdin not available".into()));
            };
            // Registered under the slot lock so stop() and exit handling
            // see the call when they fail everything outstanding.
            let handle = self.correlator.register(method).await;
            (handle, stdin, slot.closed.clone())
        };

        let request = JsonRpcRequest::new(handle.id(), method, params);
        match self.write_line(&stdin, &closed, &request).await {
            // Worker went away mid-write; the pending call was already failed.
            Ok(false) => {}
            Ok(true) => debug!(method = %method, id = handle.id(), "sent worker request"),
            Err(e) => {
                self.correlator.cancel(handle.id()).await;
                return Err(e);
            }
        }

        self.correlator.wait(handle).await
    }

    /// Send a fire-and-forget notification.
    pub async fn notify(&self, method: &str) -> Result<()> {
        let (stdin, closed) = {
            let slot = self.slot.lock().await;
            match slot.stdin.clone() {
                Some(stdin) => (stdin, slot.closed.clone()),
                None => return Err(ServiceError::Transport("worker not running".into())),
            }
        };
        if !self
            .write_line(&stdin, &closed, &JsonRpcNotification::new(method))
            .await?
        {
            return Err(ServiceError::Transport("worker stopped".into()));
        }
        debug!(method = %method, "sent worker notification");
        Ok(())
    }

    /// Write one record to the worker, bounded by the call deadline.
    ///
    /// Returns `Ok(false)` when the worker was stopped or exited before
    /// the record went out.
    async fn write_line<T: Serialize>(
        &self,
        stdin: &SharedWriter,
        closed: &CancellationToken,
        message: &T,
    ) -> Result<bool> {
        let write = async {
            let mut stdin = stdin.lock().await;
            write_json_line(&mut *stdin, message).await
        };
        tokio::select! {
            _ = closed.cancelled() => Ok(false),
            written = tokio::time::timeout(self.correlator.timeout(), write) => match written {
                Ok(result) => result.map(|()| true),
                Err(_) => Err(ServiceError::Transport("timed out writing to stdin".into())),
            },
        }
    }

    async fn handshake(&self) -> Result<ServerInfo> {
        let result = self
            .request(
                "initialize",
                serde_json::json!({
                    "protocolVersion": self.config.protocol_version,
                    "capabilities": {},
                    "clientInfo": {
                        "name": self.config.client_name,
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )
            .await?;

        let mut server: ServerInfo =
            serde_json::from_value(result.get("serverInfo").cloned().unwrap_or_default())
                .unwrap_or_default();
        server.protocol_version = result
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.config.protocol_version)
            .to_string();

        self.notify("notifications/initialized").await?;
        Ok(server)
    }
}

impl Drop for WorkerSupervisor {
    fn drop(&mut self) {
        // Background tasks hold the slot; release them so the child
        // (spawned with kill_on_drop) is dropped too.
        if let Ok(mut slot) = self.slot.try_lock() {
            for task in slot.tasks.drain(..) {
                task.abort();
            }
            slot.close();
            slot.child = None;
        }
    }
}

async fn write_json_line<T: Serialize>(stdin: &mut WorkerWriter, message: &T) -> Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| ServiceError::Transport(format!("failed to write to stdin: {e}")))?;
    stdin
        .flush()
        .await
        .map_err(|e| ServiceError::Transport(format!("failed to flush stdin: {e}")))
}

/// Why the stdout pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Eof,
    ReadError,
    Overflow,
}

/// Background task turning worker stdout into resolved calls.
struct StdoutPump {
    slot: Arc<Mutex<WorkerSlot>>,
    correlator: Arc<Correlator>,
    generation: u64,
    max_record_bytes: usize,
    stall_after: Duration,
}

impl StdoutPump {
    async fn run(self, mut stdout: WorkerReader) {
        let mut framer = LineFramer::new(self.max_record_bytes);
        let mut buf = vec![0u8; READ_CHUNK];

        let end = loop {
            let read = match tokio::time::timeout(self.stall_after, stdout.read(&mut buf)).await {
                Ok(read) => read,
                Err(_) => {
                    if let Some(age) = framer.partial_age().filter(|age| *age >= self.stall_after) {
                        warn!(
                            bytes = framer.pending_bytes(),
                            waited_secs = age.as_secs(),
                            "worker stalled mid-record"
                        );
                    }
                    continue;
                }
            };

            match read {
                Ok(0) => break StreamEnd::Eof,
                Ok(n) => {
                    let batch = framer.push(&buf[..n]);
                    for msg in batch.messages {
                        self.dispatch(msg).await;
                    }
                    if batch.overflow.is_some() {
                        break StreamEnd::Overflow;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "worker stdout read failed");
                    break StreamEnd::ReadError;
                }
            }
        };

        if framer.pending_bytes() > 0 {
            debug!(
                bytes = framer.pending_bytes(),
                "discarding unterminated worker output"
            );
        }
        self.handle_exit(end).await;
    }

    async fn dispatch(&self, msg: InboundMessage) {
        match msg {
            InboundMessage::Response(response) => {
                self.correlator.resolve(response).await;
            }
            InboundMessage::Notification { method } => {
                debug!(method = %method, "worker notification");
            }
            InboundMessage::Request { method } => {
                debug!(method = %method, "ignoring worker-initiated request");
            }
        }
    }

    async fn handle_exit(&self, end: StreamEnd) {
        let child = {
            let mut slot = self.slot.lock().await;
            if slot.generation != self.generation {
                return;
            }
            slot.child.take()
        };

        let code = match child {
            Some(mut child) => {
                if end != StreamEnd::Eof {
                    // Protocol violation or broken pipe: do not trust the
                    // worker any further.
                    let _ = child.kill().await;
                }
                match tokio::time::timeout(EXIT_WAIT, child.wait()).await {
                    Ok(Ok(code)) => code,
                    Ok(Err(e)) => {
                        warn!(error = %e, "failed to collect worker exit status");
                        None
                    }
                    Err(_) => {
                        warn!("worker closed stdout but kept running, killing");
                        let _ = child.kill().await;
                        None
                    }
                }
            }
            None => None,
        };

        let mut slot = self.slot.lock().await;
        if slot.generation != self.generation {
            return;
        }
        slot.state = WorkerState::Stopped;
        slot.close();
        warn!(code = ?code, reason = ?end, "mcp worker exited");
        let failed = self.correlator.fail_all(code).await;
        if failed > 0 {
            warn!(failed, "failed outstanding calls after worker exit");
        }
    }
}

async fn drain_stderr(stderr: WorkerReader, config: WorkerConfig) {
    let mut reader = BufReader::new(stderr);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim();
                if line.is_empty() || config.is_ignored_stderr(line) {
                    continue;
                }
                debug!(target: "mailbridge::worker", "{line}");
            }
            Err(e) => {
                debug!(error = %e, "worker stderr read failed");
                break;
            }
        }
    }
}
