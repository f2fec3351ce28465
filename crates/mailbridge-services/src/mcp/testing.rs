//! In-memory worker doubles for supervisor and client tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::{Mutex, mpsc, oneshot};

use super::worker::{WorkerChild, WorkerIo, WorkerReader, WorkerSpawner};
use crate::error::Result;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Spawner handing out duplex-backed workers; the test side of each one
/// is retrieved with [`FakeSpawner::next_worker`].
#[derive(Clone)]
pub(crate) struct FakeSpawner {
    tx: mpsc::UnboundedSender<FakeWorker>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<FakeWorker>>>,
    spawned: Arc<AtomicUsize>,
}

impl FakeSpawner {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            spawned: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Worker side of the next spawned process.
    pub(crate) async fn next_worker(&self) -> FakeWorker {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .expect("spawner dropped")
    }

    pub(crate) fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

impl WorkerSpawner for FakeSpawner {
    fn spawn(&self) -> Result<WorkerIo> {
        let (client_stdin, worker_stdin) = tokio::io::duplex(PIPE_CAPACITY);
        let (client_stdout, worker_stdout) = tokio::io::duplex(PIPE_CAPACITY);
        let (client_stderr, worker_stderr) = tokio::io::duplex(PIPE_CAPACITY);
        let (exit_tx, exit_rx) = oneshot::channel();
        let killed = Arc::new(AtomicBool::new(false));

        self.spawned.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send(FakeWorker {
            requests: BufReader::new(worker_stdin),
            responses: worker_stdout,
            stderr: worker_stderr,
            exit_tx: Some(exit_tx),
            killed: Arc::clone(&killed),
        });

        Ok(WorkerIo {
            stdin: Box::pin(client_stdin),
            stdout: Box::pin(client_stdout),
            stderr: Some(Box::pin(client_stderr) as WorkerReader),
            child: Box::new(FakeChild {
                exit_rx: Some(exit_rx),
                exited: None,
                killed,
            }),
        })
    }
}

struct FakeChild {
    exit_rx: Option<oneshot::Receiver<Option<i32>>>,
    exited: Option<Option<i32>>,
    killed: Arc<AtomicBool>,
}

#[async_trait]
impl WorkerChild for FakeChild {
    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        if let Some(code) = self.exited {
            return Ok(code);
        }
        if self.killed.load(Ordering::SeqCst) {
            self.exited = Some(None);
            return Ok(None);
        }
        let code = match self.exit_rx.take() {
            Some(rx) => rx.await.unwrap_or(None),
            None => None,
        };
        self.exited = Some(code);
        Ok(code)
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// The worker's end of the pipes.
pub(crate) struct FakeWorker {
    requests: BufReader<DuplexStream>,
    responses: DuplexStream,
    stderr: DuplexStream,
    exit_tx: Option<oneshot::Sender<Option<i32>>>,
    killed: Arc<AtomicBool>,
}

impl FakeWorker {
    /// Read the next line the client wrote and parse it as JSON.
    pub(crate) async fn read_message(&mut self) -> Value {
        let mut line = String::new();
        let n = self.requests.read_line(&mut line).await.expect("read stdin");
        assert!(n > 0, "client closed worker stdin");
        serde_json::from_str(&line).expect("client wrote invalid JSON")
    }

    /// Answer `initialize` and consume the `initialized` notification.
    pub(crate) async fn complete_handshake(&mut self) {
        let init = self.read_message().await;
        assert_eq!(init["method"], "initialize");
        let id = init["id"].as_u64().expect("initialize id");
        self.reply(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "fake-gmail", "version": "0.0.1"}
            }),
        )
        .await;
        let initialized = self.read_message().await;
        assert_eq!(initialized["method"], "notifications/initialized");
    }

    pub(crate) async fn reply(&mut self, id: u64, result: Value) {
        let line = json!({"jsonrpc": "2.0", "id": id, "result": result});
        self.write_line(&line).await;
    }

    pub(crate) async fn reply_error(&mut self, id: u64, code: i64, message: &str) {
        let line = json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message}
        });
        self.write_line(&line).await;
    }

    pub(crate) async fn write_raw(&mut self, bytes: &[u8]) {
        self.responses.write_all(bytes).await.expect("write stdout");
        self.responses.flush().await.expect("flush stdout");
    }

    pub(crate) async fn write_stderr(&mut self, line: &str) {
        self.stderr
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write stderr");
    }

    /// Exit with `code`, closing stdout.
    pub(crate) fn exit(mut self, code: Option<i32>) {
        if let Some(tx) = self.exit_tx.take() {
            let _ = tx.send(code);
        }
    }

    pub(crate) fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    async fn write_line(&mut self, value: &Value) {
        let mut line = serde_json::to_string(value).expect("serialize");
        line.push('\n');
        self.write_raw(line.as_bytes()).await;
    }
}
