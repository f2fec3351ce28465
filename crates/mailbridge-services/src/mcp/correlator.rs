//! Request-ID correlation for outstanding worker calls.
//!
//! [`Correlator`] hands out strictly increasing request IDs, keeps one
//! oneshot sender per outstanding call, and completes each call exactly
//! once: by the matching response, by its deadline, or by the worker
//! going away. Whichever happens first removes the entry, so later
//! attempts to complete the same ID are no-ops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::types::JsonRpcResponse;
use crate::error::{Result, ServiceError};

/// An outstanding call awaiting its response.
#[derive(Debug)]
struct PendingCall {
    method: String,
    created_at: Instant,
    tx: oneshot::Sender<Result<serde_json::Value>>,
}

/// Caller-side half of a registered call; consumed by [`Correlator::wait`].
#[derive(Debug)]
pub struct PendingHandle {
    id: u64,
    method: String,
    rx: oneshot::Receiver<Result<serde_json::Value>>,
}

impl PendingHandle {
    /// Request ID assigned to this call.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Pending-call registry keyed by request ID.
pub struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingCall>>,
    timeout: Duration,
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Correlator {
    /// Create a registry whose calls expire after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Per-call deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Allocate an ID and register a pending call for `method`.
    pub async fn register(&self, method: &str) -> PendingHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(
            id,
            PendingCall {
                method: method.to_string(),
                created_at: Instant::now(),
                tx,
            },
        );
        PendingHandle {
            id,
            method: method.to_string(),
            rx,
        }
    }

    /// Complete the call matching `response.id`.
    ///
    /// Returns `false` when no call with that ID is outstanding; such
    /// responses are dropped without touching any other call.
    pub async fn resolve(&self, response: JsonRpcResponse) -> bool {
        let Some(call) = self.pending.lock().await.remove(&response.id) else {
            debug!(id = response.id, "dropping response for unknown request id");
            return false;
        };

        debug!(
            id = response.id,
            method = %call.method,
            elapsed_ms = call.created_at.elapsed().as_millis() as u64,
            "worker response received"
        );

        let outcome = match response.error {
            Some(err) => Err(ServiceError::Protocol {
                code: err.code,
                message: err.message,
            }),
            None => Ok(response.result.unwrap_or(serde_json::Value::Null)),
        };
        // The caller may have stopped waiting; nothing to do then.
        let _ = call.tx.send(outcome);
        true
    }

    /// Forget a call without completing it (e.g. its request never made
    /// it onto the wire). Returns whether it was outstanding.
    pub async fn cancel(&self, id: u64) -> bool {
        self.pending.lock().await.remove(&id).is_some()
    }

    /// Fail every outstanding call with a termination error and clear
    /// the registry. Returns how many calls were failed.
    pub async fn fail_all(&self, code: Option<i32>) -> usize {
        let drained: Vec<(u64, PendingCall)> = self.pending.lock().await.drain().collect();
        let count = drained.len();
        for (id, call) in drained {
            debug!(id, method = %call.method, "failing call: worker exited");
            let _ = call.tx.send(Err(ServiceError::Terminated { code }));
        }
        count
    }

    /// Number of calls currently outstanding.
    pub async fn outstanding(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Wait for a registered call to complete, enforcing the deadline.
    pub async fn wait(&self, handle: PendingHandle) -> Result<serde_json::Value> {
        let PendingHandle { id, method, mut rx } = handle;

        match tokio::time::timeout(self.timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without a value: the registry itself went away.
            Ok(Err(_)) => Err(ServiceError::Terminated { code: None }),
            Err(_) => {
                if self.pending.lock().await.remove(&id).is_some() {
                    warn!(id, method = %method, "worker request timed out");
                    return Err(self.timeout_error(method));
                }
                // Completed at the same instant the deadline fired.
                match rx.try_recv() {
                    Ok(outcome) => outcome,
                    Err(_) => Err(self.timeout_error(method)),
                }
            }
        }
    }

    fn timeout_error(&self, method: String) -> ServiceError {
        ServiceError::Timeout {
            method,
            secs: self.timeout.as_secs(),
        }
    }
}
