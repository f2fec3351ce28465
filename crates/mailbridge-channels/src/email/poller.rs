//! Periodic search loop delivering new mail to a handler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mailbridge_types::MessageEnvelope;

use super::mailbox::Mailbox;
use crate::error::Result;

/// Receives each new envelope found by the poller.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    /// Handle one envelope. `context_key` groups it with related mail.
    async fn handle(&self, envelope: &MessageEnvelope, context_key: &str) -> Result<()>;
}

/// Runs [`Mailbox::search_new_emails`] on an interval.
///
/// Every envelope is marked processed once its handler returns, whether
/// the handler succeeded or not, so a message is delivered at most once.
pub struct EmailPoller {
    mailbox: Arc<Mailbox>,
    interval: Duration,
}

impl EmailPoller {
    pub fn new(mailbox: Arc<Mailbox>, interval: Duration) -> Self {
        Self { mailbox, interval }
    }

    /// Poll until `cancel` fires, then stop the worker.
    ///
    /// The first poll happens immediately. A poll in progress when
    /// `cancel` fires is allowed to finish.
    pub async fn run(&self, handler: Arc<dyn EnvelopeHandler>, cancel: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "email poller starting"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.poll_once(handler.as_ref()).await;
        }

        info!("email poller shutting down");
        self.mailbox.shutdown().await;
    }

    /// One search-and-deliver pass. Returns how many envelopes were
    /// delivered; a failed search delivers none and is retried on the
    /// next pass.
    pub async fn poll_once(&self, handler: &dyn EnvelopeHandler) -> usize {
        let envelopes = match self.mailbox.search_new_emails().await {
            Ok(envelopes) => envelopes,
            Err(e) if e.is_worker_failure() => {
                // Drop whatever is left of the worker so the next pass
                // spawns a fresh one.
                warn!(error = %e, "mcp worker unavailable, restarting on next poll");
                self.mailbox.shutdown().await;
                return 0;
            }
            Err(e) => {
                warn!(error = %e, "email search failed, will retry");
                return 0;
            }
        };
        if envelopes.is_empty() {
            debug!("no new emails");
            return 0;
        }

        let mut delivered = 0;
        for envelope in &envelopes {
            let key = self.mailbox.context_key(envelope);
            match handler.handle(envelope, &key).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    error!(message_id = %envelope.id, error = %e, "email handler failed");
                }
            }
            self.mailbox.store().mark_processed(&envelope.id).await;
        }
        info!(delivered, found = envelopes.len(), "delivered new emails");
        delivered
    }
}
