//! Email channel for mailbridge.
//!
//! Turns the raw tool calls of [`mailbridge_services::mcp`] into mailbox
//! operations: finding new mail that matches the configured trigger,
//! decoding it into [`MessageEnvelope`](mailbridge_types::MessageEnvelope)s,
//! replying within a thread, and polling on an interval.
//!
//! # Error handling
//!
//! Operations return [`ChannelError`]. Failures reading a single message
//! are logged and skip that message; everything else propagates.

pub mod email;
pub mod error;

pub use email::{EmailChannel, EmailPoller, EnvelopeHandler, Mailbox, MemoryProcessedStore, ProcessedStore};
pub use error::{ChannelError, Result};
