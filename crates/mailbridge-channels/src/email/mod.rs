//! Email channel driven by an MCP mail worker.
//!
//! # Architecture
//!
//! ```text
//! EmailPoller ──tick──> Mailbox.search_new_emails()
//!                          │  search_emails / read_email
//!                          v
//!                     ToolCaller (McpClient) ──stdio──> worker
//!                          │
//!                     extract_text / parse_envelope
//!                          │
//!                          v
//!                     EnvelopeHandler.handle(envelope, context_key)
//! ```
//!
//! # Modules
//!
//! - [`extract`] -- Tool result text extraction and envelope decoding
//! - [`mailbox`] -- Search, read, reply, trigger matching, context keys
//! - [`store`] -- Processed-message bookkeeping
//! - [`poller`] -- Interval loop delivering new mail to a handler
//! - [`channel`] -- [`EmailChannel`], wiring the above to a worker client

pub mod channel;
pub mod extract;
pub mod mailbox;
pub mod poller;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::EmailChannel;
pub use extract::{EnvelopeStrategy, HeaderLineStrategy, JsonEnvelopeStrategy, extract_text, parse_envelope};
pub use mailbox::{Mailbox, SearchHit, build_search_query, normalize_reply_subject, split_search_entries};
pub use poller::{EmailPoller, EnvelopeHandler};
pub use store::{MemoryProcessedStore, ProcessedStore};
