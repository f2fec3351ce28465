//! The canonical decoded form of a mailbox item.

use serde::{Deserialize, Serialize};

/// One mailbox message as seen by the agent.
///
/// Produced by the result extractor in `mailbridge-channels`. Every field
/// is always populated: values missing from the worker's reply become
/// empty strings, except `thread_id` (falls back to `id`) and `date`
/// (falls back to the time of decoding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    /// Worker-assigned message identifier.
    pub id: String,
    /// Conversation the message belongs to.
    pub thread_id: String,
    /// Sender, possibly in `"Display Name <address>"` form.
    pub from: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Date as reported by the worker (free-form).
    pub date: String,
}

/// Extract the address from a `"Display Name <address>"` string.
///
/// Returns the input unchanged (trimmed) when no angle-bracketed part is
/// present or the brackets are empty.
pub fn bare_address(raw: &str) -> &str {
    if let Some(open) = raw.find('<') {
        let rest = &raw[open + 1..];
        if let Some(close) = rest.find('>') {
            let inner = rest[..close].trim();
            if !inner.is_empty() {
                return inner;
            }
        }
    }
    raw.trim()
}
