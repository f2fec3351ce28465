//! Mailbox operations: search, read, reply.
//!
//! Everything here goes through a [`ToolCaller`], so the worker behind it
//! can be the real MCP client or a scripted stand-in.
//!
//! Tools used:
//!
//! | Tool | Arguments |
//! |------|-----------|
//! | `search_emails` | `{query, maxResults}` |
//! | `read_email` | `{messageId}` |
//! | `send_email` | `{to: [address], subject, body, threadId, inReplyTo?}` |

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, error, info};

use mailbridge_services::mcp::ToolCaller;
use mailbridge_types::envelope::bare_address;
use mailbridge_types::{ContextMode, EmailChannelConfig, MessageEnvelope, TriggerConfig, TriggerMode};

use super::extract::{extract_text, parse_envelope};
use super::store::ProcessedStore;
use crate::error::{ChannelError, Result};

/// One entry of a search listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    /// Message identifier from the `ID:` line.
    pub id: String,
    /// Remaining lines of the entry (subject, sender, ...), unparsed.
    pub summary: String,
}

/// Worker search query for `trigger`, restricted to unread mail.
///
/// Values containing whitespace are double-quoted.
pub fn build_search_query(trigger: &TriggerConfig) -> String {
    let value = trigger.value.trim();
    let value = if value.chars().any(char::is_whitespace) {
        format!("\"{value}\"")
    } else {
        value.to_string()
    };
    let operator = match trigger.mode {
        TriggerMode::Label => "label",
        TriggerMode::Address => "to",
        TriggerMode::Subject => "subject",
    };
    format!("{operator}:{value} is:unread")
}

/// Split a search listing into entries, each starting at a line that
/// begins with `ID:`. Text before the first such line is ignored, as are
/// entries with an empty identifier.
pub fn split_search_entries(listing: &str) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = Vec::new();
    let mut in_entry = false;

    for line in listing.lines() {
        if let Some(rest) = line.strip_prefix("ID:") {
            in_entry = false;
            if let Some(id) = rest.split_whitespace().next() {
                hits.push(SearchHit {
                    id: id.to_string(),
                    summary: String::new(),
                });
                in_entry = true;
            }
            continue;
        }
        if !in_entry {
            continue;
        }
        if let Some(hit) = hits.last_mut() {
            if !hit.summary.is_empty() {
                hit.summary.push('\n');
            }
            hit.summary.push_str(line);
        }
    }
    hits
}

/// `subject` with exactly one leading `Re:` (any case).
pub fn normalize_reply_subject(subject: &str) -> String {
    let subject = subject.trim();
    let has_prefix = subject
        .get(..3)
        .is_some_and(|p| p.eq_ignore_ascii_case("re:"));
    if has_prefix {
        subject.to_string()
    } else {
        format!("Re: {subject}").trim_end().to_string()
    }
}

/// Text of a tool result, or [`ChannelError::ToolFailed`] when the tool
/// flagged its own result as an error.
fn tool_text(tool: &str, raw: &Value) -> Result<String> {
    let text = extract_text(raw);
    if raw.get("isError").and_then(Value::as_bool) == Some(true) {
        return Err(ChannelError::ToolFailed {
            tool: tool.to_string(),
            message: text,
        });
    }
    Ok(text)
}

/// Mailbox operations bound to one trigger configuration.
pub struct Mailbox {
    caller: Arc<dyn ToolCaller>,
    store: Arc<dyn ProcessedStore>,
    trigger: TriggerConfig,
    context_mode: ContextMode,
    max_results: u32,
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("trigger", &self.trigger)
            .field("context_mode", &self.context_mode)
            .field("max_results", &self.max_results)
            .finish_non_exhaustive()
    }
}

impl Mailbox {
    pub fn new(
        config: &EmailChannelConfig,
        caller: Arc<dyn ToolCaller>,
        store: Arc<dyn ProcessedStore>,
    ) -> Self {
        Self {
            caller,
            store,
            trigger: config.trigger.clone(),
            context_mode: config.context_mode,
            max_results: config.max_results,
        }
    }

    /// The processed-message store this mailbox consults.
    pub fn store(&self) -> &Arc<dyn ProcessedStore> {
        &self.store
    }

    /// Search for unread, unprocessed mail matching the trigger and read
    /// each hit in listing order.
    ///
    /// A message that fails to read is skipped; a failed search call is
    /// returned as an error.
    pub async fn search_new_emails(&self) -> Result<Vec<MessageEnvelope>> {
        let query = build_search_query(&self.trigger);
        debug!(query = %query, "searching for emails");

        let raw = self
            .caller
            .call_tool(
                "search_emails",
                json!({
                    "query": query,
                    "maxResults": self.max_results,
                }),
            )
            .await?;
        let listing = tool_text("search_emails", &raw)?;

        let mut found = Vec::new();
        for hit in split_search_entries(&listing) {
            if self.store.is_processed(&hit.id).await {
                debug!(message_id = %hit.id, "skipping processed email");
                continue;
            }
            let Some(envelope) = self.read_email(&hit.id).await else {
                debug!(message_id = %hit.id, listing = %hit.summary, "skipping unreadable email");
                continue;
            };
            if self.matches_trigger(&envelope) {
                found.push(envelope);
            } else {
                debug!(message_id = %hit.id, subject = %envelope.subject, "email does not match trigger");
            }
        }
        Ok(found)
    }

    /// Read one message. Failures are logged and yield `None`.
    pub async fn read_email(&self, message_id: &str) -> Option<MessageEnvelope> {
        let text = match self.fetch_message(message_id).await {
            Ok(text) => text,
            Err(e) => {
                error!(message_id = %message_id, error = %e, "failed to read email");
                return None;
            }
        };
        Some(parse_envelope(message_id, &text))
    }

    async fn fetch_message(&self, message_id: &str) -> Result<String> {
        let raw = self
            .caller
            .call_tool("read_email", json!({ "messageId": message_id }))
            .await?;
        tool_text("read_email", &raw)
    }

    /// Client-side trigger check. Only subject mode filters: the subject
    /// must start with the trigger value, ignoring case.
    pub fn matches_trigger(&self, envelope: &MessageEnvelope) -> bool {
        match self.trigger.mode {
            TriggerMode::Subject => envelope
                .subject
                .to_lowercase()
                .starts_with(&self.trigger.value.trim().to_lowercase()),
            TriggerMode::Label | TriggerMode::Address => true,
        }
    }

    /// Reply within `thread_id`.
    ///
    /// `to` may be a `"Name <address>"` string; only the address is used.
    /// When `in_reply_to` is given and the send succeeds, that message is
    /// recorded as responded.
    pub async fn send_reply(
        &self,
        thread_id: &str,
        to: &str,
        subject: &str,
        body: &str,
        in_reply_to: Option<&str>,
    ) -> Result<()> {
        let address = bare_address(to);
        if address.is_empty() {
            return Err(ChannelError::InvalidReply("recipient is empty".into()));
        }
        let subject = normalize_reply_subject(subject);

        let mut args = json!({
            "to": [address],
            "subject": subject,
            "body": body,
            "threadId": thread_id,
        });
        if let Some(id) = in_reply_to {
            args["inReplyTo"] = json!(id);
        }

        let raw = self.caller.call_tool("send_email", args).await?;
        tool_text("send_email", &raw)?;
        info!(to = %address, subject = %subject, "email reply sent");

        if let Some(id) = in_reply_to {
            self.store.mark_responded(id).await;
        }
        Ok(())
    }

    /// Conversation key for `envelope` under the configured context mode.
    pub fn context_key(&self, envelope: &MessageEnvelope) -> String {
        match self.context_mode {
            ContextMode::Thread => format!("email-thread-{}", envelope.thread_id),
            ContextMode::Sender => format!("email-sender-{}", envelope.from.to_lowercase()),
            ContextMode::Single => "email-main".to_string(),
        }
    }

    /// Release the worker behind the tool caller.
    pub async fn shutdown(&self) {
        self.caller.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::store::MemoryProcessedStore;
    use crate::email::testing::ScriptedCaller;
    use mailbridge_services::error::ServiceError;

    fn config(mode: TriggerMode, value: &str) -> EmailChannelConfig {
        EmailChannelConfig {
            trigger: TriggerConfig {
                mode,
                value: value.into(),
            },
            ..Default::default()
        }
    }

    fn mailbox(
        config: &EmailChannelConfig,
    ) -> (Mailbox, Arc<ScriptedCaller>, Arc<MemoryProcessedStore>) {
        let caller = Arc::new(ScriptedCaller::new());
        let store = Arc::new(MemoryProcessedStore::new());
        let mailbox = Mailbox::new(config, caller.clone(), store.clone());
        (mailbox, caller, store)
    }

    fn envelope(subject: &str) -> MessageEnvelope {
        MessageEnvelope {
            id: "m1".into(),
            thread_id: "t1".into(),
            from: "Jane Doe <Jane@X.com>".into(),
            subject: subject.into(),
            body: String::new(),
            date: String::new(),
        }
    }

    #[test]
    fn search_query_per_mode() {
        let q = |mode, value: &str| {
            build_search_query(&TriggerConfig {
                mode,
                value: value.into(),
            })
        };
        assert_eq!(q(TriggerMode::Label, "nanoclaw"), "label:nanoclaw is:unread");
        assert_eq!(q(TriggerMode::Address, "bot@x.com"), "to:bot@x.com is:unread");
        assert_eq!(q(TriggerMode::Subject, "[bot]"), "subject:[bot] is:unread");
        assert_eq!(
            q(TriggerMode::Subject, " weekly report "),
            "subject:\"weekly report\" is:unread"
        );
    }

    #[test]
    fn listing_is_split_at_id_lines() {
        let listing = "Found 2 messages\nID: abc123\nSubject: One\nFrom: a@x.com\n\nID: def456\nSubject: Two";
        let hits = split_search_entries(listing);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "abc123");
        assert_eq!(hits[0].summary, "Subject: One\nFrom: a@x.com\n");
        assert_eq!(hits[1].id, "def456");
        assert_eq!(hits[1].summary, "Subject: Two");
    }

    #[test]
    fn listing_without_ids_is_empty() {
        assert!(split_search_entries("No messages found.").is_empty());
        assert!(split_search_entries("").is_empty());
        // Marker must start the line and carry an identifier.
        assert!(split_search_entries("  ID: indented\nID:   \n").is_empty());
    }

    #[test]
    fn reply_subject_gets_one_prefix() {
        assert_eq!(normalize_reply_subject("Invoice"), "Re: Invoice");
        assert_eq!(normalize_reply_subject("Re: Invoice"), "Re: Invoice");
        assert_eq!(normalize_reply_subject("RE: Invoice"), "RE: Invoice");
        assert_eq!(normalize_reply_subject("  re:Invoice"), "re:Invoice");
        assert_eq!(normalize_reply_subject("Regarding"), "Re: Regarding");
        assert_eq!(normalize_reply_subject(""), "Re:");
    }

    #[test]
    fn subject_trigger_is_case_insensitive_prefix() {
        let (mb, _, _) = mailbox(&config(TriggerMode::Subject, "invoice"));
        assert!(mb.matches_trigger(&envelope("Invoice: payment due")));
        assert!(mb.matches_trigger(&envelope("INVOICE 7")));
        assert!(!mb.matches_trigger(&envelope("Re: Invoice #2")));
        assert!(!mb.matches_trigger(&envelope("Please see invoice")));
    }

    #[test]
    fn other_trigger_modes_pass_through() {
        let (label, _, _) = mailbox(&config(TriggerMode::Label, "invoice"));
        assert!(label.matches_trigger(&envelope("anything")));
        let (address, _, _) = mailbox(&config(TriggerMode::Address, "bot@x.com"));
        assert!(address.matches_trigger(&envelope("anything")));
    }

    #[test]
    fn context_keys() {
        let env = envelope("Hi");
        let mut cfg = EmailChannelConfig::default();

        cfg.context_mode = ContextMode::Thread;
        assert_eq!(mailbox(&cfg).0.context_key(&env), "email-thread-t1");

        cfg.context_mode = ContextMode::Sender;
        assert_eq!(
            mailbox(&cfg).0.context_key(&env),
            "email-sender-jane doe <jane@x.com>"
        );

        cfg.context_mode = ContextMode::Single;
        assert_eq!(mailbox(&cfg).0.context_key(&env), "email-main");
    }

    #[tokio::test]
    async fn search_sends_query_and_cap() {
        let (mb, caller, _) = mailbox(&config(TriggerMode::Label, "nanoclaw"));
        caller.push_text("search_emails", "No messages").await;

        assert!(mb.search_new_emails().await.unwrap().is_empty());
        let calls = caller.calls_to("search_emails").await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["query"], "label:nanoclaw is:unread");
        assert_eq!(calls[0]["maxResults"], 10);
    }

    #[tokio::test]
    async fn search_skips_processed_and_keeps_listing_order() {
        let (mb, caller, store) = mailbox(&config(TriggerMode::Label, "nanoclaw"));
        caller
            .push_text("search_emails", "ID: m3\nSubject: c\nID: m1\nSubject: a\nID: m2\n")
            .await;
        caller.push_text("read_email", "From: c@x.com\nSubject: c\n\nthird").await;
        caller.push_text("read_email", "From: b@x.com\nSubject: b\n\nsecond").await;
        store.mark_processed("m1").await;

        let found = mb.search_new_emails().await.unwrap();
        let ids: Vec<_> = found.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["m3", "m2"]);

        let reads = caller.calls_to("read_email").await;
        assert_eq!(reads, vec![json!({"messageId": "m3"}), json!({"messageId": "m2"})]);
    }

    #[tokio::test]
    async fn failed_read_skips_only_that_message() {
        let (mb, caller, _) = mailbox(&config(TriggerMode::Label, "nanoclaw"));
        caller.push_text("search_emails", "ID: bad\nID: good\n").await;
        caller
            .push(
                "read_email",
                Err(ServiceError::Timeout {
                    method: "tools/call".into(),
                    secs: 30,
                }),
            )
            .await;
        caller
            .push_text("read_email", r#"{"from":"a@x.com","subject":"ok","body":"B"}"#)
            .await;

        let found = mb.search_new_emails().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "good");
        assert_eq!(found[0].subject, "ok");
    }

    #[tokio::test]
    async fn read_reporting_tool_error_is_skipped() {
        let (mb, caller, _) = mailbox(&config(TriggerMode::Label, "nanoclaw"));
        caller
            .push(
                "read_email",
                Ok(json!({"isError": true, "content": [{"type": "text", "text": "not found"}]})),
            )
            .await;
        assert!(mb.read_email("gone").await.is_none());
    }

    #[tokio::test]
    async fn search_filters_by_subject_prefix() {
        let (mb, caller, _) = mailbox(&config(TriggerMode::Subject, "invoice"));
        caller.push_text("search_emails", "ID: a\nID: b\n").await;
        caller.push_text("read_email", "Subject: Please see invoice\n\nx").await;
        caller.push_text("read_email", "Subject: Invoice 12\n\ny").await;

        let found = mb.search_new_emails().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "b");
    }

    #[tokio::test]
    async fn failed_search_is_an_error() {
        let (mb, _caller, _) = mailbox(&config(TriggerMode::Label, "nanoclaw"));
        let err = mb.search_new_emails().await.unwrap_err();
        assert!(matches!(err, ChannelError::Service(ServiceError::Transport(_))));
    }

    #[tokio::test]
    async fn reply_normalizes_subject_and_address() {
        let (mb, caller, store) = mailbox(&EmailChannelConfig::default());
        caller.push_text("send_email", "Email sent").await;

        mb.send_reply("t1", "Jane <jane@x.com>", "Invoice", "Thanks", Some("m1"))
            .await
            .unwrap();

        let sent = caller.calls_to("send_email").await;
        assert_eq!(
            sent[0],
            json!({
                "to": ["jane@x.com"],
                "subject": "Re: Invoice",
                "body": "Thanks",
                "threadId": "t1",
                "inReplyTo": "m1"
            })
        );
        assert!(store.is_responded("m1").await);
    }

    #[tokio::test]
    async fn reply_without_in_reply_to_omits_it() {
        let (mb, caller, _) = mailbox(&EmailChannelConfig::default());
        caller.push_text("send_email", "ok").await;
        mb.send_reply("t2", "bob@x.com", "Re: Invoice", "b", None)
            .await
            .unwrap();

        let sent = caller.calls_to("send_email").await;
        assert_eq!(sent[0]["to"], json!(["bob@x.com"]));
        assert_eq!(sent[0]["subject"], "Re: Invoice");
        assert!(sent[0].get("inReplyTo").is_none());
    }

    #[tokio::test]
    async fn reply_to_empty_address_is_rejected_locally() {
        let (mb, caller, _) = mailbox(&EmailChannelConfig::default());
        let err = mb.send_reply("t", "  ", "s", "b", None).await.unwrap_err();
        assert!(matches!(err, ChannelError::InvalidReply(_)));
        assert!(caller.calls().await.is_empty());
    }

    #[tokio::test]
    async fn failed_send_does_not_mark_responded() {
        let (mb, caller, store) = mailbox(&EmailChannelConfig::default());
        caller
            .push(
                "send_email",
                Ok(json!({"isError": true, "content": [{"type": "text", "text": "quota"}]})),
            )
            .await;

        let err = mb
            .send_reply("t", "a@x.com", "s", "b", Some("m9"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::ToolFailed { ref message, .. } if message == "quota"));
        assert!(!store.is_responded("m9").await);
    }
}
