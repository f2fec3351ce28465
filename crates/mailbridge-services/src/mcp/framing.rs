//! Newline-delimited JSON framing for worker stdout.
//!
//! The worker writes one JSON-RPC message per line. Output arrives in
//! arbitrary chunks, so [`LineFramer`] buffers partial records across
//! chunk boundaries and only decodes a record once its terminating `\n`
//! has been seen.
//!
//! # Wire format
//!
//! ```text
//! {"jsonrpc":"2.0","id":1,"result":{...}}\n
//! {"jsonrpc":"2.0","method":"notifications/message","params":{...}}\n
//! ```
//!
//! A trailing `\r` before the newline and blank lines are tolerated.
//! Records that fail to decode are logged and skipped; they never stop
//! later records from being extracted.

use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use super::types::InboundMessage;

/// Output of one [`LineFramer::push`] call.
#[derive(Debug, Default)]
pub struct FrameBatch {
    /// Complete, decoded messages in arrival order.
    pub messages: Vec<InboundMessage>,
    /// Set when the unterminated tail grew past the record bound; holds
    /// the number of bytes that were discarded.
    pub overflow: Option<usize>,
}

/// Reassembles newline-terminated JSON records from a byte stream.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    /// Bytes of `buf` already known to contain no newline.
    scanned: usize,
    max_record_bytes: usize,
    partial_since: Option<Instant>,
}

impl LineFramer {
    /// Create a framer that tolerates unterminated records up to
    /// `max_record_bytes` long.
    pub fn new(max_record_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_record_bytes,
            partial_since: None,
        }
    }

    /// Feed a chunk of worker output and return every record it completes.
    pub fn push(&mut self, chunk: &[u8]) -> FrameBatch {
        let mut batch = FrameBatch::default();
        if chunk.is_empty() {
            return batch;
        }
        self.buf.extend_from_slice(chunk);

        let mut start = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buf[search_from..].iter().position(|b| *b == b'\n') {
            let end = search_from + offset;
            if let Some(msg) = decode_record(&self.buf[start..end]) {
                batch.messages.push(msg);
            }
            start = end + 1;
            search_from = start;
        }

        if start > 0 {
            self.buf.drain(..start);
            // Any remaining bytes are the start of a new record.
            self.partial_since = None;
        }
        self.scanned = self.buf.len();

        if self.buf.is_empty() {
            self.partial_since = None;
        } else if self.partial_since.is_none() {
            self.partial_since = Some(Instant::now());
        }

        if self.buf.len() > self.max_record_bytes {
            let discarded = self.buf.len();
            warn!(
                bytes = discarded,
                limit = self.max_record_bytes,
                "worker record exceeds size limit, discarding buffer"
            );
            self.clear();
            batch.overflow = Some(discarded);
        }

        batch
    }

    /// Number of buffered bytes belonging to an unterminated record.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    /// How long the current unterminated record has been waiting for its
    /// newline, if there is one.
    pub fn partial_age(&self) -> Option<Duration> {
        self.partial_since.map(|since| since.elapsed())
    }

    /// Drop any buffered partial record.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.scanned = 0;
        self.partial_since = None;
    }
}

fn decode_record(raw: &[u8]) -> Option<InboundMessage> {
    let line = match std::str::from_utf8(raw) {
        Ok(s) => s.trim(),
        Err(e) => {
            warn!(error = %e, "dropping worker record with invalid UTF-8");
            return None;
        }
    };
    if line.is_empty() {
        return None;
    }

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, record = %truncate(line), "dropping malformed worker record");
            return None;
        }
    };

    match InboundMessage::classify(value) {
        Ok(msg) => Some(msg),
        Err(reason) => {
            warn!(%reason, record = %truncate(line), "dropping unrecognized worker record");
            None
        }
    }
}

fn truncate(line: &str) -> &str {
    const MAX: usize = 200;
    if line.len() <= MAX {
        return line;
    }
    let mut end = MAX;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}
