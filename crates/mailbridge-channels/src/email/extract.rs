//! Decoding of worker tool results into text and envelopes.
//!
//! Tool results arrive in several shapes: a `content` list of typed
//! fragments, a bare string, or arbitrary JSON. [`extract_text`] collapses
//! all of them into one string. [`parse_envelope`] then turns that string
//! into a [`MessageEnvelope`] by trying each [`EnvelopeStrategy`] in order:
//! structured JSON first, header-style lines second.

use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde_json::Value;

use mailbridge_types::MessageEnvelope;

/// Collapse a raw tool result into text. Never fails.
///
/// - `{"content": [{"type": "text", "text": ..}, ..]}`: non-empty text
///   fragments, newline-joined; other fragment types are skipped.
/// - a JSON string: returned verbatim.
/// - `null`: empty string.
/// - anything else: its compact JSON serialization.
pub fn extract_text(raw: &Value) -> String {
    if let Some(fragments) = raw.get("content").and_then(Value::as_array) {
        return fragments
            .iter()
            .filter(|f| f.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|f| f.get("text").and_then(Value::as_str))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
    }
    match raw {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One way of decoding a read result into an envelope.
pub trait EnvelopeStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Decode `text`, or `None` if this strategy does not apply.
    fn decode(&self, message_id: &str, text: &str) -> Option<MessageEnvelope>;
}

/// Decodes a JSON object with `from`/`subject`/`body`-style keys.
///
/// Applies to any text that parses as JSON. Values other than an object
/// carry no fields and decode to an envelope of defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEnvelopeStrategy;

impl JsonEnvelopeStrategy {
    const FROM: &'static [&'static str] = &["from", "sender"];
    const SUBJECT: &'static [&'static str] = &["subject"];
    const BODY: &'static [&'static str] = &["body", "text", "snippet"];
    const THREAD: &'static [&'static str] = &["threadId", "thread_id"];
    const DATE: &'static [&'static str] = &["date", "internalDate"];
}

impl EnvelopeStrategy for JsonEnvelopeStrategy {
    fn name(&self) -> &'static str {
        "json"
    }

    fn decode(&self, message_id: &str, text: &str) -> Option<MessageEnvelope> {
        let value: Value = serde_json::from_str(text.trim()).ok()?;

        // First non-empty value among the candidate keys.
        let field = |keys: &[&str]| -> Option<String> {
            keys.iter().find_map(|k| match value.get(*k)? {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        };

        Some(MessageEnvelope {
            id: message_id.to_string(),
            thread_id: field(Self::THREAD).unwrap_or_else(|| message_id.to_string()),
            from: field(Self::FROM).unwrap_or_default(),
            subject: field(Self::SUBJECT).unwrap_or_default(),
            body: field(Self::BODY).unwrap_or_default(),
            date: field(Self::DATE).unwrap_or_else(now_iso),
        })
    }
}

static FROM_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*from:[ \t]*(.*)$").unwrap());
static SUBJECT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*subject:[ \t]*(.*)$").unwrap());
static THREAD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*thread[ \t]*id:[ \t]*(.*)$").unwrap());
static DATE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*date:[ \t]*(.*)$").unwrap());

/// Decodes `Label: value` header lines followed by a blank line and the body.
///
/// Always succeeds; fields without a matching line fall back to defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderLineStrategy;

impl HeaderLineStrategy {
    /// Decode `text` unconditionally.
    pub fn parse(&self, message_id: &str, text: &str) -> MessageEnvelope {
        MessageEnvelope {
            id: message_id.to_string(),
            thread_id: header(&THREAD_LINE, text).unwrap_or_else(|| message_id.to_string()),
            from: header(&FROM_LINE, text).unwrap_or_default(),
            subject: header(&SUBJECT_LINE, text).unwrap_or_default(),
            body: body_after_headers(text),
            date: header(&DATE_LINE, text).unwrap_or_else(now_iso),
        }
    }
}

impl EnvelopeStrategy for HeaderLineStrategy {
    fn name(&self) -> &'static str {
        "header-lines"
    }

    fn decode(&self, message_id: &str, text: &str) -> Option<MessageEnvelope> {
        Some(self.parse(message_id, text))
    }
}

fn header(pattern: &Regex, text: &str) -> Option<String> {
    let value = pattern.captures(text)?.get(1)?.as_str().trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Everything after the first blank line, trimmed; the whole text when
/// there is no blank line.
fn body_after_headers(text: &str) -> String {
    let lf = text.find("\n\n").map(|i| i + 2);
    let crlf = text.find("\r\n\r\n").map(|i| i + 4);
    let start = match (lf, crlf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    match start {
        Some(start) => text[start..].trim().to_string(),
        None => text.to_string(),
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

static STRATEGIES: [&dyn EnvelopeStrategy; 2] = [&JsonEnvelopeStrategy, &HeaderLineStrategy];

/// Decode a read result into an envelope, JSON first, header lines second.
pub fn parse_envelope(message_id: &str, text: &str) -> MessageEnvelope {
    for strategy in STRATEGIES {
        if let Some(envelope) = strategy.decode(message_id, text) {
            tracing::trace!(strategy = strategy.name(), message_id, "decoded envelope");
            return envelope;
        }
    }
    HeaderLineStrategy.parse(message_id, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_fragments_are_joined() {
        let raw = json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "second"}
            ]
        });
        assert_eq!(extract_text(&raw), "first\nsecond");
    }

    #[test]
    fn empty_text_fragments_are_skipped() {
        let raw = json!({
            "content": [
                {"type": "text", "text": "From: a\nSubject: s"},
                {"type": "text", "text": ""},
                {"type": "text", "text": "body"}
            ]
        });
        let text = extract_text(&raw);
        assert_eq!(text, "From: a\nSubject: s\nbody");
        // No blank line was injected, so there is no header/body split.
        assert_eq!(parse_envelope("m", &text).body, text);
    }

    #[test]
    fn fragments_without_text_contribute_nothing() {
        let raw = json!({"content": [{"type": "resource", "uri": "x"}]});
        assert_eq!(extract_text(&raw), "");
    }

    #[test]
    fn plain_string_is_verbatim() {
        assert_eq!(extract_text(&json!("  as is \n")), "  as is \n");
    }

    #[test]
    fn other_shapes_are_serialized() {
        assert_eq!(extract_text(&json!({"ok": true})), r#"{"ok":true}"#);
        assert_eq!(extract_text(&json!(42)), "42");
        assert_eq!(extract_text(&Value::Null), "");
    }

    #[test]
    fn json_envelope() {
        let text = r#"{"from":"a@x.com","subject":"Hi","body":"B","threadId":"t1","date":"2024-01-01"}"#;
        let env = parse_envelope("m1", text);
        assert_eq!(
            env,
            MessageEnvelope {
                id: "m1".into(),
                thread_id: "t1".into(),
                from: "a@x.com".into(),
                subject: "Hi".into(),
                body: "B".into(),
                date: "2024-01-01".into(),
            }
        );
    }

    #[test]
    fn json_envelope_uses_fallback_keys() {
        let text = r#"{"sender":"b@x.com","snippet":"short","internalDate":1704067200000}"#;
        let env = parse_envelope("m2", text);
        assert_eq!(env.from, "b@x.com");
        assert_eq!(env.body, "short");
        assert_eq!(env.subject, "");
        assert_eq!(env.thread_id, "m2");
        assert_eq!(env.date, "1704067200000");
    }

    #[test]
    fn json_empty_string_falls_through_to_next_key() {
        let text = r#"{"from":"","sender":"c@x.com","body":"","text":"t"}"#;
        let env = parse_envelope("m3", text);
        assert_eq!(env.from, "c@x.com");
        assert_eq!(env.body, "t");
    }

    #[test]
    fn header_lines_envelope() {
        let env = parse_envelope("m4", "From: A <a@x.com>\nSubject: Hi\n\nBody text");
        assert_eq!(env.from, "A <a@x.com>");
        assert_eq!(env.subject, "Hi");
        assert_eq!(env.body, "Body text");
        assert_eq!(env.thread_id, "m4");
        assert_eq!(env.id, "m4");
        assert!(!env.date.is_empty());
    }

    #[test]
    fn header_lines_are_case_insensitive() {
        let text = "FROM: x@y.com\r\nsubject: Report\r\nThread ID: th-9\r\nDATE: Mon, 1 Jan 2024\r\n\r\nHello\r\n";
        let env = parse_envelope("m5", text);
        assert_eq!(env.from, "x@y.com");
        assert_eq!(env.subject, "Report");
        assert_eq!(env.thread_id, "th-9");
        assert_eq!(env.date, "Mon, 1 Jan 2024");
        assert_eq!(env.body, "Hello");
    }

    #[test]
    fn no_blank_line_means_whole_text_is_body() {
        let text = "Subject: one-liner";
        let env = parse_envelope("m6", text);
        assert_eq!(env.subject, "one-liner");
        assert_eq!(env.body, text);
    }

    #[test]
    fn non_object_json_decodes_to_defaults() {
        let env = parse_envelope("m7", r#"[{"from":"a@x.com"}]"#);
        assert_eq!(env.from, "");
        assert_eq!(env.body, "");
        assert_eq!(env.thread_id, "m7");
        assert!(!env.date.is_empty());

        let env = parse_envelope("m8", "42");
        assert_eq!(env.body, "");
    }

    #[test]
    fn strategies_are_independent() {
        assert!(JsonEnvelopeStrategy.decode("m", "From: a\n\nb").is_none());
        let env = HeaderLineStrategy.decode("m", r#"{"from":"a"}"#).unwrap();
        assert_eq!(env.from, "");
    }
}
