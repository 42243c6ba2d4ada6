//! Email context read from a message-store payload

use std::sync::LazyLock;

use base64::Engine;
use regex::Regex;
use serde::Deserialize;

use super::{ContextSource, EmailContext};
use crate::constants::ENCODED_ALPHABET_RATIO;

const SNIPPET_LABEL: &str = "Snippet: ";

/// Column width for rendering HTML bodies as text
const HTML_TEXT_WIDTH: usize = 200;

static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(?:!doctype|html|head|body|div|p|br|span|table|td|tr|a|b|i|strong|em|ul|ol|li|h[1-6])\b")
        .expect("valid html tag regex")
});

/// A message as returned by the store, or a thread holding several
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePart>,
    #[serde(default)]
    pub messages: Vec<MessagePayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl MessagePart {
    fn data(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .filter(|d| !d.is_empty())
    }

    fn is(&self, mime: &str) -> bool {
        self.mime_type.as_deref() == Some(mime)
    }
}

/// The most useful text in a payload, still possibly encoded.
///
/// Snippet first; then, one level into the part tree, a plain-text part, an
/// HTML part, the top-level body, and any part with data. A thread recurses
/// into its first message.
pub fn extract_from_payload(msg: &MessagePayload) -> Option<String> {
    if let Some(snippet) = msg.snippet.as_deref().filter(|s| !s.is_empty()) {
        return Some(snippet.to_string());
    }

    if let Some(part) = &msg.payload {
        let parts = &part.parts;
        let found = parts
            .iter()
            .find(|p| p.is("text/plain") && p.data().is_some())
            .or_else(|| parts.iter().find(|p| p.is("text/html") && p.data().is_some()))
            .and_then(MessagePart::data)
            .or_else(|| part.data())
            .or_else(|| parts.iter().find_map(MessagePart::data));
        if let Some(data) = found {
            return Some(data.to_string());
        }
    }

    if let Some(first) = msg.messages.first() {
        tracing::debug!("Thread payload, reading first of {} messages", msg.messages.len());
        return extract_from_payload(first);
    }

    None
}

/// `(from, subject)` from a header list, matched case-insensitively.
/// Missing headers come back empty.
pub fn extract_headers(headers: &[Header]) -> (String, String) {
    let mut from = String::new();
    let mut subject = String::new();
    for header in headers {
        if header.name.eq_ignore_ascii_case("from") {
            from = header.value.clone();
        } else if header.name.eq_ignore_ascii_case("subject") {
            subject = header.value.clone();
        }
    }
    (from, subject)
}

fn headers_of(msg: &MessagePayload) -> &[Header] {
    match (&msg.payload, msg.messages.first()) {
        (Some(part), _) => &part.headers,
        (None, Some(first)) => headers_of(first),
        (None, None) => &[],
    }
}

fn in_alphabet(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '-' | '_' | '=')
}

/// Decode base64 (either alphabet, padding optional) when the text plausibly
/// is base64. Anything that fails to decode into printable UTF-8 is returned
/// unchanged.
pub fn decode_body(text: &str) -> String {
    let total = text.chars().count();
    if total == 0 {
        return String::new();
    }
    let encoded = text.chars().filter(|c| in_alphabet(*c)).count();
    if (encoded as f64) < ENCODED_ALPHABET_RATIO * total as f64 {
        return text.to_string();
    }

    let standard: String = text
        .chars()
        .filter(|c| in_alphabet(*c) && *c != '=')
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    let decoded = base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(standard.as_bytes())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .filter(|s| s.chars().all(|c| !c.is_control() || c.is_whitespace()));

    match decoded {
        Some(s) => s,
        None => text.to_string(),
    }
}

fn html_to_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), HTML_TEXT_WIDTH) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("HTML rendering failed, keeping markup: {}", e);
            html.to_string()
        }
    }
}

/// Assemble a summarizer context from a fetched payload
pub fn context_from_payload(msg: &MessagePayload) -> Option<EmailContext> {
    let raw = extract_from_payload(msg)?;
    let raw = raw.strip_prefix(SNIPPET_LABEL).unwrap_or(&raw);

    let mut body = decode_body(raw);
    if HTML_TAG_RE.is_match(&body) {
        body = html_to_text(&body);
    }
    let body = body.trim().to_string();

    let (from, subject) = extract_headers(headers_of(msg));
    let context = EmailContext {
        from,
        subject,
        body_excerpt: body,
        source: ContextSource::Remote,
    };
    (!context.is_empty()).then_some(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(s: &str) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(s)
    }

    fn part(mime: &str, data: &str) -> MessagePart {
        MessagePart {
            mime_type: Some(mime.to_string()),
            body: Some(PartBody {
                data: Some(data.to_string()),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_snippet_preferred() {
        let msg = MessagePayload {
            snippet: Some("Hello there".to_string()),
            payload: Some(MessagePart {
                parts: vec![part("text/plain", "ignored")],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(extract_from_payload(&msg).as_deref(), Some("Hello there"));
    }

    #[test]
    fn test_part_priority() {
        let mut msg = MessagePayload {
            payload: Some(MessagePart {
                body: Some(PartBody {
                    data: Some("top".to_string()),
                }),
                parts: vec![
                    part("application/pdf", "pdf"),
                    part("text/html", "html"),
                    part("text/plain", "plain"),
                ],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(extract_from_payload(&msg).as_deref(), Some("plain"));

        let root = msg.payload.as_mut().unwrap();
        root.parts.retain(|p| !p.is("text/plain"));
        assert_eq!(extract_from_payload(&msg).as_deref(), Some("html"));

        let root = msg.payload.as_mut().unwrap();
        root.parts.retain(|p| !p.is("text/html"));
        assert_eq!(extract_from_payload(&msg).as_deref(), Some("top"));

        msg.payload.as_mut().unwrap().body = None;
        assert_eq!(extract_from_payload(&msg).as_deref(), Some("pdf"));
    }

    #[test]
    fn test_html_only_payload_returns_html_data() {
        let msg: MessagePayload = serde_json::from_value(serde_json::json!({
            "id": "18a1",
            "payload": {
                "mimeType": "multipart/alternative",
                "parts": [{"mimeType": "text/html", "body": {"data": "PGI-aGk8L2I-"}}]
            }
        }))
        .unwrap();
        assert_eq!(extract_from_payload(&msg).as_deref(), Some("PGI-aGk8L2I-"));
    }

    #[test]
    fn test_thread_recurses_into_first_message() {
        let msg: MessagePayload = serde_json::from_value(serde_json::json!({
            "messages": [
                {"payload": {"headers": [{"name": "Subject", "value": "Plans"}],
                             "body": {"data": "first body"}}},
                {"snippet": "second"}
            ]
        }))
        .unwrap();
        assert_eq!(extract_from_payload(&msg).as_deref(), Some("first body"));
        assert_eq!(extract_headers(headers_of(&msg)).1, "Plans");
    }

    #[test]
    fn test_nothing_found() {
        let msg = MessagePayload {
            snippet: Some(String::new()),
            payload: Some(MessagePart {
                parts: vec![MessagePart::default()],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(extract_from_payload(&msg), None);
        assert_eq!(extract_from_payload(&MessagePayload::default()), None);
    }

    #[test]
    fn test_headers_case_insensitive() {
        let headers = vec![
            Header {
                name: "FROM".to_string(),
                value: "Alice <alice@example.com>".to_string(),
            },
            Header {
                name: "subject".to_string(),
                value: "Hi".to_string(),
            },
            Header {
                name: "To".to_string(),
                value: "bob@example.com".to_string(),
            },
        ];
        assert_eq!(
            extract_headers(&headers),
            ("Alice <alice@example.com>".to_string(), "Hi".to_string())
        );
        assert_eq!(extract_headers(&[]), (String::new(), String::new()));
    }

    #[test]
    fn test_decode_body() {
        let encoded = encode("Meeting moved to 3pm, see you there.");
        assert_eq!(decode_body(&encoded), "Meeting moved to 3pm, see you there.");

        // plain prose is left alone
        assert_eq!(decode_body("Hello there"), "Hello there");
        // alphabet-only text that decodes to binary is left alone
        assert_eq!(decode_body("Greeting"), "Greeting");
        assert_eq!(decode_body(""), "");
    }

    #[test]
    fn test_context_from_payload() {
        let msg: MessagePayload = serde_json::from_value(serde_json::json!({
            "payload": {
                "headers": [
                    {"name": "From", "value": "a@example.com"},
                    {"name": "Subject", "value": "Status"}
                ],
                "parts": [{"mimeType": "text/html",
                           "body": {"data": encode("<html><body><p>All systems go</p></body></html>")}}]
            }
        }))
        .unwrap();

        let ctx = context_from_payload(&msg).unwrap();
        assert_eq!(ctx.source, ContextSource::Remote);
        assert_eq!(ctx.from, "a@example.com");
        assert_eq!(ctx.subject, "Status");
        assert_eq!(ctx.body_excerpt, "All systems go");
    }

    #[test]
    fn test_context_strips_snippet_label() {
        let msg = MessagePayload {
            snippet: Some("Snippet: Hello there".to_string()),
            ..Default::default()
        };
        let ctx = context_from_payload(&msg).unwrap();
        assert_eq!(ctx.render(), "Hello there");
    }
}
