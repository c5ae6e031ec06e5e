//! Mailbox wire types (Gmail-shaped JSON), body flattening, and address parsing.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use mail_parser::MessageParser;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineError;
use crate::pipeline::types::InboundEmail;

/// Response of `GET users/me/messages`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub result_size_estimate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
}

/// Response of `GET users/me/messages/{id}?format=full`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
    pub payload: Option<MessagePart>,
}

/// One MIME part. Multipart containers carry `parts`; leaves carry `body.data`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: PartBody,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartBody {
    /// base64url-encoded content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// OAuth2 refresh-token exchange response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Response of `POST users/me/messages/send`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

impl MessagePart {
    /// Header value by case-insensitive name, or empty.
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .unwrap_or_default()
    }

    /// Decode this part and every nested part, in document order.
    pub fn flatten_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(data) = self.body.data.as_deref() {
            match decode_base64url(data) {
                Ok(text) => {
                    let text = if self.mime_type.eq_ignore_ascii_case("text/html") {
                        strip_html(&text)
                    } else {
                        text
                    };
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    out.push_str(&text);
                }
                Err(e) => debug!(mime_type = %self.mime_type, "Skipping undecodable part: {e}"),
            }
        }
        for part in &self.parts {
            part.collect_text(out);
        }
    }
}

impl GmailMessage {
    /// Flatten to the fields the pipeline reads.
    pub fn to_inbound(&self) -> Result<InboundEmail, PipelineError> {
        if self.id.trim().is_empty() {
            return Err(PipelineError::Parse("message has no id".into()));
        }
        let payload = self
            .payload
            .as_ref()
            .ok_or_else(|| PipelineError::Parse(format!("message {} has no payload", self.id)))?;

        Ok(InboundEmail {
            message_id: self.id.clone(),
            thread_id: self.thread_id.clone(),
            from: payload.header("From").to_string(),
            to: payload.header("To").to_string(),
            subject: payload.header("Subject").to_string(),
            date: payload.header("Date").to_string(),
            body: payload.flatten_text(),
        })
    }
}

/// Decode Gmail's base64url (padding optional), lossy on invalid UTF-8.
pub fn decode_base64url(data: &str) -> Result<String, base64::DecodeError> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim().trim_end_matches('='))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn encode_base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Address parsing ─────────────────────────────────────────────────

/// Display name and address from a single-mailbox header value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxAddress {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Parse a `From`-style header value, e.g. `"Doe, Jane" <jane@x.com>`.
pub fn parse_from_header(raw: &str) -> MailboxAddress {
    let raw = raw.trim();
    if raw.is_empty() {
        return MailboxAddress::default();
    }

    let header = format!("From: {raw}\r\n\r\n");
    let parsed = MessageParser::default().parse(header.as_bytes());
    let addr = parsed
        .as_ref()
        .and_then(|m| m.from())
        .and_then(|a| a.first());

    MailboxAddress {
        name: addr
            .and_then(|a| a.name())
            .map(|n| n.trim().trim_matches('"').trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string),
        address: addr
            .and_then(|a| a.address())
            .map(str::trim)
            .filter(|a| a.contains('@'))
            .map(str::to_string),
    }
}

/// Every address in a `To`-style list, lowercased. Group syntax is
/// flattened.
pub fn parse_address_list(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    let header = format!("To: {raw}\r\n\r\n");
    let parsed = MessageParser::default().parse(header.as_bytes());
    let addrs: Vec<&mail_parser::Addr> = match parsed.as_ref().and_then(|m| m.to()) {
        Some(mail_parser::Address::List(list)) => list.iter().collect(),
        Some(mail_parser::Address::Group(groups)) => {
            groups.iter().flat_map(|g| g.addresses.iter()).collect()
        }
        None => Vec::new(),
    };
    let mut addresses: Vec<String> = addrs
        .iter()
        .filter_map(|a| a.address())
        .map(|a| a.trim().to_lowercase())
        .filter(|a| a.contains('@'))
        .collect();

    if addresses.is_empty() {
        // Bare addresses the parser rejected, e.g. `a@b.com; c@d.com`.
        addresses = raw
            .split([',', ';'])
            .map(|part| {
                let part = part.trim();
                match (part.rfind('<'), part.rfind('>')) {
                    (Some(start), Some(end)) if start < end => &part[start + 1..end],
                    _ => part,
                }
            })
            .map(|a| a.trim().to_lowercase())
            .filter(|a| a.contains('@') && !a.contains(char::is_whitespace))
            .collect();
    }
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(mime: &str, text: &str) -> MessagePart {
        MessagePart {
            mime_type: mime.into(),
            body: PartBody {
                data: Some(encode_base64url(text.as_bytes())),
                size: text.len() as u64,
            },
            ..MessagePart::default()
        }
    }

    #[test]
    fn flattens_nested_multipart_in_order() {
        let root = MessagePart {
            mime_type: "multipart/mixed".into(),
            parts: vec![
                MessagePart {
                    mime_type: "multipart/alternative".into(),
                    parts: vec![part("text/plain", "first line")],
                    ..MessagePart::default()
                },
                part("text/html", "<p>second <b>line</b></p>"),
            ],
            ..MessagePart::default()
        };
        assert_eq!(root.flatten_text(), "first line\nsecond line");
    }

    #[test]
    fn undecodable_part_is_skipped() {
        let root = MessagePart {
            parts: vec![
                MessagePart {
                    body: PartBody {
                        data: Some("!!!not base64!!!".into()),
                        size: 0,
                    },
                    ..MessagePart::default()
                },
                part("text/plain", "kept"),
            ],
            ..MessagePart::default()
        };
        assert_eq!(root.flatten_text(), "kept");
    }

    #[test]
    fn decodes_padded_and_unpadded() {
        assert_eq!(decode_base64url("aGk=").unwrap(), "hi");
        assert_eq!(decode_base64url("aGk").unwrap(), "hi");
    }

    #[test]
    fn gmail_message_deserializes_and_flattens() {
        let json = serde_json::json!({
            "id": "18c1",
            "threadId": "t9",
            "payload": {
                "mimeType": "text/plain",
                "headers": [
                    {"name": "from", "value": "Jane <jane@x.com>"},
                    {"name": "To", "value": "reachus.sherlox@gmail.com"},
                    {"name": "Subject", "value": "Refund"}
                ],
                "body": {"data": encode_base64url(b"My refund is late"), "size": 17}
            }
        });
        let msg: GmailMessage = serde_json::from_value(json).unwrap();
        let inbound = msg.to_inbound().unwrap();
        assert_eq!(inbound.message_id, "18c1");
        assert_eq!(inbound.thread_id, "t9");
        assert_eq!(inbound.from, "Jane <jane@x.com>");
        assert_eq!(inbound.subject, "Refund");
        assert_eq!(inbound.date, "");
        assert_eq!(inbound.body, "My refund is late");
    }

    #[test]
    fn message_without_payload_is_a_parse_error() {
        let msg = GmailMessage {
            id: "x".into(),
            ..GmailMessage::default()
        };
        assert!(matches!(msg.to_inbound(), Err(PipelineError::Parse(_))));
    }

    #[test]
    fn parse_from_with_display_name() {
        let addr = parse_from_header("Jane Doe <jane@x.com>");
        assert_eq!(addr.name.as_deref(), Some("Jane Doe"));
        assert_eq!(addr.address.as_deref(), Some("jane@x.com"));
    }

    #[test]
    fn parse_from_empty() {
        assert_eq!(parse_from_header("  "), MailboxAddress::default());
    }

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<p>Hello <b>world</b></p>"), "Hello world");
    }

    #[test]
    fn address_list_with_names_and_groups() {
        assert_eq!(
            parse_address_list("\"Support, Team\" <Reachus@X.com>, other@y.com"),
            ["reachus@x.com", "other@y.com"]
        );
        assert_eq!(
            parse_address_list("Team: a@x.com, b@x.com;"),
            ["a@x.com", "b@x.com"]
        );
        assert!(parse_address_list(" ").is_empty());
    }
}
