//! External collaborators: mailbox, ticketing, replies, follow-up sink.
//!
//! Each collaborator is a trait so the watcher and scheduler can run
//! against fakes in tests.

pub mod email_types;
pub mod gmail;
pub mod notify;
pub mod reply;
pub mod ticketing;

pub use gmail::{GmailClient, Mailbox};
pub use notify::{FollowupNotice, FollowupSink, LogFollowupSink, WebhookFollowupSink};
pub use reply::{GmailReplySender, OutgoingEmail, ReplySender, SendReceipt, SmtpReplySender};
pub use ticketing::{PayloadOutbox, TicketReceipt, TicketSink, WebhookTicketSink};

use std::time::Duration;

use crate::error::ChannelError;

/// Shared HTTP client with a bounded per-request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ChannelError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ChannelError::Transport {
            name: "http".into(),
            reason: format!("Failed to build HTTP client: {e}"),
        })
}

/// Map a response to `ChannelError` unless it is 2xx.
///
/// 401 becomes `AuthExpired`; any other non-2xx becomes `Http`.
pub(crate) async fn ensure_success(
    name: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, ChannelError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ChannelError::AuthExpired { name: name.into() });
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ChannelError::Http {
        name: name.into(),
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    })
}

/// Parse and check an `http(s)` destination URL.
pub(crate) fn parse_destination(name: &str, raw: &str) -> Result<reqwest::Url, ChannelError> {
    let url = reqwest::Url::parse(raw).map_err(|e| ChannelError::InvalidDestination {
        name: name.into(),
        reason: format!("{raw}: {e}"),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ChannelError::InvalidDestination {
            name: name.into(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}
