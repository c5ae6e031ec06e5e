//! Outbound replies: Gmail API send or SMTP via lettre.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::info;

use crate::channels::email_types::encode_base64url;
use crate::channels::gmail::GmailClient;
use crate::config::{ReplyConfig, SmtpConfig};
use crate::error::ChannelError;

/// A plain-text email to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Source message id for `In-Reply-To` / `References`.
    pub in_reply_to: Option<String>,
    /// Mailbox thread to file the reply under, when the transport supports it.
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// Generic "send message" capability.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<SendReceipt, ChannelError>;
}

/// Build the RFC 822 message for `email`.
pub fn build_message(
    name: &str,
    from: &str,
    email: &OutgoingEmail,
) -> Result<Message, ChannelError> {
    let mut builder = Message::builder()
        .from(from.parse().map_err(|e| ChannelError::SendFailed {
            name: name.into(),
            reason: format!("Invalid from address: {e}"),
        })?)
        .to(email.to.parse().map_err(|e| ChannelError::InvalidDestination {
            name: name.into(),
            reason: format!("Invalid to address: {e}"),
        })?)
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_PLAIN);

    if let Some(id) = &email.in_reply_to {
        builder = builder.in_reply_to(id.clone()).references(id.clone());
    }

    builder
        .body(email.body.clone())
        .map_err(|e| ChannelError::SendFailed {
            name: name.into(),
            reason: format!("Failed to build email: {e}"),
        })
}

// ── Gmail API ───────────────────────────────────────────────────────

/// Sends through the Gmail `messages/send` endpoint.
pub struct GmailReplySender {
    client: Arc<GmailClient>,
    from_address: String,
}

impl GmailReplySender {
    pub fn new(client: Arc<GmailClient>, config: &ReplyConfig) -> Self {
        Self {
            client,
            from_address: config.from_address.clone(),
        }
    }
}

#[async_trait]
impl ReplySender for GmailReplySender {
    async fn send(&self, email: &OutgoingEmail) -> Result<SendReceipt, ChannelError> {
        let message = build_message("gmail", &self.from_address, email)?;
        let raw = encode_base64url(&message.formatted());
        let resp = self.client.send_raw(raw, email.thread_id.as_deref()).await?;
        info!(to = %email.to, message_id = ?resp.id, "Reply sent via Gmail");
        Ok(SendReceipt { message_id: resp.id })
    }
}

// ── SMTP ────────────────────────────────────────────────────────────

/// Sends through an SMTP relay.
pub struct SmtpReplySender {
    smtp: SmtpConfig,
    from_address: String,
}

impl SmtpReplySender {
    pub fn new(smtp: SmtpConfig, from_address: String) -> Self {
        Self { smtp, from_address }
    }

    fn send_blocking(&self, message: &Message) -> Result<(), ChannelError> {
        let creds = Credentials::new(
            self.smtp.username.clone(),
            self.smtp.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&self.smtp.host)
            .map_err(|e| ChannelError::SendFailed {
                name: "smtp".into(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(self.smtp.port)
            .credentials(creds)
            .build();

        transport.send(message).map_err(|e| ChannelError::SendFailed {
            name: "smtp".into(),
            reason: format!("SMTP send failed: {e}"),
        })?;
        Ok(())
    }
}

#[async_trait]
impl ReplySender for SmtpReplySender {
    async fn send(&self, email: &OutgoingEmail) -> Result<SendReceipt, ChannelError> {
        let message = build_message("smtp", &self.from_address, email)?;
        let message_id = message
            .headers()
            .get_raw("Message-ID")
            .map(str::to_string);

        let sender = Self::new(self.smtp.clone(), self.from_address.clone());
        tokio::task::spawn_blocking(move || sender.send_blocking(&message))
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "smtp".into(),
                reason: format!("SMTP task panicked: {e}"),
            })??;

        info!(to = %email.to, "Reply sent via SMTP");
        Ok(SendReceipt { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "jane@x.com".into(),
            subject: "Re: Hours".into(),
            body: "Dear Jane,\n\nThanks.".into(),
            in_reply_to: Some("<m-7@mail.gmail.com>".into()),
            thread_id: None,
        }
    }

    #[test]
    fn message_carries_threading_headers() {
        let msg = build_message("test", "support@example.com", &email()).unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("In-Reply-To: <m-7@mail.gmail.com>"));
        assert!(raw.contains("References: <m-7@mail.gmail.com>"));
        assert!(raw.contains("Subject: Re: Hours"));
        assert!(raw.contains("To: jane@x.com"));
    }

    #[test]
    fn invalid_recipient_is_an_invalid_destination() {
        let mut e = email();
        e.to = "not an address".into();
        assert!(matches!(
            build_message("test", "support@example.com", &e),
            Err(ChannelError::InvalidDestination { .. })
        ));
    }
}
