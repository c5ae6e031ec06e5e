//! Ticket creation over an HTTP webhook, with a local JSON outbox for
//! cases that have nowhere to go.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::channels::{ensure_success, http_client, parse_destination};
use crate::config::TicketingConfig;
use crate::error::ChannelError;
use crate::pipeline::types::CaseRecord;

const NAME: &str = "ticketing";

/// Result of a successful ticket creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketReceipt {
    pub status: u16,
    pub ticket_reference: Option<String>,
}

/// Ticket-creation collaborator.
#[async_trait]
pub trait TicketSink: Send + Sync {
    async fn create_ticket(&self, case: &CaseRecord) -> Result<TicketReceipt, ChannelError>;
}

/// POSTs the case payload as JSON to a configured webhook.
pub struct WebhookTicketSink {
    url: Option<String>,
    http: reqwest::Client,
}

impl WebhookTicketSink {
    pub fn new(config: &TicketingConfig) -> Result<Self, ChannelError> {
        if config.webhook_url.is_none() {
            warn!(
                outbox = %config.outbox_path.display(),
                "No ticketing webhook configured; cases will be written to the outbox"
            );
        }
        Ok(Self {
            url: config.webhook_url.clone(),
            http: http_client(config.http_timeout)?,
        })
    }
}

#[async_trait]
impl TicketSink for WebhookTicketSink {
    async fn create_ticket(&self, case: &CaseRecord) -> Result<TicketReceipt, ChannelError> {
        let raw = self
            .url
            .as_deref()
            .ok_or_else(|| ChannelError::NotConfigured { name: NAME.into() })?;
        let url = parse_destination(NAME, raw)?;

        let resp = self
            .http
            .post(url)
            .json(case)
            .send()
            .await
            .map_err(|e| ChannelError::from_reqwest(NAME, e))?;
        let resp = ensure_success(NAME, resp).await?;
        let status = resp.status().as_u16();

        let body = resp.text().await.unwrap_or_default();
        let ticket_reference = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .as_ref()
            .and_then(ticket_reference_from);

        info!(
            status,
            ticket_reference = ?ticket_reference,
            customer = %case.customer_email,
            "Ticket created"
        );
        Ok(TicketReceipt {
            status,
            ticket_reference,
        })
    }
}

/// Pull a ticket reference out of a webhook response body.
fn ticket_reference_from(body: &serde_json::Value) -> Option<String> {
    ["ticketReference", "ticket_reference", "TicketReference", "ticketId"]
        .iter()
        .find_map(|k| body.get(k))
        .and_then(|v| match v {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

// ── Outbox ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct OutboxFile {
    #[serde(default)]
    payloads: Vec<OutboxEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub timestamp: String,
    pub payload: CaseRecord,
    pub metadata: serde_json::Value,
}

/// Append-only JSON file of undeliverable case payloads.
pub struct PayloadOutbox {
    path: PathBuf,
}

impl PayloadOutbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `case` with the reason it was not delivered.
    pub async fn append(&self, case: &CaseRecord, reason: &str) -> Result<(), ChannelError> {
        let io_err = |e: std::io::Error| ChannelError::SendFailed {
            name: "outbox".into(),
            reason: format!("{}: {e}", self.path.display()),
        };

        let mut file = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => match serde_json::from_str::<OutboxFile>(&text) {
                Ok(file) => file,
                Err(e) => {
                    // Keep the unreadable file for inspection; never overwrite it.
                    let aside = self.corrupt_path(Utc::now().timestamp());
                    tokio::fs::rename(&self.path, &aside).await.map_err(io_err)?;
                    warn!(
                        path = %self.path.display(),
                        moved_to = %aside.display(),
                        "Outbox unreadable, moved aside and starting fresh: {e}"
                    );
                    OutboxFile::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => OutboxFile::default(),
            Err(e) => return Err(io_err(e)),
        };

        let now = Utc::now().to_rfc3339();
        file.payloads.push(OutboxEntry {
            timestamp: now.clone(),
            payload: case.clone(),
            metadata: serde_json::json!({ "saved_at": now, "reason": reason }),
        });

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(&file).map_err(|e| ChannelError::SendFailed {
            name: "outbox".into(),
            reason: e.to_string(),
        })?;
        tokio::fs::write(&self.path, text).await.map_err(io_err)?;

        info!(path = %self.path.display(), count = file.payloads.len(), "Payload saved to outbox");
        Ok(())
    }

    /// Where an unreadable outbox is moved: `<file>.corrupt-<unix secs>`.
    fn corrupt_path(&self, unix_secs: i64) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".corrupt-{unix_secs}"));
        self.path.with_file_name(name)
    }

    /// Every entry currently in the outbox.
    pub async fn entries(&self) -> Result<Vec<OutboxEntry>, ChannelError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_json::from_str::<OutboxFile>(&text)
                .map(|f| f.payloads)
                .map_err(|e| ChannelError::InvalidResponse {
                    name: "outbox".into(),
                    reason: e.to_string(),
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(ChannelError::SendFailed {
                name: "outbox".into(),
                reason: e.to_string(),
            }),
        }
    }
}
