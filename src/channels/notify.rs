//! Follow-up delivery: webhook sink, or log output when none is configured.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::channels::{ensure_success, http_client, parse_destination};
use crate::config::FollowupConfig;
use crate::error::ChannelError;

const NAME: &str = "followup";

/// Wire payload for one follow-up message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowupNotice {
    pub booking_id: String,
    pub customer_email: String,
    pub message: String,
}

/// Generic "notify" capability for scheduled follow-ups.
#[async_trait]
pub trait FollowupSink: Send + Sync {
    async fn notify(&self, notice: &FollowupNotice) -> Result<(), ChannelError>;
}

/// POSTs `{bookingId, customerEmail, message}` to a webhook.
pub struct WebhookFollowupSink {
    url: reqwest::Url,
    http: reqwest::Client,
}

impl WebhookFollowupSink {
    pub fn new(url: &str, config: &FollowupConfig) -> Result<Self, ChannelError> {
        Ok(Self {
            url: parse_destination(NAME, url)?,
            http: http_client(config.http_timeout)?,
        })
    }
}

#[async_trait]
impl FollowupSink for WebhookFollowupSink {
    async fn notify(&self, notice: &FollowupNotice) -> Result<(), ChannelError> {
        let resp = self
            .http
            .post(self.url.clone())
            .json(notice)
            .send()
            .await
            .map_err(|e| ChannelError::from_reqwest(NAME, e))?;
        ensure_success(NAME, resp).await?;
        info!(booking_id = %notice.booking_id, customer = %notice.customer_email, "Follow-up delivered");
        Ok(())
    }
}

/// Local fallback: writes the follow-up to the log.
pub struct LogFollowupSink;

#[async_trait]
impl FollowupSink for LogFollowupSink {
    async fn notify(&self, notice: &FollowupNotice) -> Result<(), ChannelError> {
        info!(
            target: "followup",
            booking_id = %notice.booking_id,
            customer = %notice.customer_email,
            "{}",
            notice.message
        );
        Ok(())
    }
}

/// Webhook sink when a URL is configured (and valid), otherwise the log sink.
pub fn sink_from_config(config: &FollowupConfig) -> Arc<dyn FollowupSink> {
    match config.webhook_url.as_deref() {
        Some(url) => match WebhookFollowupSink::new(url, config) {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                warn!("Follow-up webhook unusable, falling back to log output: {e}");
                Arc::new(LogFollowupSink)
            }
        },
        None => {
            warn!("FOLLOWUP_WEBHOOK not set; follow-ups will be logged only");
            Arc::new(LogFollowupSink)
        }
    }
}
