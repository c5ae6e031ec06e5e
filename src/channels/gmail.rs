//! Gmail REST client: list, fetch, mark-read, send, and OAuth refresh.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::channels::email_types::{GmailMessage, MessageList, SendResponse, TokenResponse};
use crate::channels::{ensure_success, http_client};
use crate::config::MailboxConfig;
use crate::error::ChannelError;

const NAME: &str = "gmail";

/// Mailbox operations the ingestion watcher needs.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Message ids matching `query`, at most `max_results`, in listing order.
    async fn list_messages(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<String>, ChannelError>;

    /// Full message content.
    async fn get_message(&self, message_id: &str) -> Result<GmailMessage, ChannelError>;

    /// Remove the UNREAD label.
    async fn mark_read(&self, message_id: &str) -> Result<(), ChannelError>;

    /// Force an access-token refresh.
    async fn refresh_token(&self) -> Result<(), ChannelError>;
}

/// Gmail API client for the authenticated user (`me`).
pub struct GmailClient {
    config: MailboxConfig,
    http: reqwest::Client,
    access_token: RwLock<Option<SecretString>>,
}

impl GmailClient {
    pub fn new(config: MailboxConfig) -> Result<Self, ChannelError> {
        if !config.has_credentials() {
            warn!("Gmail credentials missing: set GMAIL_ACCESS_TOKEN or the GMAIL_REFRESH_TOKEN/CLIENT_ID/CLIENT_SECRET triple");
        }
        let http = http_client(config.http_timeout)?;
        let access_token = RwLock::new(config.access_token.clone());
        Ok(Self {
            config,
            http,
            access_token,
        })
    }

    pub fn config(&self) -> &MailboxConfig {
        &self.config
    }

    fn messages_url(&self) -> String {
        format!("{}/users/me/messages", self.config.api_base.trim_end_matches('/'))
    }

    /// Current access token, refreshing first if none is cached.
    async fn bearer(&self) -> Result<String, ChannelError> {
        if let Some(token) = self.access_token.read().await.as_ref() {
            return Ok(token.expose_secret().to_string());
        }
        self.refresh_token().await?;
        self.access_token
            .read()
            .await
            .as_ref()
            .map(|t| t.expose_secret().to_string())
            .ok_or_else(|| ChannelError::NotConfigured { name: NAME.into() })
    }

    /// Send a base64url-encoded RFC 822 message.
    pub async fn send_raw(
        &self,
        raw: String,
        thread_id: Option<&str>,
    ) -> Result<SendResponse, ChannelError> {
        let mut body = serde_json::json!({ "raw": raw });
        if let Some(thread_id) = thread_id {
            body["threadId"] = serde_json::Value::String(thread_id.to_string());
        }

        let resp = self
            .http
            .post(format!("{}/send", self.messages_url()))
            .bearer_auth(self.bearer().await?)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::from_reqwest(NAME, e))?;
        let resp = ensure_success(NAME, resp).await?;

        resp.json::<SendResponse>()
            .await
            .map_err(|e| ChannelError::InvalidResponse {
                name: NAME.into(),
                reason: format!("send response: {e}"),
            })
    }
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn list_messages(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<String>, ChannelError> {
        let resp = self
            .http
            .get(self.messages_url())
            .bearer_auth(self.bearer().await?)
            .query(&[("q", query.to_string()), ("maxResults", max_results.to_string())])
            .send()
            .await
            .map_err(|e| ChannelError::from_reqwest(NAME, e))?;
        let resp = ensure_success(NAME, resp).await?;

        let list: MessageList = resp.json().await.map_err(|e| ChannelError::InvalidResponse {
            name: NAME.into(),
            reason: format!("message list: {e}"),
        })?;
        debug!(count = list.messages.len(), query, "Listed messages");
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    async fn get_message(&self, message_id: &str) -> Result<GmailMessage, ChannelError> {
        let resp = self
            .http
            .get(format!("{}/{message_id}", self.messages_url()))
            .bearer_auth(self.bearer().await?)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| ChannelError::from_reqwest(NAME, e))?;
        let resp = ensure_success(NAME, resp).await?;

        resp.json().await.map_err(|e| ChannelError::InvalidResponse {
            name: NAME.into(),
            reason: format!("message {message_id}: {e}"),
        })
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), ChannelError> {
        let resp = self
            .http
            .post(format!("{}/{message_id}/modify", self.messages_url()))
            .bearer_auth(self.bearer().await?)
            .json(&serde_json::json!({ "removeLabelIds": ["UNREAD"] }))
            .send()
            .await
            .map_err(|e| ChannelError::from_reqwest(NAME, e))?;
        ensure_success(NAME, resp).await?;
        debug!(message_id, "Marked message read");
        Ok(())
    }

    async fn refresh_token(&self) -> Result<(), ChannelError> {
        let (Some(refresh), Some(client_id), Some(secret)) = (
            self.config.refresh_token.as_ref(),
            self.config.client_id.as_ref(),
            self.config.client_secret.as_ref(),
        ) else {
            warn!("Gmail token refresh requested but refresh credentials are not configured");
            return Err(ChannelError::NotConfigured { name: NAME.into() });
        };

        let resp = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", secret.expose_secret()),
                ("refresh_token", refresh.expose_secret()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| ChannelError::from_reqwest("gmail-oauth", e))?;
        let resp = ensure_success("gmail-oauth", resp).await?;

        let token: TokenResponse = resp.json().await.map_err(|e| ChannelError::InvalidResponse {
            name: "gmail-oauth".into(),
            reason: format!("token response: {e}"),
        })?;

        *self.access_token.write().await = Some(SecretString::from(token.access_token));
        info!(expires_in = ?token.expires_in, "Gmail access token refreshed");
        Ok(())
    }
}
