//! Configuration types.
//!
//! Every component takes its config struct at construction. `main` builds
//! them once via `from_env()`; tests build them directly.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use tracing::warn;

/// Mailbox (Gmail API) configuration.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// Address the watcher polls for.
    pub watch_email: String,
    pub api_base: String,
    pub token_url: String,
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    /// Upper bound on ids returned per list call.
    pub max_results: u32,
    pub http_timeout: Duration,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            watch_email: "reachus.sherlox@gmail.com".to_string(),
            api_base: "https://gmail.googleapis.com/gmail/v1".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            access_token: None,
            refresh_token: None,
            client_id: None,
            client_secret: None,
            max_results: 50,
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl MailboxConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            watch_email: env_or("GMAIL_WATCH_EMAIL", &defaults.watch_email),
            api_base: env_or("GMAIL_API_BASE", &defaults.api_base),
            token_url: env_or("GMAIL_TOKEN_URL", &defaults.token_url),
            access_token: env_secret("GMAIL_ACCESS_TOKEN"),
            refresh_token: env_secret("GMAIL_REFRESH_TOKEN"),
            client_id: env_opt("GMAIL_CLIENT_ID"),
            client_secret: env_secret("GMAIL_CLIENT_SECRET"),
            max_results: env_parse("GMAIL_MAX_RESULTS", defaults.max_results),
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 10)),
        }
    }

    /// Whether an OAuth refresh-token exchange can be attempted.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }

    /// Whether any credential at all is present.
    pub fn has_credentials(&self) -> bool {
        self.access_token.is_some() || self.can_refresh()
    }

    /// Mailbox search query for unread mail sent to the watched address.
    pub fn unread_query(&self) -> String {
        format!("to:{} is:unread", self.watch_email)
    }
}

/// Ingestion watcher loop configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    /// Mark source messages read after a successful dispatch.
    pub mark_read: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            mark_read: true,
        }
    }
}

impl WatcherConfig {
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_secs(env_parse("GMAIL_POLL_INTERVAL", 60)),
            mark_read: env_parse("GMAIL_MARK_READ", true),
        }
    }
}

/// Ticket-creation collaborator configuration.
#[derive(Debug, Clone)]
pub struct TicketingConfig {
    /// Resolved webhook URL. `None` means no destination is configured.
    pub webhook_url: Option<String>,
    /// Local file the payload is appended to when no destination exists.
    pub outbox_path: PathBuf,
    pub http_timeout: Duration,
}

impl Default for TicketingConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            outbox_path: PathBuf::from("./data/saved_payloads.json"),
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl TicketingConfig {
    /// `AGENT_WEBHOOK_URL` wins; otherwise the per-`ENVIRONMENT` URL.
    pub fn from_env() -> Self {
        let environment = env_or("ENVIRONMENT", "local").to_lowercase();
        let webhook_url = env_opt("AGENT_WEBHOOK_URL").or_else(|| match environment.as_str() {
            "production" => env_opt("AGENT_WEBHOOK_URL_PRODUCTION"),
            "local" => Some(env_or("AGENT_WEBHOOK_URL_LOCAL", "http://localhost:5000/webhook")),
            _ => None,
        });
        Self {
            webhook_url: webhook_url.filter(|u| !u.trim().is_empty()),
            outbox_path: PathBuf::from(env_or(
                "RESOLVX_PAYLOAD_OUTBOX",
                "./data/saved_payloads.json",
            )),
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 10)),
        }
    }
}

/// SMTP relay settings for outbound replies.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

/// Outbound reply configuration.
#[derive(Debug, Clone)]
pub struct ReplyConfig {
    /// From address on replies.
    pub from_address: String,
    /// When set, replies go over SMTP instead of the Gmail send endpoint.
    pub smtp: Option<SmtpConfig>,
    /// Sign-off line of clarification replies.
    pub signature: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            from_address: "reachus.sherlox@gmail.com".to_string(),
            smtp: None,
            signature: "Sherlox Support Team".to_string(),
        }
    }
}

impl ReplyConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let smtp = env_opt("SMTP_HOST").map(|host| SmtpConfig {
            host,
            port: env_parse("SMTP_PORT", 587),
            username: env_or("SMTP_USERNAME", ""),
            password: SecretString::from(env_or("SMTP_PASSWORD", "")),
        });
        Self {
            from_address: env_or("GMAIL_REPLY_EMAIL", &defaults.from_address),
            smtp,
            signature: env_or("SUPPORT_SIGNATURE", &defaults.signature),
        }
    }
}

/// Acknowledgement follow-up configuration.
#[derive(Debug, Clone)]
pub struct FollowupConfig {
    /// Webhook the follow-up messages are POSTed to. `None` logs locally.
    pub webhook_url: Option<String>,
    pub poll_interval: Duration,
    /// Fixed delay between a transition and its follow-up message.
    pub delay: Duration,
    pub http_timeout: Duration,
}

impl Default for FollowupConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            poll_interval: Duration::from_secs(2),
            delay: Duration::from_secs(15),
            http_timeout: Duration::from_secs(5),
        }
    }
}

impl FollowupConfig {
    pub fn from_env() -> Self {
        Self {
            webhook_url: env_opt("FOLLOWUP_WEBHOOK"),
            poll_interval: Duration::from_secs(env_parse("FOLLOWUP_POLL_INTERVAL", 2)),
            delay: Duration::from_secs(env_parse("FOLLOWUP_DELAY_SECS", 15)),
            http_timeout: Duration::from_secs(env_parse("FOLLOWUP_HTTP_TIMEOUT_SECS", 5)),
        }
    }
}

/// HTTP server and storage configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Directory for rolling log files. `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or("WEBHOOK_HOST", "0.0.0.0"),
            port: env_parse("WEBHOOK_PORT", 5000),
            db_path: PathBuf::from(env_or("RESOLVX_DB_PATH", "./data/resolvx.db")),
            log_dir: env_opt("RESOLVX_LOG_DIR").map(PathBuf::from),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Env helpers ─────────────────────────────────────────────────────

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_secret(key: &str) -> Option<SecretString> {
    env_opt(key).map(SecretString::from)
}

/// Parse an env var, falling back to `default` (with a warning) on bad input.
fn env_parse<T: FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match env_opt(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default = %default, "Invalid config value, using default");
            default
        }),
    }
}
