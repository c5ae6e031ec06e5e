//! Error types for Resolvx.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Acknowledgement error: {0}")]
    Ack(#[from] AckError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures talking to an external collaborator (mailbox, ticketing,
/// reply transport, follow-up sink).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication expired for {name}")]
    AuthExpired { name: String },

    #[error("{name} returned HTTP {status}: {body}")]
    Http {
        name: String,
        status: u16,
        body: String,
    },

    #[error("{name} transport failure: {reason}")]
    Transport { name: String, reason: String },

    #[error("Invalid response from {name}: {reason}")]
    InvalidResponse { name: String, reason: String },

    #[error("Failed to send on {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("{name} is not configured")]
    NotConfigured { name: String },

    #[error("Invalid destination for {name}: {reason}")]
    InvalidDestination { name: String, reason: String },
}

impl ChannelError {
    /// Whether the failure may clear up on a later poll cycle.
    ///
    /// Missing configuration and invalid destinations never do.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::AuthExpired { .. } | Self::Transport { .. } | Self::SendFailed { .. } => true,
            Self::Http { status, .. } => *status != 400 && *status != 404,
            Self::InvalidResponse { .. }
            | Self::NotConfigured { .. }
            | Self::InvalidDestination { .. } => false,
        }
    }

    pub(crate) fn from_reqwest(name: &str, err: reqwest::Error) -> Self {
        Self::Transport {
            name: name.to_string(),
            reason: if err.is_timeout() {
                format!("request timed out: {err}")
            } else {
                err.to_string()
            },
        }
    }
}

/// Errors raised while handling a single inbound message.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Message parse failed: {0}")]
    Parse(String),

    #[error("Message fetch failed: {0}")]
    Fetch(#[source] ChannelError),

    #[error("Delivery failed: {0}")]
    Deliver(#[source] ChannelError),

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
}

/// Acknowledgement state machine errors.
#[derive(Debug, thiserror::Error)]
pub enum AckError {
    #[error("No acknowledgement for booking {booking_id} / {customer_email}")]
    NotFound {
        booking_id: String,
        customer_email: String,
    },

    #[error("Acknowledgement for booking {booking_id} / {customer_email} is in state {state}")]
    InvalidState {
        booking_id: String,
        customer_email: String,
        state: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The record kept changing under every write attempt.
    #[error("Acknowledgement for booking {booking_id} / {customer_email} is being updated, retry")]
    Contended {
        booking_id: String,
        customer_email: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
