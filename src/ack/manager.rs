//! Entry points of the refund acknowledgement flow.
//!
//! `acknowledge` opens (or restarts) a record; `submit_upi` advances it.
//! Neither sends the follow-up itself: each schedules `next_followup_at`
//! and the scheduler delivers it when due.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ack::state::{AckKey, AckRecord, AckState};
use crate::config::FollowupConfig;
use crate::error::AckError;
use crate::store::Database;

/// Follow-up sent when the customer's UPI id is needed.
pub const UPI_PROMPT_MESSAGE: &str =
    "The refund is on hold as the UPI ID for the given customer is inactive, kindly provide correct UPI ID";

/// Follow-up sent once the refund has been reinitiated.
pub fn reinitiated_message(ticket_reference: Option<&str>) -> String {
    match ticket_reference {
        Some(r) => format!("The refund is reinitiated; track the refund with ticket reference {r}"),
        None => "The refund is reinitiated".to_string(),
    }
}

/// Result of a manager call: what to tell the caller now, and what will
/// follow later.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckOutcome {
    /// Immediate message for the customer.
    pub message: String,
    /// Description of the scheduled follow-up.
    pub followup: ScheduledFollowup,
    pub record: AckRecord,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledFollowup {
    pub due_at: DateTime<Utc>,
    pub message: String,
}

/// Read-check-write rounds `submit_upi` makes before giving up.
const SUBMIT_ATTEMPTS: usize = 3;

pub struct AckManager {
    db: Arc<dyn Database>,
    delay: chrono::Duration,
}

impl AckManager {
    pub fn new(db: Arc<dyn Database>, config: &FollowupConfig) -> Self {
        let delay = chrono::Duration::from_std(config.delay).unwrap_or_else(|_| {
            warn!(delay = ?config.delay, "Follow-up delay out of range, using 15s");
            chrono::Duration::seconds(15)
        });
        Self { db, delay }
    }

    pub fn delay(&self) -> chrono::Duration {
        self.delay
    }

    /// Start the flow for a booking. Overwrites any existing record for
    /// the key.
    pub async fn acknowledge(
        &self,
        booking_id: &str,
        customer_email: &str,
        ticket_reference: Option<&str>,
    ) -> Result<AckOutcome, AckError> {
        self.acknowledge_at(booking_id, customer_email, ticket_reference, Utc::now())
            .await
    }

    pub async fn acknowledge_at(
        &self,
        booking_id: &str,
        customer_email: &str,
        ticket_reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AckOutcome, AckError> {
        let key = validated_key(booking_id, customer_email)?;
        let ticket_reference = ticket_reference
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        let due_at = now + self.delay;

        let record = AckRecord::new_awaiting(&key, ticket_reference.clone(), now, due_at);
        let stored = self.db.put_ack(&record).await?;
        info!(booking_id = %key.booking_id, customer = %key.customer_email, "Refund acknowledged");

        let mut message = format!(
            "We have acknowledged your refund request for booking {}.",
            key.booking_id
        );
        if let Some(r) = &ticket_reference {
            message.push_str(&format!(" Your ticket reference is {r}."));
        }
        message.push_str(" We will connect with the bank and respond on the refund status.");

        Ok(AckOutcome {
            message,
            followup: ScheduledFollowup {
                due_at,
                message: UPI_PROMPT_MESSAGE.to_string(),
            },
            record: stored,
        })
    }

    /// Record the customer's UPI id and schedule the reinitiation notice.
    ///
    /// Fails unless a record exists and is still awaiting a UPI id. The
    /// state check and the write are one compare-and-swap, so of two
    /// concurrent submissions at most one succeeds. A lost swap is retried
    /// while the record is still awaiting a UPI id.
    pub async fn submit_upi(
        &self,
        booking_id: &str,
        customer_email: &str,
        upi_id: &str,
    ) -> Result<AckOutcome, AckError> {
        self.submit_upi_at(booking_id, customer_email, upi_id, Utc::now())
            .await
    }

    pub async fn submit_upi_at(
        &self,
        booking_id: &str,
        customer_email: &str,
        upi_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AckOutcome, AckError> {
        let key = validated_key(booking_id, customer_email)?;
        let upi_id = upi_id.trim();
        if upi_id.is_empty() {
            return Err(AckError::InvalidRequest("upiId is required".into()));
        }

        let due_at = now + self.delay;
        let mut stored = None;
        for attempt in 1..=SUBMIT_ATTEMPTS {
            let current = self.db.get_ack(&key).await?.ok_or_else(|| not_found(&key))?;
            if current.state != AckState::AwaitingUpi {
                return Err(invalid_state(&key, current.state));
            }

            let mut next = current.clone();
            next.advance().map_err(AckError::InvalidRequest)?;
            next.upi_id = Some(upi_id.to_string());
            next.updated_at = now;
            next.next_followup_at = Some(due_at);

            stored = self.db.compare_and_swap_ack(current.version, &next).await?;
            if stored.is_some() {
                break;
            }
            // Another writer got in first; re-read and check the state again.
            debug!(booking_id = %key.booking_id, attempt, "UPI write conflicted, retrying");
        }
        let Some(stored) = stored else {
            warn!(booking_id = %key.booking_id, customer = %key.customer_email, "UPI write kept conflicting");
            return Err(AckError::Contended {
                booking_id: key.booking_id.clone(),
                customer_email: key.customer_email.clone(),
            });
        };

        info!(booking_id = %key.booking_id, customer = %key.customer_email, "UPI id received");

        Ok(AckOutcome {
            message: format!(
                "Thank you, we have received your UPI ID {upi_id}. We will reinitiate the refund shortly."
            ),
            followup: ScheduledFollowup {
                due_at,
                message: reinitiated_message(stored.ticket_reference.as_deref()),
            },
            record: stored,
        })
    }

    pub async fn get(&self, key: &AckKey) -> Result<Option<AckRecord>, AckError> {
        Ok(self.db.get_ack(key).await?)
    }

    pub async fn list(&self) -> Result<Vec<AckRecord>, AckError> {
        Ok(self.db.list_acks().await?)
    }
}

fn validated_key(booking_id: &str, customer_email: &str) -> Result<AckKey, AckError> {
    let booking_id = booking_id.trim();
    let customer_email = customer_email.trim();
    if booking_id.is_empty() {
        return Err(AckError::InvalidRequest("bookingId is required".into()));
    }
    if customer_email.is_empty() {
        return Err(AckError::InvalidRequest("customerEmail is required".into()));
    }
    Ok(AckKey::new(booking_id, customer_email))
}

fn not_found(key: &AckKey) -> AckError {
    AckError::NotFound {
        booking_id: key.booking_id.clone(),
        customer_email: key.customer_email.clone(),
    }
}

fn invalid_state(key: &AckKey, state: AckState) -> AckError {
    AckError::InvalidState {
        booking_id: key.booking_id.clone(),
        customer_email: key.customer_email.clone(),
        state: state.to_string(),
    }
}
