//! Acknowledgement state machine: where a customer is in the refund flow.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Refund acknowledgement phases.
///
/// Progresses linearly: AwaitingUpi → UpiProvided → Completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AckState {
    AwaitingUpi,
    UpiProvided,
    Completed,
}

impl AckState {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: AckState) -> bool {
        use AckState::*;
        matches!(
            (self, target),
            (AwaitingUpi, UpiProvided) | (UpiProvided, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Get the next state in the linear progression, if any.
    pub fn next(&self) -> Option<AckState> {
        match self {
            Self::AwaitingUpi => Some(Self::UpiProvided),
            Self::UpiProvided => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingUpi => "AWAITING_UPI",
            Self::UpiProvided => "UPI_PROVIDED",
            Self::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for AckState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AckState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AWAITING_UPI" => Ok(Self::AwaitingUpi),
            "UPI_PROVIDED" => Ok(Self::UpiProvided),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(format!("unknown acknowledgement state: {other}")),
        }
    }
}

/// Store key: one live record per booking and customer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckKey {
    pub booking_id: String,
    pub customer_email: String,
}

impl AckKey {
    pub fn new(booking_id: impl Into<String>, customer_email: impl Into<String>) -> Self {
        Self {
            booking_id: booking_id.into(),
            customer_email: customer_email.into(),
        }
    }
}

impl std::fmt::Display for AckKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.booking_id, self.customer_email)
    }
}

/// Persisted acknowledgement record.
///
/// `next_followup_at` is set by the transition that schedules a message
/// and cleared when that message fires. `version` increments on every
/// write and guards compare-and-swap updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckRecord {
    pub booking_id: String,
    pub customer_email: String,
    pub state: AckState,
    pub ticket_reference: Option<String>,
    pub upi_id: Option<String>,
    pub next_followup_at: Option<DateTime<Utc>>,
    pub upi_prompt_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl AckRecord {
    /// Fresh record awaiting a UPI id, with a follow-up due at `followup_at`.
    pub fn new_awaiting(
        key: &AckKey,
        ticket_reference: Option<String>,
        now: DateTime<Utc>,
        followup_at: DateTime<Utc>,
    ) -> Self {
        Self {
            booking_id: key.booking_id.clone(),
            customer_email: key.customer_email.clone(),
            state: AckState::AwaitingUpi,
            ticket_reference,
            upi_id: None,
            next_followup_at: Some(followup_at),
            upi_prompt_sent_at: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            version: 0,
        }
    }

    pub fn key(&self) -> AckKey {
        AckKey::new(self.booking_id.clone(), self.customer_email.clone())
    }

    /// Whether a follow-up is scheduled at or before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.state.is_terminal() && self.next_followup_at.is_some_and(|at| at <= now)
    }

    /// Move to the next state. Errors on an invalid or terminal transition.
    pub fn advance(&mut self) -> Result<AckState, String> {
        let next = self
            .state
            .next()
            .ok_or_else(|| "Already at terminal state".to_string())?;
        if !self.state.can_transition_to(next) {
            return Err(format!("Cannot transition from {} to {}", self.state, next));
        }
        self.state = next;
        Ok(next)
    }
}
