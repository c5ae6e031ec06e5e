//! Shared types for the ingestion pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channels::email_types::parse_address_list;

/// Name used when no customer name could be extracted.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Address used when no customer email could be extracted.
pub const UNKNOWN_EMAIL: &str = "unknown@example.com";

// ── Inbound message ─────────────────────────────────────────────────

/// A fetched mailbox message, flattened to the parts the pipeline reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundEmail {
    /// Mailbox-native message id (the dedup key).
    pub message_id: String,
    pub thread_id: String,
    /// Raw `From` header, e.g. `Jane Doe <jane@x.com>`.
    pub from: String,
    /// Raw `To` header.
    pub to: String,
    pub subject: String,
    pub date: String,
    /// Concatenated text of every leaf body part.
    pub body: String,
}

impl InboundEmail {
    /// Whether `address` is one of the recipients in the `To` header.
    /// Compares whole addresses, case-insensitively.
    pub fn is_addressed_to(&self, address: &str) -> bool {
        let address = address.trim().to_lowercase();
        parse_address_list(&self.to).contains(&address)
    }
}

// ── Priority ────────────────────────────────────────────────────────

/// Case priority, derived from keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

// ── Case record ─────────────────────────────────────────────────────

/// Structured case extracted from one inbound message.
///
/// Serializes to the PascalCase payload the ticketing service accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CaseRecord {
    pub customer_name: String,
    pub customer_email: String,
    #[serde(rename = "CustomerPhoneNumber")]
    pub customer_phone: String,
    /// Never empty.
    #[serde(rename = "IssueDescription")]
    pub issue_text: String,
    pub priority: Priority,
    pub subject: String,
    #[serde(rename = "EmailMetadata")]
    pub metadata: CaseMetadata,
}

impl CaseRecord {
    pub fn has_known_email(&self) -> bool {
        !self.customer_email.is_empty() && self.customer_email != UNKNOWN_EMAIL
    }

    pub fn has_known_name(&self) -> bool {
        !self.customer_name.is_empty() && self.customer_name != UNKNOWN_NAME
    }
}

/// Raw headers and size facts carried alongside a case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CaseMetadata {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub date: String,
    #[serde(rename = "MessageID")]
    pub message_id: String,
    #[serde(rename = "ThreadID")]
    pub thread_id: String,
    pub has_subject: bool,
    pub subject_length: usize,
    pub body_length: usize,
    #[serde(rename = "ExtractedInfo", default)]
    pub extracted: ExtractionInfo,
}

/// Which fields were found in the message rather than defaulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionInfo {
    pub name_found: bool,
    pub email_found: bool,
    pub phone_found: bool,
    pub subject_found: bool,
}

// ── Validation ──────────────────────────────────────────────────────

/// Required case field that was absent or defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingField {
    CustomerEmail,
    CustomerName,
    IssueDescription,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CustomerEmail => write!(f, "CustomerEmail"),
            Self::CustomerName => write!(f, "CustomerName"),
            Self::IssueDescription => write!(f, "IssueDescription"),
        }
    }
}

/// Validator verdict for a case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub is_complaint: bool,
    /// In reporting order: email, name, issue.
    pub missing_fields: Vec<MissingField>,
}

impl Validation {
    pub fn has_required_info(&self) -> bool {
        self.missing_fields.is_empty()
    }

    /// Forward to ticketing only when both checks pass.
    pub fn is_actionable(&self) -> bool {
        self.is_complaint && self.has_required_info()
    }
}

// ── Watcher outcomes ────────────────────────────────────────────────

/// What the watcher did with a single listed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Ticket created on the ticketing service.
    Forwarded { ticket_reference: Option<String> },
    /// No usable ticketing destination; payload written to the local outbox.
    Outboxed { reason: String },
    /// Clarification reply sent.
    ClarificationSent,
    /// Clarification reply attempted and failed.
    ClarificationFailed { reason: String },
    /// Clarification needed but the sender address is unusable.
    ClarificationSkipped,
    /// Search matched but the `To` header does not name the watched address.
    NotAddressed,
    /// Per-message failure; dropped to keep the loop moving.
    Dropped { reason: String },
    /// Left unprocessed; retried on a later cycle.
    Deferred { reason: String },
}

impl MessageOutcome {
    /// Whether the message id goes into the processed set.
    pub fn marks_processed(&self) -> bool {
        !matches!(self, Self::Deferred { .. })
    }

    /// Short label persisted with the processed id.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Forwarded { .. } => "forwarded",
            Self::Outboxed { .. } => "outboxed",
            Self::ClarificationSent => "clarification_sent",
            Self::ClarificationFailed { .. } => "clarification_failed",
            Self::ClarificationSkipped => "clarification_skipped",
            Self::NotAddressed => "not_addressed",
            Self::Dropped { .. } => "dropped",
            Self::Deferred { .. } => "deferred",
        }
    }
}

/// Summary of one watcher poll cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Ids returned by the mailbox listing.
    pub listed: usize,
    /// Listed ids skipped because they were already processed.
    pub already_processed: usize,
    /// Per-message outcomes, in listing order.
    pub outcomes: Vec<(String, MessageOutcome)>,
}

impl CycleReport {
    pub fn count(&self, label: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.label() == label)
            .count()
    }

    /// Whether the cycle had any externally visible effect.
    pub fn is_noop(&self) -> bool {
        self.outcomes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_case() -> CaseRecord {
        CaseRecord {
            customer_name: "Jane Doe".into(),
            customer_email: "jane@x.com".into(),
            customer_phone: String::new(),
            issue_text: "My booking failed".into(),
            priority: Priority::High,
            subject: "Refund".into(),
            metadata: CaseMetadata {
                message_id: "m-1".into(),
                thread_id: "t-1".into(),
                ..CaseMetadata::default()
            },
        }
    }

    #[test]
    fn case_record_wire_format_is_pascal_case() {
        let json = serde_json::to_value(sample_case()).unwrap();
        assert_eq!(json["CustomerName"], "Jane Doe");
        assert_eq!(json["CustomerPhoneNumber"], "");
        assert_eq!(json["IssueDescription"], "My booking failed");
        assert_eq!(json["Priority"], "HIGH");
        assert_eq!(json["EmailMetadata"]["MessageID"], "m-1");
        assert_eq!(json["EmailMetadata"]["ThreadID"], "t-1");
        assert_eq!(json["EmailMetadata"]["ExtractedInfo"]["name_found"], false);
    }

    #[test]
    fn sentinels_are_not_known() {
        let mut case = sample_case();
        assert!(case.has_known_email());
        case.customer_email = UNKNOWN_EMAIL.into();
        case.customer_name = UNKNOWN_NAME.into();
        assert!(!case.has_known_email());
        assert!(!case.has_known_name());
    }

    #[test]
    fn addressed_to_is_case_insensitive() {
        let email = InboundEmail {
            to: "Support <ReachUs.Sherlox@Gmail.com>".into(),
            ..InboundEmail::default()
        };
        assert!(email.is_addressed_to("reachus.sherlox@gmail.com"));
        assert!(!email.is_addressed_to("other@gmail.com"));
    }

    #[test]
    fn addressed_to_matches_whole_addresses_only() {
        let lookalike = InboundEmail {
            to: "xreachus.sherlox@gmail.com".into(),
            ..InboundEmail::default()
        };
        assert!(!lookalike.is_addressed_to("reachus.sherlox@gmail.com"));

        let several = InboundEmail {
            to: "Support <Reachus.Sherlox@gmail.com>, other@x.com".into(),
            ..InboundEmail::default()
        };
        assert!(several.is_addressed_to("reachus.sherlox@gmail.com"));
        assert!(several.is_addressed_to("OTHER@x.com"));
        assert!(!several.is_addressed_to("gmail.com"));
    }

    #[test]
    fn only_deferred_leaves_message_unprocessed() {
        assert!(!MessageOutcome::Deferred { reason: "503".into() }.marks_processed());
        assert!(MessageOutcome::NotAddressed.marks_processed());
        assert!(MessageOutcome::ClarificationFailed { reason: "x".into() }.marks_processed());
        assert!(MessageOutcome::Dropped { reason: "x".into() }.marks_processed());
    }

    #[test]
    fn missing_field_names() {
        assert_eq!(MissingField::CustomerEmail.to_string(), "CustomerEmail");
        assert_eq!(MissingField::IssueDescription.to_string(), "IssueDescription");
    }
}
