//! Case validation rules.
//!
//! Decides whether an extracted case is actionable (a complaint or issue
//! with enough information to open a ticket) or needs a clarification
//! reply. Keyword matching is case-insensitive substring matching over
//! `subject + " " + body`.

use std::sync::Arc;

use tracing::debug;

use crate::pipeline::extract::Extractor;
use crate::pipeline::types::{CaseRecord, MissingField, Validation};

/// Keywords that mark a message as a complaint or support issue.
pub const COMPLAINT_KEYWORDS: &[&str] = &[
    "complaint",
    "complain",
    "issue",
    "problem",
    "error",
    "bug",
    "broken",
    "not working",
    "failed",
    "failure",
    "refund",
    "cancel",
    "cancelled",
    "disappointed",
    "unhappy",
    "unsatisfied",
    "wrong",
    "incorrect",
    "fix",
    "repair",
    "resolve",
    "help",
    "support",
    "assistance",
];

/// Filtered issue text longer than this counts as a substantive issue.
const SUBSTANTIAL_ISSUE_CHARS: usize = 50;

/// Minimum issue text length for a ticket.
const MIN_ISSUE_CHARS: usize = 20;

/// Keyword and completeness rules for inbound cases.
pub struct CaseValidator {
    extractor: Arc<Extractor>,
    complaint_keywords: Vec<String>,
}

impl CaseValidator {
    /// Validator with the standard complaint keyword set.
    pub fn default_rules(extractor: Arc<Extractor>) -> Self {
        Self {
            extractor,
            complaint_keywords: COMPLAINT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Add a complaint keyword (matched case-insensitively).
    pub fn add_keyword(&mut self, keyword: &str) {
        self.complaint_keywords.push(keyword.to_lowercase());
    }

    /// Keyword hit in subject or body, or a substantive filtered body.
    pub fn is_complaint_or_issue(&self, text: &str, subject: &str) -> bool {
        let combined = format!("{subject} {text}").to_lowercase();
        if let Some(keyword) = self
            .complaint_keywords
            .iter()
            .find(|k| combined.contains(k.as_str()))
        {
            debug!(keyword = %keyword, "Complaint keyword matched");
            return true;
        }

        let issue = self.extractor.extract_issue_text(text);
        issue.trim().chars().count() > SUBSTANTIAL_ISSUE_CHARS
    }

    /// Required fields present, with the missing ones in email, name, issue order.
    pub fn has_required_info(&self, case: &CaseRecord) -> (bool, Vec<MissingField>) {
        let mut missing = Vec::new();
        if !case.has_known_email() {
            missing.push(MissingField::CustomerEmail);
        }
        if !case.has_known_name() {
            missing.push(MissingField::CustomerName);
        }
        if case.issue_text.trim().chars().count() < MIN_ISSUE_CHARS {
            missing.push(MissingField::IssueDescription);
        }
        (missing.is_empty(), missing)
    }

    /// Full verdict for a case extracted from `text` / `subject`.
    pub fn validate(&self, text: &str, subject: &str, case: &CaseRecord) -> Validation {
        let (_, missing_fields) = self.has_required_info(case);
        Validation {
            is_complaint: self.is_complaint_or_issue(text, subject),
            missing_fields,
        }
    }
}
