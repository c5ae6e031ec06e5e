//! Heuristic case extraction from free-form email text.
//!
//! Pure string work, no I/O. Every field degrades to a sentinel rather
//! than failing:
//! - name → `"Unknown"`
//! - email → `"unknown@example.com"`
//! - phone → empty
//! - issue text → full trimmed body

use regex::Regex;

use crate::channels::email_types::parse_from_header;
use crate::pipeline::types::{
    CaseMetadata, CaseRecord, ExtractionInfo, InboundEmail, Priority, UNKNOWN_EMAIL,
    UNKNOWN_NAME,
};

/// Keywords that force HIGH priority.
pub const HIGH_PRIORITY_KEYWORDS: &[&str] = &[
    "urgent",
    "emergency",
    "critical",
    "asap",
    "immediately",
    "refund",
    "cancel",
    "cancelled",
    "complaint",
    "issue",
    "problem",
    "error",
    "broken",
    "not working",
    "failed",
];

/// Keywords that mark LOW priority when no HIGH keyword is present.
pub const LOW_PRIORITY_KEYWORDS: &[&str] = &[
    "question",
    "inquiry",
    "info",
    "information",
    "general",
    "feedback",
    "suggestion",
];

/// Subject keywords that earn a `[Subject: ...]` tag on the issue text.
pub const SUBJECT_TAG_KEYWORDS: &[&str] = &[
    "urgent",
    "complaint",
    "issue",
    "problem",
    "refund",
    "cancel",
    "error",
];

/// Issue text used when the message has no readable content at all.
const NO_CONTENT: &str = "(no readable content)";

/// How many leading non-empty lines are scanned for a bare name.
const BARE_NAME_LINES: usize = 5;

/// Compiled extraction patterns.
pub struct Extractor {
    email: Regex,
    phone: Regex,
    intro_name: Regex,
    signoff_name: Regex,
    bare_name: Regex,
    greeting_line: Regex,
    signoff_line: Regex,
    intro_line: Regex,
    header_line: Regex,
}

impl Extractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            email: Regex::new(r"[\w.\-]+@[\w.\-]+\.[A-Za-z]{2,}")?,
            phone: Regex::new(r"\+?\d[\d \t\-()]{6,}\d")?,
            intro_name: Regex::new(r"\bI(?:'m| am) ([A-Z][A-Za-z \t'`\-.]{1,60})")?,
            signoff_name: Regex::new(
                r"(?i:regards|best|thanks|sincerely)[,\s]*\n\s*([A-Z][A-Za-z \t\-.]{1,60})",
            )?,
            bare_name: Regex::new(r"^[A-Z][A-Za-z \t'\-.]{1,60}$")?,
            greeting_line: Regex::new(
                r"(?i)^(hi|hello|dear|good morning|good afternoon|good evening)\b",
            )?,
            signoff_line: Regex::new(r"(?i)^(regards|best|thanks|thank you|sincerely|yours)\b")?,
            intro_line: Regex::new(r"(?i)^I(?:'m| am) ")?,
            header_line: Regex::new(r"(?i)^(from:|to:|subject:|sent:|date:)")?,
        })
    }

    /// Build a case from a fetched mailbox message, carrying its headers.
    pub fn extract_message(&self, msg: &InboundEmail) -> CaseRecord {
        let mut case = self.extract(&msg.body, &msg.from, &msg.subject);
        case.metadata.to = msg.to.clone();
        case.metadata.date = msg.date.clone();
        case.metadata.message_id = msg.message_id.clone();
        case.metadata.thread_id = msg.thread_id.clone();
        case
    }

    /// Build a best-effort case record. Never fails.
    pub fn extract(&self, text: &str, from_header: &str, subject: &str) -> CaseRecord {
        let from = parse_from_header(from_header);

        let email = from
            .address
            .clone()
            .or_else(|| self.extract_email(text));
        let name = self.extract_name(text, from.name.as_deref());
        let phone = self.extract_phone(text);

        let mut issue_text = self.extract_issue_text(text);
        if subject_warrants_tag(subject) {
            issue_text = format!("[Subject: {subject}] {issue_text}");
        }

        let has_subject = !subject.trim().is_empty();
        let extracted = ExtractionInfo {
            name_found: name.is_some(),
            email_found: email.is_some(),
            phone_found: phone.is_some(),
            subject_found: has_subject,
        };

        CaseRecord {
            customer_name: name.unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            customer_email: email.unwrap_or_else(|| UNKNOWN_EMAIL.to_string()),
            customer_phone: phone.unwrap_or_default(),
            issue_text,
            priority: determine_priority(text, subject),
            subject: subject.to_string(),
            metadata: CaseMetadata {
                from: from_header.to_string(),
                subject: subject.to_string(),
                has_subject,
                subject_length: subject.chars().count(),
                body_length: text.chars().count(),
                extracted,
                ..CaseMetadata::default()
            },
        }
    }

    /// First address-shaped token in `text`.
    pub fn extract_email(&self, text: &str) -> Option<String> {
        self.email.find(text).map(|m| m.as_str().to_string())
    }

    /// First phone-shaped run in `text` (at least 8 digit-bearing chars).
    pub fn extract_phone(&self, text: &str) -> Option<String> {
        self.phone.find(text).map(|m| m.as_str().trim().to_string())
    }

    /// Customer name, in preference order:
    /// 1. `From` display name
    /// 2. `I am <Name>` / `I'm <Name>` in the body
    /// 3. the line after a sign-off (`Regards`, `Best`, ...)
    /// 4. a bare name among the first few non-empty lines
    pub fn extract_name(&self, text: &str, display_name: Option<&str>) -> Option<String> {
        if let Some(name) = display_name.map(str::trim).filter(|n| !n.is_empty()) {
            return Some(name.to_string());
        }

        if let Some(name) = self
            .intro_name
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| clean_name(m.as_str()))
        {
            return Some(name);
        }

        if let Some(name) = self
            .signoff_name
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| clean_name(m.as_str()))
        {
            return Some(name);
        }

        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(BARE_NAME_LINES)
            .find(|l| !self.email.is_match(l) && self.bare_name.is_match(l))
            .and_then(clean_name)
    }

    /// Body with greetings, contact lines, headers and signature removed,
    /// joined with single spaces. Falls back to the whole trimmed body.
    pub fn extract_issue_text(&self, text: &str) -> String {
        let mut kept: Vec<&str> = Vec::new();

        for line in text.lines().map(str::trim) {
            if line.is_empty() || self.greeting_line.is_match(line) {
                continue;
            }
            // Sign-off ends the body.
            if self.signoff_line.is_match(line) {
                break;
            }
            if self.email.is_match(line)
                || self.phone.is_match(line)
                || self.intro_line.is_match(line)
                || self.header_line.is_match(line)
            {
                continue;
            }
            kept.push(line);
        }

        let joined = kept.join(" ");
        let joined = joined.trim();
        if !joined.is_empty() {
            return joined.to_string();
        }

        let whole = text.trim();
        if whole.is_empty() {
            NO_CONTENT.to_string()
        } else {
            whole.to_string()
        }
    }
}

/// Keyword priority over `subject + " " + body`.
///
/// HIGH wins outright. LOW applies only when the combined text carries
/// no HIGH keyword at all, re-checked independently of the first pass.
pub fn determine_priority(text: &str, subject: &str) -> Priority {
    let combined = format!("{subject} {text}").to_lowercase();
    let has_high = |c: &str| HIGH_PRIORITY_KEYWORDS.iter().any(|k| c.contains(k));

    if has_high(&combined) {
        return Priority::High;
    }

    for keyword in LOW_PRIORITY_KEYWORDS {
        if combined.contains(keyword) && !has_high(&combined) {
            return Priority::Low;
        }
    }

    Priority::Medium
}

fn subject_warrants_tag(subject: &str) -> bool {
    if subject.trim().is_empty() {
        return false;
    }
    let lower = subject.to_lowercase();
    SUBJECT_TAG_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Trim a matched name candidate down to the name itself.
///
/// The name patterns happily run on into the next sentence
/// (`Jane Doe. My booking failed`), so the candidate is cut at the first
/// comma and at the first full stop that ends a word longer than one
/// letter. Single-letter initials (`John A. Smith`) survive.
fn clean_name(raw: &str) -> Option<String> {
    let candidate = raw.split(',').next().unwrap_or_default();

    let mut end = candidate.len();
    for (idx, _) in candidate.match_indices('.') {
        let rest = &candidate[idx + 1..];
        if !(rest.is_empty() || rest.starts_with(char::is_whitespace)) {
            continue;
        }
        let word = candidate[..idx]
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or_default();
        if word.chars().count() > 1 {
            end = idx;
            break;
        }
    }

    let name = candidate[..end]
        .trim()
        .trim_end_matches(['.', '-', '\'', '`'])
        .trim();
    (!name.is_empty()).then(|| name.to_string())
}
