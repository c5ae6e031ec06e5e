//! Clarification reply composition.
//!
//! Sent when a message is not a complaint or lacks required fields.
//! Customers without a usable address never get one.

use crate::channels::reply::OutgoingEmail;
use crate::pipeline::types::{CaseRecord, Validation};

const NOT_A_COMPLAINT: &str = "Your email does not appear to be a complaint or support request. \n\
If you have a specific issue, complaint, or need assistance, please provide:\n\
- A detailed description of your issue or concern\n\
- Any relevant booking or transaction details\n\
- Any error messages you may have encountered\n\n";

/// Build the clarification reply for `case`, or `None` if the sender
/// address is the unknown sentinel.
pub fn compose_clarification(
    case: &CaseRecord,
    validation: &Validation,
    signature: &str,
) -> Option<OutgoingEmail> {
    if !case.has_known_email() {
        return None;
    }

    let name = if case.has_known_name() {
        case.customer_name.as_str()
    } else {
        "Valued Customer"
    };

    let mut body = format!(
        "Dear {name},\n\n\
         Thank you for contacting us.\n\n\
         We have received your email, but we need more information to assist you better. \n\n"
    );

    if !validation.is_complaint {
        body.push_str(NOT_A_COMPLAINT);
    }

    if !validation.has_required_info() {
        let fields = validation
            .missing_fields
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        body.push_str(&format!(
            "We are missing the following information:\n- {fields}\n\n"
        ));
    }

    body.push_str(&format!(
        "Please reply to this email with the additional details, and we will be happy to assist you.\n\n\
         Best regards,\n{signature}\n"
    ));

    let subject = if case.subject.trim().is_empty() {
        "Your inquiry"
    } else {
        case.subject.as_str()
    };

    let in_reply_to = Some(case.metadata.message_id.clone()).filter(|id| !id.is_empty());

    Some(OutgoingEmail {
        to: case.customer_email.clone(),
        subject: format!("Re: {subject}"),
        body,
        in_reply_to,
        thread_id: Some(case.metadata.thread_id.clone()).filter(|id| !id.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{
        CaseMetadata, MissingField, Priority, UNKNOWN_EMAIL, UNKNOWN_NAME,
    };

    fn case(name: &str, email: &str, subject: &str) -> CaseRecord {
        CaseRecord {
            customer_name: name.into(),
            customer_email: email.into(),
            customer_phone: String::new(),
            issue_text: "Hello, just a general question about your hours.".into(),
            priority: Priority::Low,
            subject: subject.into(),
            metadata: CaseMetadata {
                message_id: "m-7".into(),
                thread_id: "t-7".into(),
                ..CaseMetadata::default()
            },
        }
    }

    #[test]
    fn not_a_complaint_reply() {
        let verdict = Validation {
            is_complaint: false,
            missing_fields: vec![],
        };
        let reply = compose_clarification(
            &case("Jane Doe", "jane@x.com", "Hours"),
            &verdict,
            "Sherlox Support Team",
        )
        .unwrap();
        assert_eq!(reply.to, "jane@x.com");
        assert_eq!(reply.subject, "Re: Hours");
        assert_eq!(reply.in_reply_to.as_deref(), Some("m-7"));
        assert_eq!(reply.thread_id.as_deref(), Some("t-7"));
        assert!(reply.body.starts_with("Dear Jane Doe,\n\nThank you for contacting us."));
        assert!(reply.body.contains("does not appear to be a complaint"));
        assert!(!reply.body.contains("We are missing"));
        assert!(reply.body.ends_with("Best regards,\nSherlox Support Team\n"));
    }

    #[test]
    fn missing_fields_reply_uses_fallback_name_and_subject() {
        let verdict = Validation {
            is_complaint: true,
            missing_fields: vec![MissingField::CustomerName, MissingField::IssueDescription],
        };
        let reply =
            compose_clarification(&case(UNKNOWN_NAME, "jane@x.com", " "), &verdict, "Team")
                .unwrap();
        assert_eq!(reply.subject, "Re: Your inquiry");
        assert!(reply.body.starts_with("Dear Valued Customer,"));
        assert!(reply.body.contains(
            "We are missing the following information:\n- CustomerName, IssueDescription\n"
        ));
        assert!(!reply.body.contains("does not appear"));
    }

    #[test]
    fn unknown_sender_gets_no_reply() {
        let verdict = Validation {
            is_complaint: false,
            missing_fields: vec![MissingField::CustomerEmail],
        };
        assert!(
            compose_clarification(&case("Jane", UNKNOWN_EMAIL, "x"), &verdict, "Team").is_none()
        );
    }
}
