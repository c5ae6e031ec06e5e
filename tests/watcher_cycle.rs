//! Integration tests for the ingestion watcher.
//!
//! Every collaborator is an in-process fake; the processed set is a real
//! in-memory libSQL database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use resolvx::channels::email_types::{GmailMessage, Header, MessagePart, PartBody, encode_base64url};
use resolvx::channels::{
    Mailbox, OutgoingEmail, PayloadOutbox, ReplySender, SendReceipt, TicketReceipt, TicketSink,
};
use resolvx::config::{MailboxConfig, WatcherConfig};
use resolvx::error::ChannelError;
use resolvx::pipeline::{CaseRecord, IngestionWatcher, MessageOutcome, WatcherChannels};
use resolvx::store::{Database, LibSqlBackend};

const WATCHED: &str = "reachus.sherlox@gmail.com";

const SCENARIO_A: &str =
    "Hi, I'm Jane Doe. My booking failed and I need a refund urgently. jane@x.com";
const SCENARIO_B: &str = "Hello, just a general question about your hours.";

// ── Fakes ───────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeMailbox {
    listing: Mutex<Vec<String>>,
    messages: Mutex<HashMap<String, GmailMessage>>,
    /// Fetches that answer 401 before succeeding.
    unauthorized_fetches: Mutex<usize>,
    refreshes: Mutex<usize>,
    marked_read: Mutex<Vec<String>>,
}

impl FakeMailbox {
    fn add(&self, message: GmailMessage) {
        self.listing.lock().unwrap().push(message.id.clone());
        self.messages
            .lock()
            .unwrap()
            .insert(message.id.clone(), message);
    }
}

#[async_trait]
impl Mailbox for FakeMailbox {
    async fn list_messages(&self, _query: &str, max: u32) -> Result<Vec<String>, ChannelError> {
        let listing = self.listing.lock().unwrap();
        Ok(listing.iter().take(max as usize).cloned().collect())
    }

    async fn get_message(&self, message_id: &str) -> Result<GmailMessage, ChannelError> {
        {
            let mut pending = self.unauthorized_fetches.lock().unwrap();
            if *pending > 0 {
                *pending -= 1;
                return Err(ChannelError::AuthExpired {
                    name: "fake".into(),
                });
            }
        }
        self.messages
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .ok_or_else(|| ChannelError::Http {
                name: "fake".into(),
                status: 404,
                body: "not found".into(),
            })
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), ChannelError> {
        self.marked_read.lock().unwrap().push(message_id.to_string());
        Ok(())
    }

    async fn refresh_token(&self) -> Result<(), ChannelError> {
        *self.refreshes.lock().unwrap() += 1;
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq)]
enum SinkMode {
    Accept,
    Unavailable,
    NotConfigured,
}

struct FakeTickets {
    mode: Mutex<SinkMode>,
    created: Mutex<Vec<CaseRecord>>,
}

impl FakeTickets {
    fn new(mode: SinkMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            created: Mutex::new(Vec::new()),
        }
    }

    fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl TicketSink for FakeTickets {
    async fn create_ticket(&self, case: &CaseRecord) -> Result<TicketReceipt, ChannelError> {
        let mode = *self.mode.lock().unwrap();
        match mode {
            SinkMode::Accept => {
                let mut created = self.created.lock().unwrap();
                created.push(case.clone());
                Ok(TicketReceipt {
                    status: 200,
                    ticket_reference: Some(format!("TKT-{}", created.len())),
                })
            }
            SinkMode::Unavailable => Err(ChannelError::Http {
                name: "fake".into(),
                status: 503,
                body: "maintenance".into(),
            }),
            SinkMode::NotConfigured => Err(ChannelError::NotConfigured {
                name: "fake".into(),
            }),
        }
    }
}

#[derive(Default)]
struct FakeReplies {
    sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl ReplySender for FakeReplies {
    async fn send(&self, email: &OutgoingEmail) -> Result<SendReceipt, ChannelError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(SendReceipt::default())
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    watcher: IngestionWatcher,
    db: Arc<dyn Database>,
    mailbox: Arc<FakeMailbox>,
    tickets: Arc<FakeTickets>,
    replies: Arc<FakeReplies>,
    outbox: PayloadOutbox,
    _dir: tempfile::TempDir,
}

async fn harness(mode: SinkMode) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let outbox_path = dir.path().join("saved_payloads.json");
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let mailbox = Arc::new(FakeMailbox::default());
    let tickets = Arc::new(FakeTickets::new(mode));
    let replies = Arc::new(FakeReplies::default());

    let watcher = IngestionWatcher::new(
        WatcherConfig::default(),
        &MailboxConfig::default(),
        "Sherlox Support Team",
        Arc::clone(&db),
        WatcherChannels {
            mailbox: Arc::clone(&mailbox) as Arc<dyn Mailbox>,
            tickets: Arc::clone(&tickets) as Arc<dyn TicketSink>,
            replies: Arc::clone(&replies) as Arc<dyn ReplySender>,
            outbox: PayloadOutbox::new(outbox_path.clone()),
        },
    )
    .unwrap();

    Harness {
        watcher,
        db,
        mailbox,
        tickets,
        replies,
        outbox: PayloadOutbox::new(outbox_path),
        _dir: dir,
    }
}

fn message(id: &str, from: &str, to: &str, subject: &str, body: &str) -> GmailMessage {
    let header = |name: &str, value: &str| Header {
        name: name.into(),
        value: value.into(),
    };
    GmailMessage {
        id: id.into(),
        thread_id: format!("t-{id}"),
        label_ids: vec!["UNREAD".into()],
        payload: Some(MessagePart {
            mime_type: "multipart/alternative".into(),
            headers: vec![
                header("From", from),
                header("To", to),
                header("Subject", subject),
                header("Date", "Mon, 5 Jan 2026 10:00:00 +0000"),
            ],
            body: PartBody::default(),
            parts: vec![MessagePart {
                mime_type: "text/plain".into(),
                body: PartBody {
                    data: Some(encode_base64url(body.as_bytes())),
                    size: body.len() as u64,
                },
                ..MessagePart::default()
            }],
        }),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_d_same_id_across_cycles_has_one_side_effect() {
    let h = harness(SinkMode::Accept).await;
    h.mailbox
        .add(message("m-1", "Jane Doe <jane@x.com>", WATCHED, "Refund", SCENARIO_A));

    let first = h.watcher.run_cycle().await.unwrap();
    assert_eq!(first.count("forwarded"), 1);
    assert_eq!(h.tickets.count(), 1);

    let second = h.watcher.run_cycle().await.unwrap();
    assert!(second.is_noop());
    assert_eq!(second.already_processed, 1);
    assert_eq!(h.tickets.count(), 1);
    assert!(h.replies.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn forwarded_case_carries_extracted_fields() {
    let h = harness(SinkMode::Accept).await;
    h.mailbox
        .add(message("m-1", "", WATCHED, "", SCENARIO_A));

    h.watcher.run_cycle().await.unwrap();

    let created = h.tickets.created.lock().unwrap();
    assert_eq!(created[0].customer_name, "Jane Doe");
    assert_eq!(created[0].customer_email, "jane@x.com");
    assert_eq!(created[0].priority.to_string(), "HIGH");
    assert_eq!(created[0].metadata.message_id, "m-1");
    assert_eq!(h.mailbox.marked_read.lock().unwrap().as_slice(), ["m-1"]);
}

#[tokio::test]
async fn duplicate_ids_in_one_listing_are_handled_once() {
    let h = harness(SinkMode::Accept).await;
    let msg = message("m-1", "Jane Doe <jane@x.com>", WATCHED, "Refund", SCENARIO_A);
    h.mailbox.add(msg.clone());
    h.mailbox.add(msg);

    let report = h.watcher.run_cycle().await.unwrap();
    assert_eq!(report.listed, 2);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(h.tickets.count(), 1);
}

#[tokio::test]
async fn scenario_b_takes_clarification_path() {
    let h = harness(SinkMode::Accept).await;
    h.mailbox
        .add(message("m-2", "Jane <jane@x.com>", WATCHED, "Hours", SCENARIO_B));

    let report = h.watcher.run_cycle().await.unwrap();
    assert_eq!(report.outcomes[0].1, MessageOutcome::ClarificationSent);
    assert_eq!(h.tickets.count(), 0);

    let sent = h.replies.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "jane@x.com");
    assert_eq!(sent[0].subject, "Re: Hours");
    assert!(sent[0].body.starts_with("Dear Jane,"));
    assert!(h.db.is_processed("m-2").await.unwrap());
}

#[tokio::test]
async fn unknown_sender_gets_no_reply() {
    let h = harness(SinkMode::Accept).await;
    h.mailbox
        .add(message("m-3", "", WATCHED, "", SCENARIO_B));

    let report = h.watcher.run_cycle().await.unwrap();
    assert_eq!(report.outcomes[0].1, MessageOutcome::ClarificationSkipped);
    assert!(h.replies.sent.lock().unwrap().is_empty());
    assert!(h.db.is_processed("m-3").await.unwrap());
}

#[tokio::test]
async fn transient_ticketing_failure_is_retried_next_cycle() {
    let h = harness(SinkMode::Unavailable).await;
    h.mailbox
        .add(message("m-1", "Jane Doe <jane@x.com>", WATCHED, "Refund", SCENARIO_A));

    let first = h.watcher.run_cycle().await.unwrap();
    assert_eq!(first.count("deferred"), 1);
    assert!(!h.db.is_processed("m-1").await.unwrap());
    assert!(h.mailbox.marked_read.lock().unwrap().is_empty());

    *h.tickets.mode.lock().unwrap() = SinkMode::Accept;
    let second = h.watcher.run_cycle().await.unwrap();
    assert_eq!(second.count("forwarded"), 1);
    assert!(h.db.is_processed("m-1").await.unwrap());
}

#[tokio::test]
async fn missing_destination_goes_to_outbox() {
    let h = harness(SinkMode::NotConfigured).await;
    h.mailbox
        .add(message("m-1", "Jane Doe <jane@x.com>", WATCHED, "Refund", SCENARIO_A));

    let report = h.watcher.run_cycle().await.unwrap();
    assert_eq!(report.count("outboxed"), 1);
    assert!(h.db.is_processed("m-1").await.unwrap());

    let entries = h.outbox.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payload.customer_email, "jane@x.com");
}

#[tokio::test]
async fn unauthorized_fetch_refreshes_and_retries_once() {
    let h = harness(SinkMode::Accept).await;
    h.mailbox
        .add(message("m-1", "Jane Doe <jane@x.com>", WATCHED, "Refund", SCENARIO_A));
    *h.mailbox.unauthorized_fetches.lock().unwrap() = 1;

    let report = h.watcher.run_cycle().await.unwrap();
    assert_eq!(report.count("forwarded"), 1);
    assert_eq!(*h.mailbox.refreshes.lock().unwrap(), 1);
}

#[tokio::test]
async fn repeated_unauthorized_fetch_is_deferred() {
    let h = harness(SinkMode::Accept).await;
    h.mailbox
        .add(message("m-1", "Jane Doe <jane@x.com>", WATCHED, "Refund", SCENARIO_A));
    *h.mailbox.unauthorized_fetches.lock().unwrap() = 2;

    let report = h.watcher.run_cycle().await.unwrap();
    assert_eq!(report.count("deferred"), 1);
    assert!(!h.db.is_processed("m-1").await.unwrap());
}

#[tokio::test]
async fn message_not_addressed_to_watched_mailbox_is_skipped() {
    let h = harness(SinkMode::Accept).await;
    h.mailbox.add(message(
        "m-4",
        "Jane Doe <jane@x.com>",
        "someone-else@example.com",
        "Refund",
        SCENARIO_A,
    ));

    let report = h.watcher.run_cycle().await.unwrap();
    assert_eq!(report.outcomes[0].1, MessageOutcome::NotAddressed);
    assert_eq!(h.tickets.count(), 0);
    assert!(h.db.is_processed("m-4").await.unwrap());
    assert!(h.mailbox.marked_read.lock().unwrap().is_empty());
}

#[tokio::test]
async fn message_without_payload_is_dropped_and_marked() {
    let h = harness(SinkMode::Accept).await;
    h.mailbox.add(GmailMessage {
        id: "m-5".into(),
        ..GmailMessage::default()
    });

    let report = h.watcher.run_cycle().await.unwrap();
    assert_eq!(report.count("dropped"), 1);
    assert!(h.db.is_processed("m-5").await.unwrap());

    let processed = h.db.processed_messages().await.unwrap();
    assert_eq!(processed[0].outcome, "dropped");
}
