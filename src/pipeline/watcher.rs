//! Ingestion watcher: polls the mailbox and dispatches new messages.
//!
//! Each cycle:
//! 1. Lists unread messages addressed to the watched address
//! 2. Skips ids already in the processed set
//! 3. Fetches, extracts, validates
//! 4. Forwards actionable cases to ticketing, otherwise replies asking
//!    for clarification
//! 5. Records the id as processed unless the failure is worth retrying

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channels::email_types::GmailMessage;
use crate::channels::{Mailbox, PayloadOutbox, ReplySender, TicketSink};
use crate::config::{MailboxConfig, WatcherConfig};
use crate::error::{ChannelError, PipelineError};
use crate::pipeline::clarify::compose_clarification;
use crate::pipeline::extract::Extractor;
use crate::pipeline::rules::CaseValidator;
use crate::pipeline::types::{CaseRecord, CycleReport, MessageOutcome};
use crate::store::Database;

/// Collaborators the watcher dispatches to.
pub struct WatcherChannels {
    pub mailbox: Arc<dyn Mailbox>,
    pub tickets: Arc<dyn TicketSink>,
    pub replies: Arc<dyn ReplySender>,
    pub outbox: PayloadOutbox,
}

pub struct IngestionWatcher {
    config: WatcherConfig,
    watch_email: String,
    query: String,
    max_results: u32,
    signature: String,
    db: Arc<dyn Database>,
    channels: WatcherChannels,
    extractor: Arc<Extractor>,
    validator: CaseValidator,
}

impl IngestionWatcher {
    pub fn new(
        config: WatcherConfig,
        mailbox_config: &MailboxConfig,
        signature: impl Into<String>,
        db: Arc<dyn Database>,
        channels: WatcherChannels,
    ) -> Result<Self, PipelineError> {
        let extractor = Arc::new(
            Extractor::new().map_err(|e| PipelineError::Parse(format!("extractor patterns: {e}")))?,
        );
        let validator = CaseValidator::default_rules(Arc::clone(&extractor));
        Ok(Self {
            config,
            watch_email: mailbox_config.watch_email.clone(),
            query: mailbox_config.unread_query(),
            max_results: mailbox_config.max_results,
            signature: signature.into(),
            db,
            channels,
            extractor,
            validator,
        })
    }

    /// Run one poll cycle. Per-message failures are folded into the report;
    /// only a failed listing or a store failure aborts the cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        let ids = match self
            .channels
            .mailbox
            .list_messages(&self.query, self.max_results)
            .await
        {
            Ok(ids) => ids,
            Err(ChannelError::AuthExpired { ref name }) => {
                warn!(channel = %name, "Mailbox listing unauthorized, refreshing token for next cycle");
                if let Err(e) = self.channels.mailbox.refresh_token().await {
                    error!("Mailbox token refresh failed: {e}");
                }
                return Err(PipelineError::Fetch(ChannelError::AuthExpired {
                    name: name.clone(),
                }));
            }
            Err(e) => return Err(PipelineError::Fetch(e)),
        };

        let mut report = CycleReport {
            listed: ids.len(),
            ..CycleReport::default()
        };

        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        for id in ids {
            if !seen.insert(id.clone()) {
                continue;
            }
            if self.db.is_processed(&id).await? {
                report.already_processed += 1;
            } else {
                fresh.push(id);
            }
        }

        if fresh.is_empty() {
            return Ok(report);
        }
        info!(count = fresh.len(), "Found new message(s) to process");

        for id in fresh {
            let outcome = self.process_message(&id).await;
            self.record(&id, &outcome).await?;
            report.outcomes.push((id, outcome));
        }

        Ok(report)
    }

    async fn record(&self, id: &str, outcome: &MessageOutcome) -> Result<(), PipelineError> {
        match outcome {
            MessageOutcome::Deferred { reason } => {
                warn!(message_id = %id, reason = %reason, "Message deferred to next cycle");
                return Ok(());
            }
            MessageOutcome::Dropped { reason } => {
                warn!(message_id = %id, reason = %reason, "Message dropped");
            }
            other => {
                info!(message_id = %id, outcome = other.label(), "Message processed");
            }
        }

        self.db.mark_processed(id, outcome.label()).await?;

        if self.config.mark_read
            && !matches!(outcome, MessageOutcome::NotAddressed)
            && let Err(e) = self.channels.mailbox.mark_read(id).await
        {
            warn!(message_id = %id, "Failed to mark message read: {e}");
        }
        Ok(())
    }

    /// Fetch and dispatch one message. Never fails; errors become outcomes.
    async fn process_message(&self, id: &str) -> MessageOutcome {
        let message = match self.fetch_with_refresh(id).await {
            Ok(m) => m,
            Err(ChannelError::InvalidResponse { reason, .. }) => {
                return MessageOutcome::Dropped { reason };
            }
            Err(e) => {
                return MessageOutcome::Deferred {
                    reason: e.to_string(),
                };
            }
        };

        let inbound = match message.to_inbound() {
            Ok(m) => m,
            Err(e) => {
                return MessageOutcome::Dropped {
                    reason: e.to_string(),
                };
            }
        };

        if !inbound.is_addressed_to(&self.watch_email) {
            debug!(message_id = %id, to = %inbound.to, "Search match not addressed to watched mailbox");
            return MessageOutcome::NotAddressed;
        }

        let case = self.extractor.extract_message(&inbound);
        let verdict = self
            .validator
            .validate(&inbound.body, &inbound.subject, &case);
        debug!(
            message_id = %id,
            priority = %case.priority,
            is_complaint = verdict.is_complaint,
            missing = ?verdict.missing_fields,
            "Case extracted"
        );

        if verdict.is_actionable() {
            return self.forward(&case).await;
        }

        let Some(reply) = compose_clarification(&case, &verdict, &self.signature) else {
            warn!(message_id = %id, "Clarification needed but sender address is unknown; not replying");
            return MessageOutcome::ClarificationSkipped;
        };

        match self.channels.replies.send(&reply).await {
            Ok(_) => MessageOutcome::ClarificationSent,
            Err(e) => {
                warn!(message_id = %id, to = %reply.to, "Clarification reply failed: {e}");
                MessageOutcome::ClarificationFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Fetch, with one forced token refresh and retry on 401.
    async fn fetch_with_refresh(&self, id: &str) -> Result<GmailMessage, ChannelError> {
        match self.channels.mailbox.get_message(id).await {
            Err(ChannelError::AuthExpired { .. }) => {
                info!(message_id = %id, "Fetch unauthorized, refreshing token and retrying once");
                self.channels.mailbox.refresh_token().await?;
                self.channels.mailbox.get_message(id).await
            }
            other => other,
        }
    }

    async fn forward(&self, case: &CaseRecord) -> MessageOutcome {
        match self.channels.tickets.create_ticket(case).await {
            Ok(receipt) => MessageOutcome::Forwarded {
                ticket_reference: receipt.ticket_reference,
            },
            Err(e) if e.is_transient() => MessageOutcome::Deferred {
                reason: e.to_string(),
            },
            Err(e) => {
                let reason = e.to_string();
                warn!(
                    customer = %case.customer_email,
                    "Ticket destination unusable, saving case to outbox: {reason}"
                );
                match self.channels.outbox.append(case, &reason).await {
                    Ok(()) => MessageOutcome::Outboxed { reason },
                    Err(oe) => {
                        error!("Outbox write failed, case lost: {oe}");
                        MessageOutcome::Dropped {
                            reason: format!("{reason}; outbox: {oe}"),
                        }
                    }
                }
            }
        }
    }
}

/// Spawn the watcher loop.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling;
/// it is checked at every tick.
pub fn spawn_watcher(watcher: Arc<IngestionWatcher>) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            mailbox = %watcher.watch_email,
            interval_secs = watcher.config.poll_interval.as_secs(),
            "Ingestion watcher started"
        );

        let mut tick = tokio::time::interval(watcher.config.poll_interval);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Ingestion watcher shutting down");
                return;
            }

            match watcher.run_cycle().await {
                Ok(report) if !report.is_noop() => {
                    debug!(
                        listed = report.listed,
                        handled = report.outcomes.len(),
                        "Watcher cycle complete"
                    );
                }
                Ok(_) => {}
                Err(e) => error!("Watcher cycle failed: {e}"),
            }
        }
    });

    (handle, shutdown_flag)
}
