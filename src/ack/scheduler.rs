//! Follow-up scheduler: delivers due acknowledgement follow-ups.
//!
//! Each cycle loads every record, delivers the follow-up for those that
//! are due, then writes the mutated records back in one batch. Each write
//! is a compare-and-swap against the version read at scan time: a record
//! changed by `acknowledge`/`submit_upi` mid-cycle keeps the external
//! write and is re-evaluated on the next cycle. A write the store rejects
//! is logged and counted; the rest of the batch is still written.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ack::manager::{UPI_PROMPT_MESSAGE, reinitiated_message};
use crate::ack::state::{AckRecord, AckState};
use crate::channels::{FollowupNotice, FollowupSink};
use crate::config::FollowupConfig;
use crate::error::DatabaseError;
use crate::store::Database;

/// Counts for one scheduler cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub scanned: usize,
    pub due: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
    /// Write-backs skipped because the record changed during the cycle.
    pub conflicts: usize,
    /// Write-backs the store rejected. These records fire again next cycle.
    pub write_failures: usize,
}

pub struct FollowupScheduler {
    db: Arc<dyn Database>,
    sink: Arc<dyn FollowupSink>,
    config: FollowupConfig,
}

impl FollowupScheduler {
    pub fn new(db: Arc<dyn Database>, sink: Arc<dyn FollowupSink>, config: FollowupConfig) -> Self {
        Self { db, sink, config }
    }

    /// Run one scan at `now`.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SchedulerReport, DatabaseError> {
        let records = self.db.list_acks().await?;
        let mut report = SchedulerReport {
            scanned: records.len(),
            ..SchedulerReport::default()
        };

        let mut pending: Vec<(i64, AckRecord)> = Vec::new();
        for record in records {
            if !record.is_due(now) {
                continue;
            }
            report.due += 1;

            let Some((message, next)) = fire(&record, now) else {
                continue;
            };

            let notice = FollowupNotice {
                booking_id: record.booking_id.clone(),
                customer_email: record.customer_email.clone(),
                message,
            };
            match self.sink.notify(&notice).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    // The transition still happens: at most one attempt per due time.
                    report.delivery_failures += 1;
                    warn!(
                        booking_id = %record.booking_id,
                        customer = %record.customer_email,
                        "Follow-up delivery failed: {e}"
                    );
                }
            }
            pending.push((record.version, next));
        }

        // One failed write must not drop the rest of the batch.
        for (expected_version, next) in pending {
            match self.db.compare_and_swap_ack(expected_version, &next).await {
                Ok(Some(stored)) => debug!(
                    booking_id = %stored.booking_id,
                    state = %stored.state,
                    "Follow-up transition saved"
                ),
                Ok(None) => {
                    report.conflicts += 1;
                    info!(
                        booking_id = %next.booking_id,
                        customer = %next.customer_email,
                        "Record changed during scan; leaving it for the next cycle"
                    );
                }
                Err(e) => {
                    report.write_failures += 1;
                    error!(
                        booking_id = %next.booking_id,
                        customer = %next.customer_email,
                        "Failed to save follow-up transition: {e}"
                    );
                }
            }
        }

        Ok(report)
    }

    pub fn config(&self) -> &FollowupConfig {
        &self.config
    }
}

/// The message due for `record` and the record as it should look after
/// the message fires. `None` for states that schedule nothing.
fn fire(record: &AckRecord, now: DateTime<Utc>) -> Option<(String, AckRecord)> {
    let mut next = record.clone();
    next.next_followup_at = None;
    next.updated_at = now;

    match record.state {
        AckState::AwaitingUpi => {
            next.upi_prompt_sent_at = Some(now);
            Some((UPI_PROMPT_MESSAGE.to_string(), next))
        }
        AckState::UpiProvided => {
            next.advance().ok()?;
            next.completed_at = Some(now);
            Some((
                reinitiated_message(record.ticket_reference.as_deref()),
                next,
            ))
        }
        AckState::Completed => None,
    }
}

/// Spawn the scheduler loop.
///
/// Returns a `JoinHandle` and a shutdown flag checked at every tick.
pub fn spawn_scheduler(scheduler: Arc<FollowupScheduler>) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            interval_secs = scheduler.config.poll_interval.as_secs(),
            delay_secs = scheduler.config.delay.as_secs(),
            "Follow-up scheduler started"
        );

        let mut tick = tokio::time::interval(scheduler.config.poll_interval);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Follow-up scheduler shutting down");
                return;
            }

            match scheduler.run_once(Utc::now()).await {
                Ok(report) if report.due > 0 => {
                    info!(
                        due = report.due,
                        delivered = report.delivered,
                        failed = report.delivery_failures,
                        conflicts = report.conflicts,
                        write_failures = report.write_failures,
                        "Follow-ups processed"
                    );
                }
                Ok(_) => {}
                Err(e) => error!("Follow-up scan failed: {e}"),
            }
        }
    });

    (handle, shutdown_flag)
}
