//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::ack::state::{AckKey, AckRecord, AckState};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Database, ProcessedMessage};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_datetime(dt: Option<DateTime<Utc>>) -> libsql::Value {
    match dt {
        Some(dt) => libsql::Value::Text(dt.to_rfc3339()),
        None => libsql::Value::Null,
    }
}

const ACK_COLUMNS: &str = "booking_id, customer_email, state, ticket_reference, upi_id, \
     next_followup_at, upi_prompt_sent_at, created_at, updated_at, completed_at, version";

fn row_to_ack(row: &libsql::Row) -> Result<AckRecord, DatabaseError> {
    let get_text = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("row parse column {idx}: {e}")))
    };

    let state_str = get_text(2)?;
    let state = state_str
        .parse::<AckState>()
        .map_err(DatabaseError::Serialization)?;
    let next_followup_at: Option<String> = row.get(5).ok();
    let upi_prompt_sent_at: Option<String> = row.get(6).ok();
    let completed_at: Option<String> = row.get(9).ok();

    Ok(AckRecord {
        booking_id: get_text(0)?,
        customer_email: get_text(1)?,
        state,
        ticket_reference: row.get(3).ok(),
        upi_id: row.get(4).ok(),
        next_followup_at: parse_optional_datetime(&next_followup_at),
        upi_prompt_sent_at: parse_optional_datetime(&upi_prompt_sent_at),
        created_at: parse_datetime(&get_text(7)?),
        updated_at: parse_datetime(&get_text(8)?),
        completed_at: parse_optional_datetime(&completed_at),
        version: row
            .get::<i64>(10)
            .map_err(|e| DatabaseError::Query(format!("row parse version: {e}")))?,
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Processed set ───────────────────────────────────────────────

    async fn is_processed(&self, message_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM processed_messages WHERE message_id = ?1",
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("is_processed: {e}")))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(DatabaseError::Query(format!("is_processed: {e}"))),
        }
    }

    async fn mark_processed(
        &self,
        message_id: &str,
        outcome: &str,
    ) -> Result<(), DatabaseError> {
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO processed_messages (message_id, processed_at, outcome)
                 VALUES (?1, ?2, ?3)",
                params![message_id, Utc::now().to_rfc3339(), outcome],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_processed: {e}")))?;

        debug!(message_id, outcome, inserted = inserted > 0, "Message marked processed");
        Ok(())
    }

    async fn processed_messages(&self) -> Result<Vec<ProcessedMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT message_id, processed_at, outcome FROM processed_messages
                 ORDER BY processed_at ASC, message_id ASC",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("processed_messages: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("processed_messages: {e}")))?
        {
            let processed_at: String = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
            out.push(ProcessedMessage {
                message_id: row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
                processed_at: parse_datetime(&processed_at),
                outcome: row.get(2).unwrap_or_default(),
            });
        }
        Ok(out)
    }

    // ── Acknowledgements ────────────────────────────────────────────

    async fn get_ack(&self, key: &AckKey) -> Result<Option<AckRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ACK_COLUMNS} FROM acknowledgements
                     WHERE booking_id = ?1 AND customer_email = ?2"
                ),
                params![key.booking_id.as_str(), key.customer_email.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_ack: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_ack(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_ack: {e}"))),
        }
    }

    async fn put_ack(&self, record: &AckRecord) -> Result<AckRecord, DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO acknowledgements (booking_id, customer_email, state, ticket_reference,
                    upi_id, next_followup_at, upi_prompt_sent_at, created_at, updated_at,
                    completed_at, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1)
                 ON CONFLICT(booking_id, customer_email) DO UPDATE SET
                    state = excluded.state,
                    ticket_reference = excluded.ticket_reference,
                    upi_id = excluded.upi_id,
                    next_followup_at = excluded.next_followup_at,
                    upi_prompt_sent_at = excluded.upi_prompt_sent_at,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    completed_at = excluded.completed_at,
                    version = acknowledgements.version + 1",
                params![
                    record.booking_id.as_str(),
                    record.customer_email.as_str(),
                    record.state.as_str(),
                    opt_text(record.ticket_reference.as_deref()),
                    opt_text(record.upi_id.as_deref()),
                    opt_datetime(record.next_followup_at),
                    opt_datetime(record.upi_prompt_sent_at),
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                    opt_datetime(record.completed_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_ack: {e}")))?;

        let key = record.key();
        let stored = self.get_ack(&key).await?.ok_or_else(|| DatabaseError::NotFound {
            entity: "acknowledgement".into(),
            id: key.to_string(),
        })?;
        debug!(key = %key, version = stored.version, state = %stored.state, "Acknowledgement stored");
        Ok(stored)
    }

    async fn compare_and_swap_ack(
        &self,
        expected_version: i64,
        record: &AckRecord,
    ) -> Result<Option<AckRecord>, DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE acknowledgements SET
                    state = ?3,
                    ticket_reference = ?4,
                    upi_id = ?5,
                    next_followup_at = ?6,
                    upi_prompt_sent_at = ?7,
                    updated_at = ?8,
                    completed_at = ?9,
                    version = version + 1
                 WHERE booking_id = ?1 AND customer_email = ?2 AND version = ?10",
                params![
                    record.booking_id.as_str(),
                    record.customer_email.as_str(),
                    record.state.as_str(),
                    opt_text(record.ticket_reference.as_deref()),
                    opt_text(record.upi_id.as_deref()),
                    opt_datetime(record.next_followup_at),
                    opt_datetime(record.upi_prompt_sent_at),
                    record.updated_at.to_rfc3339(),
                    opt_datetime(record.completed_at),
                    expected_version,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("compare_and_swap_ack: {e}")))?;

        if updated == 0 {
            debug!(key = %record.key(), expected_version, "Acknowledgement CAS lost");
            return Ok(None);
        }

        Ok(Some(AckRecord {
            version: expected_version + 1,
            ..record.clone()
        }))
    }

    async fn list_acks(&self) -> Result<Vec<AckRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ACK_COLUMNS} FROM acknowledgements
                     ORDER BY created_at ASC, booking_id ASC, customer_email ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_acks: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_acks: {e}")))?
        {
            match row_to_ack(&row) {
                Ok(rec) => records.push(rec),
                Err(e) => tracing::warn!("Skipping acknowledgement row: {e}"),
            }
        }
        Ok(records)
    }
}
