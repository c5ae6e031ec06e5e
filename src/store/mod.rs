//! Persistence layer: libSQL-backed processed set and acknowledgement records.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, ProcessedMessage};
