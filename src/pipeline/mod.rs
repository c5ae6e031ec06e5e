//! Inbound email pipeline.
//!
//! Every listed message flows through:
//! 1. `IngestionWatcher`: mailbox I/O and dedup against the processed set
//! 2. `Extractor`: heuristic case extraction (no I/O)
//! 3. `CaseValidator`: complaint and completeness checks
//! 4. Dispatch: ticketing for actionable cases, a clarification reply otherwise

pub mod clarify;
pub mod extract;
pub mod rules;
pub mod types;
pub mod watcher;

pub use extract::Extractor;
pub use rules::CaseValidator;
pub use types::{CaseRecord, CycleReport, InboundEmail, MessageOutcome, Priority, Validation};
pub use watcher::{IngestionWatcher, WatcherChannels, spawn_watcher};
