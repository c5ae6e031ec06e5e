//! Refund acknowledgement flow: state machine, manager, follow-up
//! scheduler and HTTP routes.

pub mod manager;
pub mod routes;
pub mod scheduler;
pub mod state;

pub use manager::{AckManager, AckOutcome, ScheduledFollowup};
pub use routes::{AckRouteState, ack_routes};
pub use scheduler::{FollowupScheduler, SchedulerReport, spawn_scheduler};
pub use state::{AckKey, AckRecord, AckState};
