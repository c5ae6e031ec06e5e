//! Resolvx: support inbox triage and refund acknowledgement service.

pub mod ack;
pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
