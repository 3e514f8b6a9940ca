//! fragment-trails/crates/services/src/lib.rs
//!
//! Business rules of the fragment core: the reply forest, the vote ledger,
//! the status lifecycle and the service that drives them through the ports.

pub mod admin;
pub mod browse;
pub mod lifecycle;
pub mod metrics;
pub mod moderation_gate;
pub mod reply_tree;
pub mod requests;
pub mod retry;
pub mod service;
pub mod subscriptions;
pub mod vote_ledger;

pub use metrics::Metrics;
pub use moderation_gate::{ModerationGate, DEFAULT_CLASSIFIER_TIMEOUT};
pub use requests::*;
pub use retry::retry_on_conflict;
pub use service::{FragmentService, Ports, ServiceSettings};
pub use vote_ledger::VoteOutcome;
