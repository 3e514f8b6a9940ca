//! fragment-trails/crates/storage-adapters/src/lib.rs
//!
//! Implementations of the persistence and notification ports.

pub mod memory;
pub mod notifications;

#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use memory::{InMemoryCategoryRepository, InMemoryFollowerDirectory, InMemoryFragmentRepository};
pub use notifications::{LogNotificationSink, NotificationOutbox};

#[cfg(feature = "db-postgres")]
pub use postgres::{PgCategoryRepository, PgFollowerDirectory, PgFragmentRepository};
