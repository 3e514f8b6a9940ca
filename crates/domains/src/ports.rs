//! # Core Traits (Ports)
//!
//! Any adapter must implement these traits to be wired into the service.
//! The composition root constructs them and injects them as `Arc<dyn _>`.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CategoryId, Fragment, FragmentId, FragmentQuery, UserId};
use crate::moderation::{ContentKind, ModerationResult};
use crate::notification::Notification;

/// Persistence contract for the fragment-with-replies aggregate.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FragmentRepository: Send + Sync {
    /// Stores a brand-new aggregate. The returned copy carries version 1.
    async fn insert_fragment(&self, fragment: &Fragment) -> Result<Fragment>;

    /// Loads the whole aggregate, tombstoned or not.
    /// Fails with `NotFound` only when no such id was ever stored.
    async fn load_fragment(&self, id: FragmentId) -> Result<Fragment>;

    /// Whole-document write guarded by `expected_version`.
    /// Returns the stored copy with its version bumped, or `VersionConflict`.
    /// The stored `view_count` is kept; only `record_view` moves it.
    async fn save_fragment(&self, fragment: &Fragment, expected_version: u64) -> Result<Fragment>;

    /// Bumps the read counter outside the version guard and returns the new count.
    async fn record_view(&self, id: FragmentId) -> Result<u64>;

    async fn list_fragments(&self, query: &FragmentQuery) -> Result<Vec<Fragment>>;
}

/// Category lookups (categories themselves are managed elsewhere).
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn category_exists(&self, id: CategoryId) -> Result<bool>;
}

/// Who follows an author. Used for `NewFragment` fan-out.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FollowerDirectory: Send + Sync {
    async fn followers_of(&self, author: UserId) -> Result<BTreeSet<UserId>>;
}

/// Automated content review. Treated as an opaque verdict producer.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ModerationClassifier: Send + Sync {
    /// Fragment bodies and replies are reviewed under different policies.
    async fn review(&self, text: &str, kind: ContentKind) -> Result<ModerationResult>;
}

/// Downstream notification dispatcher.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn dispatch(&self, notification: Notification) -> Result<()>;
}
