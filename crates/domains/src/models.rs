//! # Domain Models
//!
//! These structs represent the core entities of the fragment platform.
//! We use UUID v7 for time-ordered, globally unique identification.
//!
//! A `Fragment` owns its reply forest outright: replies are embedded,
//! serialized as nested arrays and persisted together with the fragment
//! as one aggregate.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::moderation::{ModerationRecord, Verdict};
use crate::votes::Votable;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| DomainError::ValidationError(format!("malformed id: {s}")))
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id!(
    /// Identifier of a fragment aggregate.
    FragmentId
);
define_id!(
    /// Identifier of a reply, unique within its fragment's forest.
    ReplyId
);
define_id!(UserId);
define_id!(CategoryId);

/// Publication state shared by fragments and replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Draft,
    Published,
    Blocked,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Blocked => "blocked",
        }
    }

    /// Initial status of a reply given its classifier verdict.
    pub fn for_new_reply(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Approved => Self::Published,
            Verdict::NeedsReview => Self::Draft,
            Verdict::Rejected => Self::Blocked,
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "blocked" => Ok(Self::Blocked),
            other => Err(DomainError::ValidationError(format!("invalid status: {other}"))),
        }
    }
}

/// The identity performing an operation. Authentication happens upstream;
/// the core only sees the resolved user and whether they hold admin rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    #[serde(default)]
    pub is_admin: bool,
}

impl Actor {
    pub fn user(user_id: UserId) -> Self {
        Self { user_id, is_admin: false }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self { user_id, is_admin: true }
    }

    /// Owners and admins may manage a resource.
    pub fn can_manage(&self, owner: UserId) -> bool {
        self.is_admin || self.user_id == owner
    }
}

/// A node of the reply forest. Children are owned inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub id: ReplyId,
    pub content: String,
    pub author: UserId,
    pub status: ContentStatus,
    /// Tombstone. Set on this node and every descendant at once.
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub upvotes: BTreeSet<UserId>,
    #[serde(default)]
    pub downvotes: BTreeSet<UserId>,
    pub moderation: ModerationRecord,
    #[serde(default)]
    pub replies: Vec<Reply>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reply {
    pub fn new(
        author: UserId,
        content: impl Into<String>,
        moderation: ModerationRecord,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReplyId::new(),
            content: content.into(),
            author,
            status: ContentStatus::for_new_reply(moderation.verdict),
            is_deleted: false,
            upvotes: BTreeSet::new(),
            downvotes: BTreeSet::new(),
            moderation,
            replies: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.is_deleted
    }
}

/// Counts non-deleted replies at every depth of a forest.
pub fn count_live_replies(replies: &[Reply]) -> usize {
    replies
        .iter()
        .filter(|r| r.is_live())
        .map(|r| 1 + count_live_replies(&r.replies))
        .sum()
}

/// A long-form post together with its embedded reply forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    pub title: String,
    pub description: String,
    /// Rich text body
    pub content: String,
    pub category: CategoryId,
    /// Immutable after creation
    pub author: UserId,
    #[serde(default)]
    pub tags: Vec<String>,
    pub status: ContentStatus,
    #[serde(default)]
    pub is_deleted: bool,
    /// Last classifier result for the fragment body
    pub moderation: ModerationRecord,
    #[serde(default)]
    pub upvotes: BTreeSet<UserId>,
    #[serde(default)]
    pub downvotes: BTreeSet<UserId>,
    #[serde(default)]
    pub view_count: u64,
    /// Fan-out set only; never consulted for business rules
    #[serde(default)]
    pub subscribers: BTreeSet<UserId>,
    #[serde(default)]
    pub replies: Vec<Reply>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency counter. Owned by the repository.
    #[serde(default)]
    pub version: u64,
}

impl Fragment {
    /// The text handed to the classifier for a fragment body.
    pub fn moderation_text(title: &str, description: &str, content: &str) -> String {
        format!("{title}\n\n{description}\n\n{content}")
    }

    /// Published and not tombstoned: readable by anyone.
    pub fn is_public(&self) -> bool {
        self.status == ContentStatus::Published && !self.is_deleted
    }

    /// Authors and admins see their non-deleted fragments in any status.
    pub fn is_visible_to(&self, actor: &Actor) -> bool {
        if self.is_deleted {
            return false;
        }
        self.is_public() || actor.can_manage(self.author)
    }

    pub fn total_replies(&self) -> usize {
        count_live_replies(&self.replies)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Votable for Fragment {
    const KIND: &'static str = "Fragment";

    fn target_id(&self) -> String {
        self.id.to_string()
    }

    fn author_id(&self) -> UserId {
        self.author
    }

    fn is_tombstoned(&self) -> bool {
        self.is_deleted
    }

    fn upvotes(&self) -> &BTreeSet<UserId> {
        &self.upvotes
    }

    fn downvotes(&self) -> &BTreeSet<UserId> {
        &self.downvotes
    }

    fn upvotes_mut(&mut self) -> &mut BTreeSet<UserId> {
        &mut self.upvotes
    }

    fn downvotes_mut(&mut self) -> &mut BTreeSet<UserId> {
        &mut self.downvotes
    }
}

impl Votable for Reply {
    const KIND: &'static str = "Reply";

    fn target_id(&self) -> String {
        self.id.to_string()
    }

    fn author_id(&self) -> UserId {
        self.author
    }

    fn is_tombstoned(&self) -> bool {
        self.is_deleted
    }

    fn upvotes(&self) -> &BTreeSet<UserId> {
        &self.upvotes
    }

    fn downvotes(&self) -> &BTreeSet<UserId> {
        &self.downvotes
    }

    fn upvotes_mut(&mut self) -> &mut BTreeSet<UserId> {
        &mut self.upvotes
    }

    fn downvotes_mut(&mut self) -> &mut BTreeSet<UserId> {
        &mut self.downvotes
    }
}

/// Repository-side filter for fragment listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentQuery {
    pub author: Option<UserId>,
    pub category: Option<CategoryId>,
    /// `None` means any status
    pub statuses: Option<Vec<ContentStatus>>,
    pub include_deleted: bool,
}

impl FragmentQuery {
    pub fn matches(&self, fragment: &Fragment) -> bool {
        if fragment.is_deleted && !self.include_deleted {
            return false;
        }
        if self.author.is_some_and(|a| a != fragment.author) {
            return false;
        }
        if self.category.is_some_and(|c| c != fragment.category) {
            return false;
        }
        match &self.statuses {
            Some(statuses) => statuses.contains(&fragment.status),
            None => true,
        }
    }
}

/// 1-based pagination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub pages: usize,
}

impl<T> Page<T> {
    /// Slices an already filtered and sorted collection.
    pub fn paginate(all: Vec<T>, request: PageRequest) -> Self {
        let limit = request.limit.max(1);
        let page = request.page.max(1);
        let total = all.len();
        let offset = (page - 1).saturating_mul(limit);
        let items = all.into_iter().skip(offset).take(limit).collect();
        Self { items, total, page, pages: total.div_ceil(limit) }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            pages: self.pages,
        }
    }
}
