//! Request and response shapes of the operation surface.
//!
//! Requests are validated before anything is loaded; a request that fails
//! here never reaches the classifier or the repository.

use chrono::{DateTime, Utc};
use domains::{
    CategoryId, ContentStatus, DomainError, Fragment, FragmentId, Reply, ReplyId, Result, UserId,
    Votable, VoteAction,
};
use serde::{Deserialize, Serialize};

use crate::lifecycle;
use crate::reply_tree;

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DomainError::ValidationError(format!("{field} is required")));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFragmentRequest {
    pub title: String,
    pub description: String,
    pub content: String,
    pub category: CategoryId,
    #[serde(default)]
    pub tags: Vec<String>,
    /// What the author asks for; moderation may override it.
    #[serde(default = "default_requested_status")]
    pub status: ContentStatus,
}

fn default_requested_status() -> ContentStatus {
    ContentStatus::Draft
}

impl CreateFragmentRequest {
    pub fn validate(&self) -> Result<()> {
        require("title", &self.title)?;
        require("description", &self.description)?;
        require("content", &self.content)?;
        lifecycle::check_requested(self.status)
    }
}

/// Partial update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateFragmentRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub category: Option<CategoryId>,
    pub tags: Option<Vec<String>>,
}

impl UpdateFragmentRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            require("title", title)?;
        }
        if let Some(description) = &self.description {
            require("description", description)?;
        }
        if let Some(content) = &self.content {
            require("content", content)?;
        }
        if self.title.is_none()
            && self.description.is_none()
            && self.content.is_none()
            && self.category.is_none()
            && self.tags.is_none()
        {
            return Err(DomainError::ValidationError("nothing to update".to_string()));
        }
        Ok(())
    }
}

/// Adding a reply and editing one share an entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyAction {
    /// Answer the fragment (`parent: None`) or another reply.
    Add { parent: Option<ReplyId> },
    Edit { reply_id: ReplyId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRequest {
    pub content: String,
    pub action: ReplyAction,
}

impl ReplyRequest {
    pub fn validate(&self) -> Result<()> {
        require("content", &self.content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyOutcome {
    pub reply: Reply,
    pub depth: usize,
    pub fragment_version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub action: VoteAction,
    /// Vote on this reply instead of the fragment.
    #[serde(default)]
    pub reply_id: Option<ReplyId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub upvotes: usize,
    pub downvotes: usize,
    pub score: i64,
}

/// A fragment as a reader sees it: hidden replies pruned, subscriber set
/// withheld, derived counters filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentView {
    pub id: FragmentId,
    pub title: String,
    pub description: String,
    pub content: String,
    pub category: CategoryId,
    pub author: UserId,
    pub tags: Vec<String>,
    pub status: ContentStatus,
    pub view_count: u64,
    pub votes: VoteTally,
    pub total_replies: usize,
    pub subscriber_count: usize,
    pub replies: Vec<Reply>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl FragmentView {
    pub fn new(fragment: &Fragment, replies: Vec<Reply>) -> Self {
        Self {
            id: fragment.id,
            title: fragment.title.clone(),
            description: fragment.description.clone(),
            content: fragment.content.clone(),
            category: fragment.category,
            author: fragment.author,
            tags: fragment.tags.clone(),
            status: fragment.status,
            view_count: fragment.view_count,
            votes: VoteTally {
                upvotes: fragment.upvotes.len(),
                downvotes: fragment.downvotes.len(),
                score: fragment.vote_score(),
            },
            total_replies: domains::count_live_replies(&replies),
            subscriber_count: fragment.subscriber_count(),
            replies,
            created_at: fragment.created_at,
            updated_at: fragment.updated_at,
            published_at: fragment.published_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorStats {
    pub total_fragments: usize,
    pub total_upvotes: usize,
    pub total_downvotes: usize,
    pub total_replies: usize,
    pub total_views: u64,
}

impl AuthorStats {
    pub fn tally<'a>(fragments: impl IntoIterator<Item = &'a Fragment>) -> Self {
        fragments.into_iter().fold(Self::default(), |mut stats, f| {
            stats.total_fragments += 1;
            stats.total_upvotes += f.upvotes.len();
            stats.total_downvotes += f.downvotes.len();
            stats.total_replies += f.total_replies();
            stats.total_views += f.view_count;
            stats
        })
    }
}

/// Creation-time order for reader listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Reader listing filter, shared by the public feed and an author's own list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentListFilter {
    pub category: Option<CategoryId>,
    /// Case-insensitive substring match on title, description and content
    pub search: Option<String>,
    pub order: ListOrder,
}

impl FragmentListFilter {
    pub(crate) fn matches(&self, fragment: &Fragment) -> bool {
        if self.category.is_some_and(|c| c != fragment.category) {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(needle) => {
                let needle = needle.to_lowercase();
                [&fragment.title, &fragment.description, &fragment.content]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            }
            None => true,
        }
    }

    pub(crate) fn sort(&self, fragments: &mut [Fragment]) {
        match self.order {
            ListOrder::NewestFirst => fragments.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            ListOrder::OldestFirst => fragments.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        }
    }
}

/// Admin listing filter over fragments. Only drafts held back by moderation
/// are listed, so `status: draft` requires `awaiting_review`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminFragmentFilter {
    pub status: Option<ContentStatus>,
    pub author: Option<UserId>,
    pub category: Option<CategoryId>,
    pub awaiting_review: bool,
}

/// Admin listing filter over replies across all fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminReplyFilter {
    pub status: Option<ContentStatus>,
    pub author: Option<UserId>,
    pub category: Option<CategoryId>,
    /// Ignored unless within 1..=3
    pub depth: Option<usize>,
    /// Case-insensitive substring match on content
    pub search: Option<String>,
    pub awaiting_review: bool,
}

impl AdminReplyFilter {
    pub(crate) fn matches(&self, row: &AdminReplyRow) -> bool {
        if self.status.is_some_and(|s| s != row.status) {
            return false;
        }
        if self.author.is_some_and(|a| a != row.author) {
            return false;
        }
        if self.category.is_some_and(|c| c != row.category) {
            return false;
        }
        if let Some(depth) = self.depth.filter(|d| (1..=reply_tree::MAX_REPLY_DEPTH).contains(d)) {
            if row.depth != depth {
                return false;
            }
        }
        if let Some(needle) = self.search.as_deref().map(str::to_lowercase) {
            if !row.content.to_lowercase().contains(&needle) {
                return false;
            }
        }
        !self.awaiting_review || row.awaiting_review
    }
}

/// One reply in the admin moderation listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminReplyRow {
    pub reply_id: ReplyId,
    pub fragment_id: FragmentId,
    pub fragment_title: String,
    pub category: CategoryId,
    pub parent_reply_id: Option<ReplyId>,
    pub depth: usize,
    pub author: UserId,
    pub content: String,
    pub status: ContentStatus,
    pub verdict: domains::Verdict,
    pub summary: String,
    pub awaiting_review: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create() -> CreateFragmentRequest {
        CreateFragmentRequest {
            title: "Lifetimes".into(),
            description: "Why 'a".into(),
            content: "Body".into(),
            category: CategoryId::new(),
            tags: vec![],
            status: ContentStatus::Published,
        }
    }

    #[test]
    fn create_requires_every_text_field() {
        assert!(create().validate().is_ok());
        let blank = CreateFragmentRequest { content: "   ".into(), ..create() };
        assert_eq!(
            blank.validate().unwrap_err(),
            DomainError::ValidationError("content is required".into())
        );
    }

    #[test]
    fn create_cannot_ask_for_blocked() {
        let req = CreateFragmentRequest { status: ContentStatus::Blocked, ..create() };
        assert!(matches!(req.validate(), Err(DomainError::InvalidTransition(_))));
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(UpdateFragmentRequest::default().validate().is_err());
        let req = UpdateFragmentRequest { title: Some("".into()), ..Default::default() };
        assert!(req.validate().is_err());
        let req = UpdateFragmentRequest { tags: Some(vec!["rust".into()]), ..Default::default() };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn reply_action_uses_tagged_json() {
        let req: ReplyRequest = serde_json::from_value(serde_json::json!({
            "content": "agreed",
            "action": { "type": "add", "parent": null }
        }))
        .unwrap();
        assert_eq!(req.action, ReplyAction::Add { parent: None });
    }

    #[test]
    fn list_filter_searches_every_text_field() {
        let fragment = Fragment {
            id: FragmentId::new(),
            title: "Pinning".into(),
            description: "Self-referential futures".into(),
            content: "Unpin is an auto trait".into(),
            category: CategoryId::new(),
            author: UserId::new(),
            tags: vec![],
            status: ContentStatus::Published,
            is_deleted: false,
            moderation: domains::ModerationRecord::approved(),
            upvotes: Default::default(),
            downvotes: Default::default(),
            view_count: 0,
            subscribers: Default::default(),
            replies: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            published_at: None,
            version: 1,
        };
        let search = |s: &str| FragmentListFilter { search: Some(s.into()), ..Default::default() };

        assert!(search("pinning").matches(&fragment));
        assert!(search("FUTURES").matches(&fragment));
        assert!(search("auto trait").matches(&fragment));
        assert!(!search("borrowck").matches(&fragment));
        assert!(search("   ").matches(&fragment));

        let elsewhere = FragmentListFilter { category: Some(CategoryId::new()), ..Default::default() };
        assert!(!elsewhere.matches(&fragment));
    }
}
