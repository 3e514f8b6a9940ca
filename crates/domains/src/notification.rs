//! # Notifications
//!
//! Events the core hands to the notification dispatcher after a mutation
//! has been persisted. Delivery is fire-and-forget from the core's side.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{FragmentId, ReplyId, UserId};
use crate::votes::VoteAction;

/// Title previews are cut to this many characters.
pub const TITLE_PREVIEW_CHARS: usize = 60;
/// Reply previews are cut to this many characters.
pub const REPLY_PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    NewFragment,
    FragmentUpdated,
    NewReply,
    ReplyToReply,
    LikeFragment,
    DislikeFragment,
    LikeReply,
    DislikeReply,
}

impl NotificationKind {
    /// The event for a vote, or `None` for a removal.
    pub fn for_vote(action: VoteAction, on_reply: bool) -> Option<Self> {
        match (action, on_reply) {
            (VoteAction::Upvote, false) => Some(Self::LikeFragment),
            (VoteAction::Downvote, false) => Some(Self::DislikeFragment),
            (VoteAction::Upvote, true) => Some(Self::LikeReply),
            (VoteAction::Downvote, true) => Some(Self::DislikeReply),
            (VoteAction::Remove, _) => None,
        }
    }
}

/// What the dispatcher needs to render a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContext {
    pub fragment_id: FragmentId,
    pub reply_id: Option<ReplyId>,
    /// The user whose action caused the event
    pub trigger_user: UserId,
    pub fragment_title: Option<String>,
    pub reply_text: Option<String>,
}

impl NotificationContext {
    pub fn for_fragment(fragment_id: FragmentId, trigger_user: UserId, title: &str) -> Self {
        Self {
            fragment_id,
            reply_id: None,
            trigger_user,
            fragment_title: Some(preview(title, TITLE_PREVIEW_CHARS)),
            reply_text: None,
        }
    }

    pub fn for_reply(
        fragment_id: FragmentId,
        reply_id: ReplyId,
        trigger_user: UserId,
        reply_text: &str,
    ) -> Self {
        Self {
            fragment_id,
            reply_id: Some(reply_id),
            trigger_user,
            fragment_title: None,
            reply_text: Some(preview(reply_text, REPLY_PREVIEW_CHARS)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub recipients: BTreeSet<UserId>,
    pub context: NotificationContext,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        recipients: BTreeSet<UserId>,
        context: NotificationContext,
    ) -> Self {
        Self { id: Uuid::now_v7(), kind, recipients, context, created_at: Utc::now() }
    }
}

/// Truncates on a char boundary.
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
