//! fragment-trails/crates/domains/src/lib.rs
//!
//! Entities, error taxonomy and port definitions for the fragment core.
//! No I/O lives here.

pub mod error;
pub mod models;
pub mod moderation;
pub mod notification;
pub mod ports;
pub mod votes;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use moderation::{ContentKind, ModerationRecord, ModerationResult, Verdict};
pub use notification::{Notification, NotificationContext, NotificationKind};
pub use ports::*;
pub use votes::{Votable, VoteAction};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fragment(author: UserId, status: ContentStatus) -> Fragment {
        let now = Utc::now();
        Fragment {
            id: FragmentId::new(),
            title: "Ownership".to_string(),
            description: "A tour".to_string(),
            content: "Borrowing rules...".to_string(),
            category: CategoryId::new(),
            author,
            tags: vec![],
            status,
            is_deleted: false,
            moderation: ModerationRecord::approved(),
            upvotes: Default::default(),
            downvotes: Default::default(),
            view_count: 0,
            subscribers: [author].into(),
            replies: vec![],
            created_at: now,
            updated_at: now,
            published_at: None,
            version: 0,
        }
    }

    #[test]
    fn drafts_are_visible_to_author_and_admin_only() {
        let author = UserId::new();
        let frag = fragment(author, ContentStatus::Draft);
        assert!(frag.is_visible_to(&Actor::user(author)));
        assert!(frag.is_visible_to(&Actor::admin(UserId::new())));
        assert!(!frag.is_visible_to(&Actor::user(UserId::new())));
    }

    #[test]
    fn tombstoned_fragment_is_visible_to_nobody() {
        let author = UserId::new();
        let mut frag = fragment(author, ContentStatus::Published);
        frag.is_deleted = true;
        assert!(!frag.is_public());
        assert!(!frag.is_visible_to(&Actor::user(author)));
        assert!(!frag.is_visible_to(&Actor::admin(author)));
    }

    #[test]
    fn aggregate_serializes_nested_replies_as_arrays() {
        let author = UserId::new();
        let mut frag = fragment(author, ContentStatus::Published);
        let mut parent = Reply::new(author, "top", ModerationRecord::approved(), Utc::now());
        parent
            .replies
            .push(Reply::new(author, "child", ModerationRecord::approved(), Utc::now()));
        frag.replies.push(parent);

        let json = serde_json::to_value(&frag).unwrap();
        assert_eq!(json["replies"][0]["replies"][0]["content"], "child");
        assert_eq!(json["status"], "published");
        assert_eq!(json["moderation"]["verdict"], "approved");

        let back: Fragment = serde_json::from_value(json).unwrap();
        assert_eq!(back, frag);
    }
}
