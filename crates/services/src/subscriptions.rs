//! Implicit subscriptions: authoring, replying or voting on a fragment
//! subscribes the user to its updates. There is no unsubscribe here.

use std::collections::BTreeSet;

use domains::{Fragment, UserId};

/// Idempotent. Returns `true` if `user` was not subscribed before.
pub fn ensure_subscribed(fragment: &mut Fragment, user: UserId) -> bool {
    fragment.subscribers.insert(user)
}

/// Subscribers to notify about a change made by `trigger`.
pub fn recipients_excluding(fragment: &Fragment, trigger: UserId) -> BTreeSet<UserId> {
    fragment.subscribers.iter().copied().filter(|u| *u != trigger).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::{CategoryId, ContentStatus, FragmentId, ModerationRecord};

    fn fragment(author: UserId) -> Fragment {
        Fragment {
            id: FragmentId::new(),
            title: "t".into(),
            description: "d".into(),
            content: "c".into(),
            category: CategoryId::new(),
            author,
            tags: vec![],
            status: ContentStatus::Published,
            is_deleted: false,
            moderation: ModerationRecord::approved(),
            upvotes: BTreeSet::new(),
            downvotes: BTreeSet::new(),
            view_count: 0,
            subscribers: BTreeSet::from([author]),
            replies: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            published_at: None,
            version: 1,
        }
    }

    #[test]
    fn subscribing_twice_is_a_no_op() {
        let author = UserId::new();
        let reader = UserId::new();
        let mut frag = fragment(author);
        assert!(ensure_subscribed(&mut frag, reader));
        assert!(!ensure_subscribed(&mut frag, reader));
        assert!(!ensure_subscribed(&mut frag, author));
        assert_eq!(frag.subscriber_count(), 2);
    }

    #[test]
    fn trigger_is_not_a_recipient() {
        let author = UserId::new();
        let reader = UserId::new();
        let mut frag = fragment(author);
        ensure_subscribed(&mut frag, reader);
        assert_eq!(recipients_excluding(&frag, author), BTreeSet::from([reader]));
    }
}
