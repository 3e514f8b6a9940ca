//! Notification sinks.
//!
//! `LogNotificationSink` writes one structured log line per notification and
//! keeps nothing. `NotificationOutbox` keeps a bounded inbox per recipient so
//! a driver or test can read notifications back; once an inbox is full the
//! oldest entry is dropped.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use dashmap::DashMap;
use domains::{Notification, NotificationSink, Result, UserId};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_INBOX_CAPACITY: usize = 100;

#[derive(Debug)]
pub struct NotificationOutbox {
    capacity: usize,
    inboxes: DashMap<UserId, VecDeque<Notification>>,
}

impl Default for NotificationOutbox {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_INBOX_CAPACITY)
    }
}

impl NotificationOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// `capacity` is per recipient and never below one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), inboxes: DashMap::new() }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Every notification still held by at least one inbox, oldest first.
    pub fn all(&self) -> Vec<Notification> {
        let mut unique: BTreeMap<Uuid, Notification> = BTreeMap::new();
        for inbox in self.inboxes.iter() {
            for n in inbox.value() {
                unique.entry(n.id).or_insert_with(|| n.clone());
            }
        }
        let mut all: Vec<Notification> = unique.into_values().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    /// The recipient's inbox, oldest first.
    pub fn for_recipient(&self, user: UserId) -> Vec<Notification> {
        self.inboxes
            .get(&user)
            .map(|inbox| inbox.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inboxes.iter().all(|inbox| inbox.is_empty())
    }
}

#[async_trait]
impl NotificationSink for NotificationOutbox {
    async fn dispatch(&self, notification: Notification) -> Result<()> {
        for recipient in &notification.recipients {
            let mut inbox = self.inboxes.entry(*recipient).or_default();
            inbox.push_back(notification.clone());
            while inbox.len() > self.capacity {
                if let Some(evicted) = inbox.pop_front() {
                    debug!(user_id = %recipient, notification_id = %evicted.id, "inbox full, oldest dropped");
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn dispatch(&self, notification: Notification) -> Result<()> {
        info!(
            notification_id = %notification.id,
            kind = ?notification.kind,
            recipients = notification.recipients.len(),
            fragment_id = %notification.context.fragment_id,
            "notification dispatched"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{FragmentId, NotificationContext, NotificationKind};
    use std::collections::BTreeSet;

    fn context() -> NotificationContext {
        NotificationContext::for_fragment(FragmentId::new(), UserId::new(), "Title")
    }

    #[tokio::test]
    async fn outbox_filters_by_recipient() {
        let outbox = NotificationOutbox::new();
        let (alice, bob) = (UserId::new(), UserId::new());

        outbox
            .dispatch(Notification::new(NotificationKind::NewFragment, BTreeSet::from([alice, bob]), context()))
            .await
            .unwrap();
        outbox
            .dispatch(Notification::new(NotificationKind::FragmentUpdated, BTreeSet::from([alice]), context()))
            .await
            .unwrap();

        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox.for_recipient(alice).len(), 2);
        let for_bob = outbox.for_recipient(bob);
        assert_eq!(for_bob.len(), 1);
        assert_eq!(for_bob[0].kind, NotificationKind::NewFragment);
        assert!(outbox.for_recipient(UserId::new()).is_empty());
    }

    #[tokio::test]
    async fn full_inboxes_drop_the_oldest() {
        let outbox = NotificationOutbox::with_capacity(2);
        let (busy, quiet) = (UserId::new(), UserId::new());

        let first = Notification::new(NotificationKind::NewReply, BTreeSet::from([busy, quiet]), context());
        outbox.dispatch(first.clone()).await.unwrap();
        for _ in 0..2 {
            let n = Notification::new(NotificationKind::LikeFragment, BTreeSet::from([busy]), context());
            outbox.dispatch(n).await.unwrap();
        }

        let inbox = outbox.for_recipient(busy);
        assert_eq!(inbox.len(), 2);
        assert!(inbox.iter().all(|n| n.kind == NotificationKind::LikeFragment));
        // still held for the other recipient
        assert_eq!(outbox.for_recipient(quiet)[0].id, first.id);
        assert_eq!(outbox.len(), 3);
    }

    #[tokio::test]
    async fn zero_capacity_still_keeps_the_latest() {
        let outbox = NotificationOutbox::with_capacity(0);
        assert_eq!(outbox.capacity(), 1);
        let user = UserId::new();
        for _ in 0..3 {
            let n = Notification::new(NotificationKind::NewReply, BTreeSet::from([user]), context());
            outbox.dispatch(n).await.unwrap();
        }
        assert_eq!(outbox.for_recipient(user).len(), 1);
    }

    #[tokio::test]
    async fn log_sink_accepts_everything() {
        let sink = LogNotificationSink;
        let n = Notification::new(NotificationKind::NewFragment, BTreeSet::from([UserId::new()]), context());
        tokio_test::assert_ok!(sink.dispatch(n).await);
    }
}
