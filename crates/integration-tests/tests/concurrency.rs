//! Optimistic concurrency on the fragment aggregate.

use std::sync::Arc;

use chrono::Utc;
use domains::{Actor, DomainError, FragmentRepository, ModerationRecord, Reply, UserId};
use integration_tests::Harness;
use services::{reply_tree, retry_on_conflict, ReplyAction, ReplyRequest, UpdateFragmentRequest};

#[tokio::test]
async fn second_writer_from_the_same_version_is_refused() {
    let h = Harness::new();
    let fragment = h.published_by(UserId::new()).await;

    // bring the aggregate to version 5
    for n in 0..4 {
        h.reply(UserId::new(), &fragment, None, &format!("warm-up {n}")).await.unwrap();
    }
    let mut first = h.fragments.load_fragment(fragment.id).await.unwrap();
    let mut second = h.fragments.load_fragment(fragment.id).await.unwrap();
    assert_eq!(first.version, 5);

    let a = Reply::new(UserId::new(), "from A", ModerationRecord::approved(), Utc::now());
    let b = Reply::new(UserId::new(), "from B", ModerationRecord::approved(), Utc::now());
    let a_id = reply_tree::insert(&mut first.replies, a, None).unwrap().reply_id;
    let b_id = reply_tree::insert(&mut second.replies, b, None).unwrap().reply_id;

    let saved = h.fragments.save_fragment(&first, 5).await.unwrap();
    assert_eq!(saved.version, 6);
    let err = h.fragments.save_fragment(&second, 5).await.unwrap_err();
    assert_eq!(
        err,
        DomainError::VersionConflict { id: fragment.id.to_string(), expected: 5, found: 6 }
    );

    let stored = h.fragments.load_fragment(fragment.id).await.unwrap();
    assert!(reply_tree::find(&stored.replies, a_id).is_some());
    assert!(reply_tree::find(&stored.replies, b_id).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_replies_all_land_when_callers_retry() {
    let h = Arc::new(Harness::new());
    let fragment = h.published_by(UserId::new()).await;
    let writers = 6;

    let tasks: Vec<_> = (0..writers)
        .map(|n| {
            let h = h.clone();
            let fragment_id = fragment.id;
            tokio::spawn(async move {
                let actor = Actor::user(UserId::new());
                let request = ReplyRequest {
                    content: format!("reply {n}"),
                    action: ReplyAction::Add { parent: None },
                };
                retry_on_conflict(100, || {
                    h.service.add_or_edit_reply(actor, fragment_id, request.clone())
                })
                .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = h.fragments.load_fragment(fragment.id).await.unwrap();
    assert_eq!(stored.total_replies(), writers);
    assert_eq!(stored.version, 1 + writers as u64);
    // every reply author became a subscriber alongside the fragment author
    assert_eq!(stored.subscribers.len(), 1 + writers);
}

#[tokio::test]
async fn readers_never_conflict_with_writers() {
    let h = Harness::new();
    let author = UserId::new();
    let fragment = h.published_by(author).await;
    let before = h.fragments.load_fragment(fragment.id).await.unwrap();

    for _ in 0..3 {
        h.service.view_fragment(None, fragment.id).await.unwrap();
    }
    let after_views = h.fragments.load_fragment(fragment.id).await.unwrap();
    assert_eq!(after_views.version, before.version);
    assert_eq!(after_views.view_count, 3);

    // a copy loaded before the views still saves, and the count survives
    let mut stale = before.clone();
    stale.title = "Renamed offline".into();
    let saved = h.fragments.save_fragment(&stale, before.version).await.unwrap();
    assert_eq!(saved.view_count, 3);

    let edit = UpdateFragmentRequest { title: Some("Renamed".into()), ..Default::default() };
    let edited = h.service.update_fragment(Actor::user(author), fragment.id, edit).await.unwrap();
    assert_eq!(edited.version, before.version + 2);
    assert_eq!(edited.view_count, 3);
    assert_eq!(h.metrics.version_conflicts(), 0);
}
