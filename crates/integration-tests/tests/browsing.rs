//! Reader listings: the public feed and an author's own fragments.

use std::time::Duration;

use domains::{Actor, CategoryId, ContentStatus, PageRequest, UserId};
use integration_tests::{Harness, BLOCKED_TERM, REVIEW_TERM};
use services::{FragmentListFilter, ListOrder};

#[tokio::test]
async fn feed_lists_only_published_fragments() {
    let h = Harness::new();
    let author = UserId::new();
    let live = h.published_by(author).await;
    let gone = h.published_by(author).await;
    h.service.delete_fragment(Actor::user(author), gone.id).await.unwrap();
    h.service
        .create_fragment(Actor::user(author), h.request("drafting", ContentStatus::Draft))
        .await
        .unwrap();
    h.service
        .create_fragment(Actor::user(author), h.request(BLOCKED_TERM, ContentStatus::Published))
        .await
        .unwrap();
    h.service
        .create_fragment(
            Actor::user(author),
            h.request(&format!("Try this {REVIEW_TERM}"), ContentStatus::Published),
        )
        .await
        .unwrap();

    let feed = h
        .service
        .list_published_fragments(None, FragmentListFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(feed.total, 1);
    assert_eq!(feed.items[0].id, live.id);

    // the author's own drafts do not leak into the feed either
    let own_view = h
        .service
        .list_published_fragments(Some(Actor::user(author)), FragmentListFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(own_view.total, 1);
}

#[tokio::test]
async fn feed_filters_searches_and_orders() {
    let h = Harness::new();
    let author = UserId::new();
    let older = h.published_by(author).await;
    tokio::time::sleep(Duration::from_millis(2)).await;
    let newer = h
        .service
        .create_fragment(Actor::user(author), h.request("Variance of &'a mut T", ContentStatus::Published))
        .await
        .unwrap();

    let search = FragmentListFilter { search: Some("VARIANCE".into()), ..Default::default() };
    let page = h.service.list_published_fragments(None, search, PageRequest::default()).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, newer.id);

    let elsewhere = FragmentListFilter { category: Some(CategoryId::new()), ..Default::default() };
    let page = h.service.list_published_fragments(None, elsewhere, PageRequest::default()).await.unwrap();
    assert!(page.items.is_empty());

    let here = FragmentListFilter { category: Some(h.category), ..Default::default() };
    let page = h.service.list_published_fragments(None, here, PageRequest::default()).await.unwrap();
    assert_eq!(page.items.iter().map(|f| f.id).collect::<Vec<_>>(), vec![newer.id, older.id]);

    let oldest = FragmentListFilter { order: ListOrder::OldestFirst, ..Default::default() };
    let page = h
        .service
        .list_published_fragments(None, oldest, PageRequest { page: 1, limit: 1 })
        .await
        .unwrap();
    assert_eq!((page.total, page.pages), (2, 2));
    assert_eq!(page.items[0].id, older.id);
}

#[tokio::test]
async fn feed_prunes_hidden_replies_and_counts_no_views() {
    let h = Harness::new();
    let writer = UserId::new();
    let fragment = h.published_by(UserId::new()).await;
    h.reply(writer, &fragment, None, "visible").await.unwrap();
    h.reply(writer, &fragment, None, &format!("a {REVIEW_TERM}")).await.unwrap();

    let feed = h
        .service
        .list_published_fragments(None, FragmentListFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(feed.items[0].total_replies, 1);
    assert_eq!(feed.items[0].view_count, 0);

    let as_writer = h
        .service
        .list_published_fragments(Some(Actor::user(writer)), FragmentListFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(as_writer.items[0].total_replies, 2);
}

#[tokio::test]
async fn own_list_shows_every_status_but_no_tombstones() {
    let h = Harness::new();
    let (author, other) = (UserId::new(), UserId::new());
    let live = h.published_by(author).await;
    let draft = h
        .service
        .create_fragment(Actor::user(author), h.request("drafting", ContentStatus::Draft))
        .await
        .unwrap();
    let blocked = h
        .service
        .create_fragment(Actor::user(author), h.request(BLOCKED_TERM, ContentStatus::Published))
        .await
        .unwrap();
    let gone = h.published_by(author).await;
    h.service.delete_fragment(Actor::user(author), gone.id).await.unwrap();
    h.published_by(other).await;

    let mine = h
        .service
        .list_own_fragments(Actor::user(author), FragmentListFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(mine.total, 3);
    let ids: Vec<_> = mine.items.iter().map(|f| f.id).collect();
    assert!(ids.contains(&live.id));
    assert!(ids.contains(&draft.id));
    assert!(ids.contains(&blocked.id));
    assert!(!ids.contains(&gone.id));

    let search = FragmentListFilter { search: Some("drafting".into()), ..Default::default() };
    let page = h.service.list_own_fragments(Actor::user(author), search, PageRequest::default()).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].status, ContentStatus::Draft);

    // an admin still only lists their own work here
    let admin = h
        .service
        .list_own_fragments(Actor::admin(UserId::new()), FragmentListFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(admin.total, 0);
}
