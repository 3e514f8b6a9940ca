//! # In-memory adapters
//!
//! DashMap-backed implementations of the persistence ports. Used by the
//! binary's default profile and by the integration tests.
//!
//! The version guard holds the shard lock between the compare and the
//! swap, so two concurrent saves of the same aggregate cannot both win.

use std::collections::BTreeSet;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use domains::{
    CategoryId, CategoryRepository, DomainError, FollowerDirectory, Fragment, FragmentId,
    FragmentQuery, FragmentRepository, Result, UserId,
};
use tracing::debug;

#[derive(Debug, Default)]
pub struct InMemoryFragmentRepository {
    fragments: DashMap<FragmentId, Fragment>,
}

impl InMemoryFragmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

#[async_trait]
impl FragmentRepository for InMemoryFragmentRepository {
    async fn insert_fragment(&self, fragment: &Fragment) -> Result<Fragment> {
        match self.fragments.entry(fragment.id) {
            Entry::Occupied(_) => Err(DomainError::Internal(format!(
                "fragment {} already exists",
                fragment.id
            ))),
            Entry::Vacant(slot) => {
                let mut stored = fragment.clone();
                stored.version = 1;
                slot.insert(stored.clone());
                debug!(fragment_id = %stored.id, "fragment inserted");
                Ok(stored)
            }
        }
    }

    async fn load_fragment(&self, id: FragmentId) -> Result<Fragment> {
        self.fragments
            .get(&id)
            .map(|f| f.value().clone())
            .ok_or_else(|| DomainError::fragment_not_found(id))
    }

    async fn save_fragment(&self, fragment: &Fragment, expected_version: u64) -> Result<Fragment> {
        let mut slot = self
            .fragments
            .get_mut(&fragment.id)
            .ok_or_else(|| DomainError::fragment_not_found(fragment.id))?;

        if slot.version != expected_version {
            return Err(DomainError::VersionConflict {
                id: fragment.id.to_string(),
                expected: expected_version,
                found: slot.version,
            });
        }

        let mut stored = fragment.clone();
        stored.version = expected_version + 1;
        stored.view_count = slot.view_count;
        *slot = stored.clone();
        debug!(fragment_id = %stored.id, version = stored.version, "fragment saved");
        Ok(stored)
    }

    async fn record_view(&self, id: FragmentId) -> Result<u64> {
        let mut slot = self
            .fragments
            .get_mut(&id)
            .ok_or_else(|| DomainError::fragment_not_found(id))?;
        slot.view_count += 1;
        Ok(slot.view_count)
    }

    async fn list_fragments(&self, query: &FragmentQuery) -> Result<Vec<Fragment>> {
        let mut fragments: Vec<Fragment> = self
            .fragments
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        fragments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(fragments)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCategoryRepository {
    categories: DashSet<CategoryId>,
}

impl InMemoryCategoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories(ids: impl IntoIterator<Item = CategoryId>) -> Self {
        let repo = Self::new();
        for id in ids {
            repo.add(id);
        }
        repo
    }

    pub fn add(&self, id: CategoryId) {
        self.categories.insert(id);
    }
}

#[async_trait]
impl CategoryRepository for InMemoryCategoryRepository {
    async fn category_exists(&self, id: CategoryId) -> Result<bool> {
        Ok(self.categories.contains(&id))
    }
}

/// author -> followers
#[derive(Debug, Default)]
pub struct InMemoryFollowerDirectory {
    followers: DashMap<UserId, BTreeSet<UserId>>,
}

impl InMemoryFollowerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn follow(&self, follower: UserId, author: UserId) {
        if follower != author {
            self.followers.entry(author).or_default().insert(follower);
        }
    }

    pub fn unfollow(&self, follower: UserId, author: UserId) {
        if let Some(mut set) = self.followers.get_mut(&author) {
            set.remove(&follower);
        }
    }
}

#[async_trait]
impl FollowerDirectory for InMemoryFollowerDirectory {
    async fn followers_of(&self, author: UserId) -> Result<BTreeSet<UserId>> {
        Ok(self.followers.get(&author).map(|set| set.clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::{ContentStatus, ModerationRecord};

    fn fragment(author: UserId, status: ContentStatus) -> Fragment {
        let now = Utc::now();
        Fragment {
            id: FragmentId::new(),
            title: "Traits".into(),
            description: "Object safety".into(),
            content: "dyn Trait needs...".into(),
            category: CategoryId::new(),
            author,
            tags: vec![],
            status,
            is_deleted: false,
            moderation: ModerationRecord::approved(),
            upvotes: Default::default(),
            downvotes: Default::default(),
            view_count: 0,
            subscribers: Default::default(),
            replies: vec![],
            created_at: now,
            updated_at: now,
            published_at: None,
            version: 0,
        }
    }

    #[tokio::test]
    async fn insert_starts_at_version_one() {
        let repo = InMemoryFragmentRepository::new();
        let stored = repo.insert_fragment(&fragment(UserId::new(), ContentStatus::Draft)).await.unwrap();
        assert_eq!(stored.version, 1);
        assert!(repo.insert_fragment(&stored).await.is_err());
    }

    #[tokio::test]
    async fn stale_save_is_rejected_and_leaves_state_alone() {
        let repo = InMemoryFragmentRepository::new();
        let stored = repo.insert_fragment(&fragment(UserId::new(), ContentStatus::Draft)).await.unwrap();

        let mut first = stored.clone();
        first.title = "First writer".into();
        let saved = repo.save_fragment(&first, stored.version).await.unwrap();
        assert_eq!(saved.version, 2);

        let mut second = stored.clone();
        second.title = "Second writer".into();
        let err = repo.save_fragment(&second, stored.version).await.unwrap_err();
        assert_eq!(
            err,
            DomainError::VersionConflict { id: stored.id.to_string(), expected: 1, found: 2 }
        );
        assert_eq!(repo.load_fragment(stored.id).await.unwrap().title, "First writer");
    }

    #[tokio::test]
    async fn views_do_not_move_the_version() {
        let repo = InMemoryFragmentRepository::new();
        let stored = repo.insert_fragment(&fragment(UserId::new(), ContentStatus::Draft)).await.unwrap();

        assert_eq!(tokio_test::assert_ok!(repo.record_view(stored.id).await), 1);
        assert_eq!(repo.record_view(stored.id).await.unwrap(), 2);

        // a writer holding the pre-view copy still wins and keeps the count
        let mut edited = stored.clone();
        edited.title = "Edited".into();
        let saved = repo.save_fragment(&edited, stored.version).await.unwrap();
        assert_eq!(saved.version, 2);
        assert_eq!(saved.view_count, 2);
        tokio_test::assert_err!(repo.record_view(FragmentId::new()).await);
    }

    #[tokio::test]
    async fn concurrent_saves_from_one_version_have_a_single_winner() {
        let repo = std::sync::Arc::new(InMemoryFragmentRepository::new());
        let stored = repo.insert_fragment(&fragment(UserId::new(), ContentStatus::Draft)).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = repo.clone();
                let mut copy = stored.clone();
                copy.title = format!("writer {i}");
                tokio::spawn(async move { repo.save_fragment(&copy, 1).await })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn list_applies_the_query() {
        let repo = InMemoryFragmentRepository::new();
        let author = UserId::new();
        repo.insert_fragment(&fragment(author, ContentStatus::Published)).await.unwrap();
        repo.insert_fragment(&fragment(author, ContentStatus::Draft)).await.unwrap();
        let mut gone = fragment(author, ContentStatus::Blocked);
        gone.is_deleted = true;
        repo.insert_fragment(&gone).await.unwrap();
        repo.insert_fragment(&fragment(UserId::new(), ContentStatus::Published)).await.unwrap();

        let query = FragmentQuery {
            author: Some(author),
            statuses: Some(vec![ContentStatus::Published, ContentStatus::Blocked]),
            ..FragmentQuery::default()
        };
        assert_eq!(repo.list_fragments(&query).await.unwrap().len(), 1);

        let everything = FragmentQuery { include_deleted: true, ..FragmentQuery::default() };
        assert_eq!(repo.list_fragments(&everything).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn followers_are_per_author() {
        let dir = InMemoryFollowerDirectory::new();
        let (author, a, b) = (UserId::new(), UserId::new(), UserId::new());
        dir.follow(a, author);
        dir.follow(b, author);
        dir.follow(author, author);
        dir.unfollow(b, author);
        assert_eq!(dir.followers_of(author).await.unwrap(), BTreeSet::from([a]));
        assert!(dir.followers_of(a).await.unwrap().is_empty());
    }
}
