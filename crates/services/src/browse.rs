//! Reader listings: the public feed and an author's own fragments.

use domains::{Actor, ContentStatus, Fragment, FragmentQuery, Page, PageRequest, Result};
use tracing::instrument;

use crate::reply_tree;
use crate::requests::{FragmentListFilter, FragmentView};
use crate::service::FragmentService;

impl FragmentService {
    /// Published, non-deleted fragments. Replies are pruned for `actor`
    /// the same way `view_fragment` prunes them. Listing counts no views.
    #[instrument(skip(self, actor, filter))]
    pub async fn list_published_fragments(
        &self,
        actor: Option<Actor>,
        filter: FragmentListFilter,
        page: PageRequest,
    ) -> Result<Page<FragmentView>> {
        let query = FragmentQuery {
            category: filter.category,
            statuses: Some(vec![ContentStatus::Published]),
            ..FragmentQuery::default()
        };
        let fragments = self.fragments.list_fragments(&query).await?;
        Ok(page_of_views(fragments, &filter, page, actor.as_ref()))
    }

    /// Every non-deleted fragment the actor wrote, drafts and blocked ones included.
    #[instrument(skip(self, filter), fields(actor = %actor.user_id))]
    pub async fn list_own_fragments(
        &self,
        actor: Actor,
        filter: FragmentListFilter,
        page: PageRequest,
    ) -> Result<Page<FragmentView>> {
        let query = FragmentQuery {
            author: Some(actor.user_id),
            category: filter.category,
            ..FragmentQuery::default()
        };
        let fragments = self.fragments.list_fragments(&query).await?;
        Ok(page_of_views(fragments, &filter, page, Some(&actor)))
    }
}

fn page_of_views(
    fragments: Vec<Fragment>,
    filter: &FragmentListFilter,
    page: PageRequest,
    actor: Option<&Actor>,
) -> Page<FragmentView> {
    let mut fragments: Vec<Fragment> =
        fragments.into_iter().filter(|f| filter.matches(f)).collect();
    filter.sort(&mut fragments);
    Page::paginate(fragments, page)
        .map(|f| FragmentView::new(&f, reply_tree::visible_forest(&f.replies, actor)))
}
