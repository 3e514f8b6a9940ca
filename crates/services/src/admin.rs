//! Moderation listings and per-author totals. Read-only.

use domains::{
    Actor, ContentStatus, DomainError, Fragment, FragmentQuery, Page, PageRequest, Result, UserId,
};
use tracing::instrument;

use crate::reply_tree;
use crate::requests::{AdminFragmentFilter, AdminReplyFilter, AdminReplyRow, AuthorStats};
use crate::service::{ensure_admin, FragmentService};

impl FragmentService {
    /// Fragments for the moderation queue, newest first. Deleted fragments
    /// never appear. Drafts stay private to their authors unless moderation
    /// held them back, in which case they wait here for a decision.
    #[instrument(skip(self, filter), fields(admin = %actor.user_id))]
    pub async fn list_fragments_for_admin(
        &self,
        actor: Actor,
        filter: AdminFragmentFilter,
        page: PageRequest,
    ) -> Result<Page<Fragment>> {
        ensure_admin(&actor)?;
        if filter.status == Some(ContentStatus::Draft) && !filter.awaiting_review {
            return Err(DomainError::ValidationError(
                "drafts are listed for moderation only together with awaiting_review".to_string(),
            ));
        }
        let query = FragmentQuery {
            author: filter.author,
            category: filter.category,
            statuses: filter.status.map(|status| vec![status]),
            include_deleted: false,
        };

        let mut fragments: Vec<Fragment> = self
            .fragments
            .list_fragments(&query)
            .await?
            .into_iter()
            .filter(|f| f.status != ContentStatus::Draft || f.moderation.awaiting_review())
            .filter(|f| !filter.awaiting_review || f.moderation.awaiting_review())
            .collect();
        fragments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::paginate(fragments, page))
    }

    /// Every live reply across live fragments, flattened with its position
    /// in the tree, newest first.
    #[instrument(skip(self, filter), fields(admin = %actor.user_id))]
    pub async fn list_replies_for_admin(
        &self,
        actor: Actor,
        filter: AdminReplyFilter,
        page: PageRequest,
    ) -> Result<Page<AdminReplyRow>> {
        ensure_admin(&actor)?;
        let query = FragmentQuery { category: filter.category, ..FragmentQuery::default() };
        let fragments = self.fragments.list_fragments(&query).await?;

        let mut rows: Vec<AdminReplyRow> = fragments
            .iter()
            .flat_map(|fragment| {
                reply_tree::flatten(&fragment.replies).into_iter().map(move |flat| AdminReplyRow {
                    reply_id: flat.reply.id,
                    fragment_id: fragment.id,
                    fragment_title: fragment.title.clone(),
                    category: fragment.category,
                    parent_reply_id: flat.parent_id,
                    depth: flat.depth,
                    author: flat.reply.author,
                    content: flat.reply.content.clone(),
                    status: flat.reply.status,
                    verdict: flat.reply.moderation.verdict,
                    summary: flat.reply.moderation.summary.clone(),
                    awaiting_review: flat.reply.moderation.awaiting_review(),
                    created_at: flat.reply.created_at,
                    updated_at: flat.reply.updated_at,
                })
            })
            .filter(|row| filter.matches(row))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::paginate(rows, page))
    }

    /// Totals over an author's live fragments. Authors see their own,
    /// admins see anyone's.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn author_stats(&self, actor: Actor, author: UserId) -> Result<AuthorStats> {
        if !actor.can_manage(author) {
            return Err(DomainError::Unauthorized(format!(
                "user {} may not read stats of {author}",
                actor.user_id
            )));
        }
        let query = FragmentQuery { author: Some(author), ..FragmentQuery::default() };
        let fragments = self.fragments.list_fragments(&query).await?;
        Ok(AuthorStats::tally(&fragments))
    }
}
