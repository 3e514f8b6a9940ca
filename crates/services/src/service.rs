//! # FragmentService
//!
//! Coordinates the flow between callers and the core ports.
//!
//! Every write follows the same shape: load the aggregate, check the actor
//! and the target, consult moderation if text changed, mutate a working
//! copy, save it under the version it was loaded with, then notify. Errors
//! raised before the save leave storage untouched; a notification failure
//! after the save is logged and swallowed.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use domains::{
    Actor, CategoryId, CategoryRepository, ContentKind, ContentStatus, DomainError,
    FollowerDirectory, Fragment, FragmentId, FragmentRepository, ModerationClassifier,
    Notification, NotificationContext, NotificationKind, NotificationSink,
    Reply, ReplyId, Result, UserId,
};
use tracing::{debug, info, instrument, warn};

use crate::lifecycle;
use crate::metrics::Metrics;
use crate::moderation_gate::{ModerationGate, DEFAULT_CLASSIFIER_TIMEOUT};
use crate::reply_tree;
use crate::requests::{
    CreateFragmentRequest, FragmentView, ReplyAction, ReplyOutcome, ReplyRequest,
    UpdateFragmentRequest, VoteRequest,
};
use crate::subscriptions;
use crate::vote_ledger::{self, VoteOutcome};

/// The adapters a service is built from.
#[derive(Clone)]
pub struct Ports {
    pub fragments: Arc<dyn FragmentRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub followers: Arc<dyn FollowerDirectory>,
    pub classifier: Arc<dyn ModerationClassifier>,
    pub notifications: Arc<dyn NotificationSink>,
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub classifier_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { classifier_timeout: DEFAULT_CLASSIFIER_TIMEOUT }
    }
}

pub struct FragmentService {
    pub(crate) fragments: Arc<dyn FragmentRepository>,
    categories: Arc<dyn CategoryRepository>,
    followers: Arc<dyn FollowerDirectory>,
    moderation: ModerationGate,
    notifications: Arc<dyn NotificationSink>,
    metrics: Arc<Metrics>,
}

impl FragmentService {
    pub fn new(ports: Ports, settings: ServiceSettings, metrics: Arc<Metrics>) -> Self {
        Self {
            fragments: ports.fragments,
            categories: ports.categories,
            followers: ports.followers,
            moderation: ModerationGate::new(
                ports.classifier,
                settings.classifier_timeout,
                metrics.clone(),
            ),
            notifications: ports.notifications,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    // ── Fragments ──────────────────────────────────────────────────────────

    #[instrument(skip(self, request), fields(author = %actor.user_id))]
    pub async fn create_fragment(
        &self,
        actor: Actor,
        request: CreateFragmentRequest,
    ) -> Result<Fragment> {
        request.validate()?;
        self.ensure_category(request.category).await?;

        let text = Fragment::moderation_text(&request.title, &request.description, &request.content);
        let review = self.moderation.review(&text, ContentKind::Fragment).await;
        let transition = lifecycle::on_create(request.status, review.verdict);

        let now = Utc::now();
        let fragment = Fragment {
            id: FragmentId::new(),
            title: request.title,
            description: request.description,
            content: request.content,
            category: request.category,
            author: actor.user_id,
            tags: request.tags,
            status: transition.status,
            is_deleted: false,
            moderation: review.into(),
            upvotes: BTreeSet::new(),
            downvotes: BTreeSet::new(),
            view_count: 0,
            subscribers: BTreeSet::from([actor.user_id]),
            replies: Vec::new(),
            created_at: now,
            updated_at: now,
            published_at: (transition.status == ContentStatus::Published).then_some(now),
            version: 0,
        };

        let stored = self.fragments.insert_fragment(&fragment).await?;
        info!(
            fragment_id = %stored.id,
            status = %stored.status,
            verdict = stored.moderation.verdict.as_str(),
            "fragment created"
        );

        if let Some(kind) = transition.notify {
            self.announce(kind, &stored).await;
        }
        Ok(stored)
    }

    #[instrument(skip(self, request), fields(actor = %actor.user_id))]
    pub async fn update_fragment(
        &self,
        actor: Actor,
        id: FragmentId,
        request: UpdateFragmentRequest,
    ) -> Result<Fragment> {
        request.validate()?;
        let current = self.load_live(id).await?;
        ensure_author(&actor, &current)?;
        if let Some(category) = request.category {
            self.ensure_category(category).await?;
        }

        let mut next = current.clone();
        if let Some(title) = request.title {
            next.title = title;
        }
        if let Some(description) = request.description {
            next.description = description;
        }
        if let Some(content) = request.content {
            next.content = content;
        }
        if let Some(category) = request.category {
            next.category = category;
        }
        if let Some(tags) = request.tags {
            next.tags = tags;
        }

        let text_changed = next.title != current.title
            || next.description != current.description
            || next.content != current.content;

        let verdict = if text_changed {
            let text = Fragment::moderation_text(&next.title, &next.description, &next.content);
            let review = self.moderation.review(&text, ContentKind::Fragment).await;
            let verdict = review.verdict;
            next.moderation = review.into();
            Some(verdict)
        } else {
            None
        };

        let transition = lifecycle::on_edit(current.status, verdict);
        next.status = transition.status;
        next.updated_at = Utc::now();

        let saved = self.persist(&next, current.version).await?;
        if saved.status != current.status {
            info!(fragment_id = %id, from = %current.status, to = %saved.status, "fragment status changed by edit");
        }
        if let Some(kind) = transition.notify {
            self.announce(kind, &saved).await;
        }
        Ok(saved)
    }

    /// Tombstones the fragment. Irreversible through this API.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn delete_fragment(&self, actor: Actor, id: FragmentId) -> Result<Fragment> {
        let current = self.load_live(id).await?;
        if !actor.can_manage(current.author) {
            return Err(DomainError::Unauthorized(format!(
                "user {} may not delete fragment {id}",
                actor.user_id
            )));
        }

        let mut next = current.clone();
        next.status = lifecycle::on_delete().status;
        next.is_deleted = true;
        next.updated_at = Utc::now();

        let saved = self.persist(&next, current.version).await?;
        info!(fragment_id = %id, "fragment deleted");
        Ok(saved)
    }

    /// Author-requested move between `draft` and `published`.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn change_fragment_status(
        &self,
        actor: Actor,
        id: FragmentId,
        requested: ContentStatus,
    ) -> Result<Fragment> {
        let current = self.load_live(id).await?;
        ensure_author(&actor, &current)?;
        let transition =
            lifecycle::request_status_change(current.status, requested, &current.moderation)?;

        let mut next = current.clone();
        stamp_status(&mut next, transition.status);

        let saved = self.persist(&next, current.version).await?;
        info!(fragment_id = %id, from = %current.status, to = %saved.status, "fragment status changed");
        if let Some(kind) = transition.notify {
            self.announce(kind, &saved).await;
        }
        Ok(saved)
    }

    /// Admin override after human review of a flagged or blocked fragment.
    #[instrument(skip(self), fields(admin = %actor.user_id))]
    pub async fn review_fragment(
        &self,
        actor: Actor,
        id: FragmentId,
        decision: ContentStatus,
    ) -> Result<Fragment> {
        ensure_admin(&actor)?;
        let current = self.load_live(id).await?;
        let transition = lifecycle::on_admin_review(current.status, decision)?;

        let mut next = current.clone();
        stamp_status(&mut next, transition.status);
        next.moderation.reviewed_at = Some(next.updated_at);

        let saved = self.persist(&next, current.version).await?;
        info!(fragment_id = %id, decision = %decision, "fragment reviewed");
        if let Some(kind) = transition.notify {
            self.announce(kind, &saved).await;
        }
        Ok(saved)
    }

    /// Reader-facing fetch. The view is counted through the repository's
    /// own counter, so reads never take part in the version guard.
    #[instrument(skip(self, actor))]
    pub async fn view_fragment(&self, actor: Option<Actor>, id: FragmentId) -> Result<FragmentView> {
        let mut shown = self.fragments.load_fragment(id).await?;
        let visible = match &actor {
            Some(actor) => shown.is_visible_to(actor),
            None => shown.is_public(),
        };
        if !visible {
            return Err(DomainError::fragment_not_found(id));
        }

        shown.view_count = self.fragments.record_view(id).await?;
        debug!(fragment_id = %id, views = shown.view_count, "view recorded");

        let replies = reply_tree::visible_forest(&shown.replies, actor.as_ref());
        Ok(FragmentView::new(&shown, replies))
    }

    // ── Replies ────────────────────────────────────────────────────────────

    #[instrument(skip(self, request), fields(actor = %actor.user_id))]
    pub async fn add_or_edit_reply(
        &self,
        actor: Actor,
        fragment_id: FragmentId,
        request: ReplyRequest,
    ) -> Result<ReplyOutcome> {
        request.validate()?;
        let current = self.load_visible(fragment_id, &actor).await?;

        // Resolve the target before paying for a classifier call.
        match request.action {
            ReplyAction::Add { parent: Some(parent) } => {
                let (_, depth) = reply_tree::find_visible(&current.replies, parent, &actor)
                    .ok_or_else(|| DomainError::reply_not_found(parent))?;
                if depth + 1 > reply_tree::MAX_REPLY_DEPTH {
                    return Err(DomainError::DepthExceeded { max: reply_tree::MAX_REPLY_DEPTH });
                }
            }
            ReplyAction::Add { parent: None } => {}
            ReplyAction::Edit { reply_id } => {
                let author = reply_tree::find_author_of(&current.replies, reply_id)?;
                if !actor.can_manage(author) {
                    return Err(DomainError::Unauthorized(format!(
                        "user {} may not edit reply {reply_id}",
                        actor.user_id
                    )));
                }
            }
        }

        let review = self.moderation.review(&request.content, ContentKind::Reply).await;
        let verdict = review.verdict;
        let now = Utc::now();
        let mut next = current.clone();

        let (reply_id, depth, parent_author) = match request.action {
            ReplyAction::Add { parent } => {
                let reply = Reply::new(actor.user_id, request.content, review.into(), now);
                let outcome = reply_tree::insert(&mut next.replies, reply, parent)?;
                subscriptions::ensure_subscribed(&mut next, actor.user_id);
                (outcome.reply_id, outcome.depth, outcome.parent_author)
            }
            ReplyAction::Edit { reply_id } => {
                let reply = reply_tree::edit(&mut next.replies, reply_id, &request.content, now)?;
                reply.status = lifecycle::reply_status_after_edit(reply.status, verdict);
                reply.moderation = review.into();
                let (_, depth) = reply_tree::find(&next.replies, reply_id)
                    .ok_or_else(|| DomainError::reply_not_found(reply_id))?;
                (reply_id, depth, None)
            }
        };
        next.updated_at = now;

        let saved = self.persist(&next, current.version).await?;
        let (reply, _) = reply_tree::find(&saved.replies, reply_id)
            .ok_or_else(|| DomainError::Internal(format!("reply {reply_id} lost on save")))?;
        let reply = reply.clone();
        info!(
            fragment_id = %fragment_id,
            reply_id = %reply_id,
            depth,
            status = %reply.status,
            verdict = verdict.as_str(),
            "reply saved"
        );

        if matches!(request.action, ReplyAction::Add { .. })
            && reply.status == ContentStatus::Published
        {
            self.announce_reply(&saved, &reply, parent_author).await;
        }

        Ok(ReplyOutcome { reply, depth, fragment_version: saved.version })
    }

    /// Tombstones a reply and its descendants. Returns how many nodes fell.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn delete_reply(
        &self,
        actor: Actor,
        fragment_id: FragmentId,
        reply_id: ReplyId,
    ) -> Result<usize> {
        let current = self.load_visible(fragment_id, &actor).await?;
        let mut next = current.clone();
        let removed =
            reply_tree::soft_delete_subtree(&mut next.replies, reply_id, actor.user_id, actor.is_admin)?;
        next.updated_at = Utc::now();

        self.persist(&next, current.version).await?;
        info!(fragment_id = %fragment_id, reply_id = %reply_id, removed, "reply subtree deleted");
        Ok(removed)
    }

    /// Admin status toggle on a single reply. Children are not touched.
    #[instrument(skip(self), fields(admin = %actor.user_id))]
    pub async fn set_reply_status(
        &self,
        actor: Actor,
        fragment_id: FragmentId,
        reply_id: ReplyId,
        status: ContentStatus,
    ) -> Result<Reply> {
        ensure_admin(&actor)?;
        let current = self.load_live(fragment_id).await?;
        let mut next = current.clone();
        let now = Utc::now();

        reply_tree::set_status(&mut next.replies, reply_id, status)?;
        if let Some((reply, _)) = reply_tree::find_mut(&mut next.replies, reply_id) {
            reply.moderation.reviewed_at = Some(now);
        }
        next.updated_at = now;

        let saved = self.persist(&next, current.version).await?;
        info!(fragment_id = %fragment_id, reply_id = %reply_id, status = %status, "reply status set");
        reply_tree::find(&saved.replies, reply_id)
            .map(|(reply, _)| reply.clone())
            .ok_or_else(|| DomainError::reply_not_found(reply_id))
    }

    // ── Votes ──────────────────────────────────────────────────────────────

    #[instrument(skip(self), fields(voter = %actor.user_id))]
    pub async fn vote(
        &self,
        actor: Actor,
        fragment_id: FragmentId,
        request: VoteRequest,
    ) -> Result<VoteOutcome> {
        let current = self.load_visible(fragment_id, &actor).await?;
        let mut next = current.clone();
        let fragment_public = next.is_public();

        let (outcome, reply_preview) = match request.reply_id {
            Some(reply_id) => {
                if reply_tree::find_visible(&next.replies, reply_id, &actor).is_none() {
                    return Err(DomainError::reply_not_found(reply_id));
                }
                let (reply, _) = reply_tree::find_mut(&mut next.replies, reply_id)
                    .ok_or_else(|| DomainError::reply_not_found(reply_id))?;
                let outcome = vote_ledger::apply_vote(reply, actor.user_id, request.action)?;
                let shown = reply.status == ContentStatus::Published;
                (outcome, Some((reply_id, reply.content.clone(), shown)))
            }
            None => (vote_ledger::apply_vote(&mut next, actor.user_id, request.action)?, None),
        };
        subscriptions::ensure_subscribed(&mut next, actor.user_id);

        let saved = self.persist(&next, current.version).await?;
        debug!(fragment_id = %fragment_id, action = %request.action, up = outcome.up, down = outcome.down, "vote applied");

        let Some(recipient) = outcome.notify_author else {
            return Ok(outcome);
        };
        let Some(kind) = NotificationKind::for_vote(request.action, reply_preview.is_some()) else {
            return Ok(outcome);
        };
        match reply_preview {
            Some((reply_id, content, true)) if fragment_public => {
                let context =
                    NotificationContext::for_reply(saved.id, reply_id, actor.user_id, &content);
                self.notify(kind, BTreeSet::from([recipient]), context).await;
            }
            None if fragment_public => {
                let context = NotificationContext::for_fragment(saved.id, actor.user_id, &saved.title);
                self.notify(kind, BTreeSet::from([recipient]), context).await;
            }
            _ => {}
        }
        Ok(outcome)
    }

    // ── Helpers ────────────────────────────────────────────────────────────

    /// Loads a fragment that has not been tombstoned.
    pub(crate) async fn load_live(&self, id: FragmentId) -> Result<Fragment> {
        let fragment = self.fragments.load_fragment(id).await?;
        if fragment.is_deleted {
            return Err(DomainError::fragment_not_found(id));
        }
        Ok(fragment)
    }

    /// Loads a fragment `actor` is allowed to see. Hidden fragments look
    /// exactly like missing ones.
    async fn load_visible(&self, id: FragmentId, actor: &Actor) -> Result<Fragment> {
        let fragment = self.load_live(id).await?;
        if !fragment.is_visible_to(actor) {
            return Err(DomainError::fragment_not_found(id));
        }
        Ok(fragment)
    }

    async fn ensure_category(&self, id: CategoryId) -> Result<()> {
        if self.categories.category_exists(id).await? {
            Ok(())
        } else {
            Err(DomainError::category_not_found(id))
        }
    }

    async fn persist(&self, fragment: &Fragment, expected_version: u64) -> Result<Fragment> {
        match self.fragments.save_fragment(fragment, expected_version).await {
            Err(err) if err.is_version_conflict() => {
                self.metrics.record_version_conflict();
                warn!(fragment_id = %fragment.id, expected_version, "concurrent modification detected");
                Err(err)
            }
            other => other,
        }
    }

    /// Fragment-level fan-out: followers for new publications, subscribers
    /// for updates.
    async fn announce(&self, kind: NotificationKind, fragment: &Fragment) {
        let recipients = match kind {
            NotificationKind::NewFragment => match self.followers.followers_of(fragment.author).await {
                Ok(followers) => followers,
                Err(err) => {
                    warn!(fragment_id = %fragment.id, error = %err, "could not resolve followers");
                    self.metrics.record_dropped_notification();
                    return;
                }
            },
            _ => subscriptions::recipients_excluding(fragment, fragment.author),
        };
        let recipients = recipients.into_iter().filter(|u| *u != fragment.author).collect();
        let context = NotificationContext::for_fragment(fragment.id, fragment.author, &fragment.title);
        self.notify(kind, recipients, context).await;
    }

    /// `NewReply` goes to the fragment author, `ReplyToReply` to the author
    /// of the reply answered. Nobody is told about their own reply.
    async fn announce_reply(&self, fragment: &Fragment, reply: &Reply, parent_author: Option<UserId>) {
        if !fragment.is_public() {
            return;
        }
        let context =
            NotificationContext::for_reply(fragment.id, reply.id, reply.author, &reply.content);

        if let Some(parent_author) = parent_author.filter(|a| *a != reply.author) {
            self.notify(NotificationKind::ReplyToReply, BTreeSet::from([parent_author]), context.clone())
                .await;
        }
        if fragment.author != reply.author && parent_author != Some(fragment.author) {
            self.notify(NotificationKind::NewReply, BTreeSet::from([fragment.author]), context).await;
        }
    }

    async fn notify(
        &self,
        kind: NotificationKind,
        recipients: BTreeSet<UserId>,
        context: NotificationContext,
    ) {
        if recipients.is_empty() {
            return;
        }
        let notification = Notification::new(kind, recipients, context);
        if let Err(err) = self.notifications.dispatch(notification).await {
            warn!(?kind, error = %err, "notification dispatch failed, mutation already saved");
            self.metrics.record_dropped_notification();
        }
    }
}

fn stamp_status(fragment: &mut Fragment, status: ContentStatus) {
    let now = Utc::now();
    if status == ContentStatus::Published && fragment.status != ContentStatus::Published {
        fragment.published_at = Some(now);
    }
    fragment.status = status;
    fragment.updated_at = now;
}

fn ensure_author(actor: &Actor, fragment: &Fragment) -> Result<()> {
    if actor.user_id != fragment.author {
        return Err(DomainError::Unauthorized(format!(
            "user {} is not the author of fragment {}",
            actor.user_id, fragment.id
        )));
    }
    Ok(())
}

pub(crate) fn ensure_admin(actor: &Actor) -> Result<()> {
    if !actor.is_admin {
        return Err(DomainError::Unauthorized(format!("user {} is not an admin", actor.user_id)));
    }
    Ok(())
}
