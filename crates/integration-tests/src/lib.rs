//! Shared fixtures for the integration suites.
//!
//! `Harness` wires a `FragmentService` to the in-memory adapters and keeps
//! handles on them so tests can seed categories and follows and read the
//! notification outbox back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domains::{
    Actor, CategoryId, ContentKind, ContentStatus, DomainError, Fragment, ModerationClassifier,
    ModerationResult, Notification, NotificationKind, NotificationSink, ReplyId, Result, UserId,
};
use moderation_adapters::KeywordClassifier;
use services::{
    CreateFragmentRequest, FragmentService, Metrics, Ports, ReplyAction, ReplyOutcome,
    ReplyRequest, ServiceSettings,
};
use storage_adapters::{
    InMemoryCategoryRepository, InMemoryFollowerDirectory, InMemoryFragmentRepository,
    NotificationOutbox,
};

/// Terms the default harness classifier treats as abusive / doubtful.
pub const BLOCKED_TERM: &str = "scam";
pub const REVIEW_TERM: &str = "miracle cure";

pub struct Harness {
    pub service: FragmentService,
    pub fragments: Arc<InMemoryFragmentRepository>,
    pub followers: Arc<InMemoryFollowerDirectory>,
    pub outbox: Arc<NotificationOutbox>,
    pub metrics: Arc<Metrics>,
    pub category: CategoryId,
}

pub struct HarnessBuilder {
    classifier: Arc<dyn ModerationClassifier>,
    notifications: Option<Arc<dyn NotificationSink>>,
    timeout: Duration,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            classifier: Arc::new(KeywordClassifier::new([BLOCKED_TERM]).with_review_terms([REVIEW_TERM])),
            notifications: None,
            timeout: Duration::from_secs(1),
        }
    }
}

impl HarnessBuilder {
    pub fn classifier(mut self, classifier: impl ModerationClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Replaces the outbox as the notification sink.
    pub fn notifications(mut self, sink: impl NotificationSink + 'static) -> Self {
        self.notifications = Some(Arc::new(sink));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Harness {
        let category = CategoryId::new();
        let fragments = Arc::new(InMemoryFragmentRepository::new());
        let followers = Arc::new(InMemoryFollowerDirectory::new());
        let outbox = Arc::new(NotificationOutbox::new());
        let metrics = Arc::new(Metrics::new());

        let notifications: Arc<dyn NotificationSink> = match self.notifications {
            Some(sink) => sink,
            None => outbox.clone(),
        };
        let ports = Ports {
            fragments: fragments.clone(),
            categories: Arc::new(InMemoryCategoryRepository::with_categories([category])),
            followers: followers.clone(),
            classifier: self.classifier,
            notifications,
        };
        let service = FragmentService::new(
            ports,
            ServiceSettings { classifier_timeout: self.timeout },
            metrics.clone(),
        );

        Harness { service, fragments, followers, outbox, metrics, category }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn request(&self, content: &str, status: ContentStatus) -> CreateFragmentRequest {
        CreateFragmentRequest {
            title: "Understanding lifetimes".to_string(),
            description: "Where 'a comes from".to_string(),
            content: content.to_string(),
            category: self.category,
            tags: vec!["rust".to_string()],
            status,
        }
    }

    /// Creates an approved, published fragment by `author`.
    pub async fn published_by(&self, author: UserId) -> Fragment {
        self.service
            .create_fragment(Actor::user(author), self.request("Lifetimes name regions.", ContentStatus::Published))
            .await
            .expect("clean content publishes")
    }

    pub async fn reply(
        &self,
        actor: UserId,
        fragment: &Fragment,
        parent: Option<ReplyId>,
        content: &str,
    ) -> Result<ReplyOutcome> {
        let request = ReplyRequest { content: content.to_string(), action: ReplyAction::Add { parent } };
        self.service.add_or_edit_reply(Actor::user(actor), fragment.id, request).await
    }

    pub fn sent(&self, kind: NotificationKind) -> Vec<Notification> {
        self.outbox.all().into_iter().filter(|n| n.kind == kind).collect()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Answers with `result`, but only after `delay`.
pub struct DelayedClassifier {
    pub delay: Duration,
    pub result: ModerationResult,
}

#[async_trait]
impl ModerationClassifier for DelayedClassifier {
    async fn review(&self, _text: &str, _kind: ContentKind) -> Result<ModerationResult> {
        tokio::time::sleep(self.delay).await;
        Ok(self.result.clone())
    }
}

/// Always answers with the same verdict.
pub struct FixedClassifier(pub ModerationResult);

#[async_trait]
impl ModerationClassifier for FixedClassifier {
    async fn review(&self, _text: &str, _kind: ContentKind) -> Result<ModerationResult> {
        Ok(self.0.clone())
    }
}

/// A notification dispatcher that is always down.
pub struct BrokenSink;

#[async_trait]
impl NotificationSink for BrokenSink {
    async fn dispatch(&self, _notification: Notification) -> Result<()> {
        Err(DomainError::Internal("dispatcher unreachable".to_string()))
    }
}
