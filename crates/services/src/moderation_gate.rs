//! # Moderation Gate
//!
//! Wraps the classifier port with a time budget and a fail-closed fallback:
//! if no verdict arrives, the content is routed to human review. The gate
//! never reports `approved` for a call that did not succeed.

use std::sync::Arc;
use std::time::Duration;

use domains::{ContentKind, ModerationClassifier, ModerationResult};
use tracing::{debug, warn};

use crate::metrics::Metrics;

pub const DEFAULT_CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ModerationGate {
    classifier: Arc<dyn ModerationClassifier>,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

impl ModerationGate {
    pub fn new(
        classifier: Arc<dyn ModerationClassifier>,
        timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { classifier, timeout, metrics }
    }

    pub async fn review(&self, text: &str, kind: ContentKind) -> ModerationResult {
        let result = match tokio::time::timeout(self.timeout, self.classifier.review(text, kind)).await
        {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                warn!(kind = kind.as_str(), error = %err, "classifier failed, routing to human review");
                self.metrics.record_fallback(kind);
                ModerationResult::unavailable(err.to_string())
            }
            Err(_) => {
                warn!(
                    kind = kind.as_str(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "classifier timed out, routing to human review"
                );
                self.metrics.record_fallback(kind);
                ModerationResult::unavailable(format!(
                    "no verdict within {}ms",
                    self.timeout.as_millis()
                ))
            }
        };

        debug!(kind = kind.as_str(), verdict = result.verdict.as_str(), "moderation verdict");
        self.metrics.record_verdict(kind, result.verdict);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domains::{DomainError, MockModerationClassifier, Result, Verdict};

    /// Answers `approved`, but only after `delay`.
    struct SlowClassifier {
        delay: Duration,
    }

    #[async_trait]
    impl ModerationClassifier for SlowClassifier {
        async fn review(&self, _text: &str, _kind: ContentKind) -> Result<ModerationResult> {
            tokio::time::sleep(self.delay).await;
            Ok(ModerationResult::approved())
        }
    }

    #[tokio::test]
    async fn passes_classifier_verdict_through() {
        let mut classifier = MockModerationClassifier::new();
        classifier
            .expect_review()
            .withf(|_, kind| *kind == ContentKind::Reply)
            .times(1)
            .returning(|_, _| Ok(ModerationResult::approved()));
        let gate = ModerationGate::new(Arc::new(classifier), Duration::from_secs(1), Arc::default());

        assert_eq!(gate.review("hello", ContentKind::Reply).await.verdict, Verdict::Approved);
    }

    #[tokio::test]
    async fn classifier_error_fails_closed() {
        let mut classifier = MockModerationClassifier::new();
        classifier
            .expect_review()
            .returning(|_, _| Err(DomainError::ClassifierUnavailable("503".into())));
        let metrics = Arc::new(Metrics::new());
        let gate = ModerationGate::new(Arc::new(classifier), Duration::from_secs(1), metrics.clone());

        let result = gate.review("text", ContentKind::Fragment).await;
        assert_eq!(result.verdict, Verdict::NeedsReview);
        assert!(result.is_fallback());
        assert_eq!(metrics.fallbacks(ContentKind::Fragment), 1);
    }

    #[tokio::test]
    async fn timeout_fails_closed() {
        let slow = SlowClassifier { delay: Duration::from_secs(10) };
        let metrics = Arc::new(Metrics::new());
        let gate = ModerationGate::new(Arc::new(slow), Duration::from_millis(20), metrics.clone());

        let result = gate.review("text", ContentKind::Reply).await;
        assert_eq!(result.verdict, Verdict::NeedsReview);
        assert_eq!(metrics.fallbacks(ContentKind::Reply), 1);
    }
}
