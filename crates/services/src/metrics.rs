//! Prometheus counters for the moderation pipeline and the write path.

use domains::{ContentKind, Verdict};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct VerdictLabels {
    pub kind: String,
    pub verdict: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct KindLabels {
    pub kind: String,
}

#[derive(Debug, Default)]
pub struct Metrics {
    verdicts: Family<VerdictLabels, Counter>,
    classifier_fallbacks: Family<KindLabels, Counter>,
    version_conflicts: Counter,
    dropped_notifications: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every counter under `registry`. Counters are shared, so the
    /// registry sees increments made through `self`.
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "moderation_verdicts",
            "Verdicts applied to fragments and replies",
            self.verdicts.clone(),
        );
        registry.register(
            "moderation_classifier_fallbacks",
            "Classifier calls that failed or timed out and fell back to needs_review",
            self.classifier_fallbacks.clone(),
        );
        registry.register(
            "fragment_version_conflicts",
            "Aggregate saves rejected by the version guard",
            self.version_conflicts.clone(),
        );
        registry.register(
            "notifications_dropped",
            "Notifications the sink refused",
            self.dropped_notifications.clone(),
        );
    }

    pub fn record_verdict(&self, kind: ContentKind, verdict: Verdict) {
        self.verdicts
            .get_or_create(&VerdictLabels {
                kind: kind.as_str().to_string(),
                verdict: verdict.as_str().to_string(),
            })
            .inc();
    }

    pub fn record_fallback(&self, kind: ContentKind) {
        self.classifier_fallbacks
            .get_or_create(&KindLabels { kind: kind.as_str().to_string() })
            .inc();
    }

    pub fn record_version_conflict(&self) {
        self.version_conflicts.inc();
    }

    pub fn record_dropped_notification(&self) {
        self.dropped_notifications.inc();
    }

    pub fn fallbacks(&self, kind: ContentKind) -> u64 {
        self.classifier_fallbacks
            .get_or_create(&KindLabels { kind: kind.as_str().to_string() })
            .get()
    }

    pub fn version_conflicts(&self) -> u64 {
        self.version_conflicts.get()
    }

    pub fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications.get()
    }
}
