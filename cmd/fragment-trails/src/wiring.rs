//! Composition root: picks an adapter for every port from the settings and
//! the compiled features.

use std::sync::Arc;
#[cfg(feature = "moderation-http")]
use std::time::Duration;

use configs::{Settings, SinkKind};
use domains::{
    CategoryRepository, FollowerDirectory, FragmentRepository, ModerationClassifier, NotificationSink,
};
use moderation_adapters::KeywordClassifier;
use services::{FragmentService, Metrics, Ports, ServiceSettings};
use storage_adapters::{
    InMemoryCategoryRepository, InMemoryFollowerDirectory, InMemoryFragmentRepository,
    LogNotificationSink, NotificationOutbox,
};
use tracing::info;

/// Handles the driver keeps besides the service itself.
pub struct App {
    pub service: FragmentService,
    /// Present when notifications are kept for reading back.
    pub outbox: Option<Arc<NotificationOutbox>>,
    /// Present when categories live in memory and can be seeded.
    pub categories: Option<Arc<InMemoryCategoryRepository>>,
    /// Present when follows live in memory and can be seeded.
    pub followers: Option<Arc<InMemoryFollowerDirectory>>,
    pub max_attempts: u32,
}

struct Stores {
    fragments: Arc<dyn FragmentRepository>,
    categories: Arc<dyn CategoryRepository>,
    followers: Arc<dyn FollowerDirectory>,
    memory_categories: Option<Arc<InMemoryCategoryRepository>>,
    memory_followers: Option<Arc<InMemoryFollowerDirectory>>,
}

fn memory_stores() -> Stores {
    let categories = Arc::new(InMemoryCategoryRepository::new());
    let followers = Arc::new(InMemoryFollowerDirectory::new());
    Stores {
        fragments: Arc::new(InMemoryFragmentRepository::new()),
        categories: categories.clone(),
        followers: followers.clone(),
        memory_categories: Some(categories),
        memory_followers: Some(followers),
    }
}

#[cfg(feature = "db-postgres")]
async fn stores(settings: &Settings) -> anyhow::Result<Stores> {
    use secrecy::ExposeSecret;
    use storage_adapters::postgres::connect;
    use storage_adapters::{PgCategoryRepository, PgFollowerDirectory, PgFragmentRepository};

    let Some(url) = &settings.database.url else {
        info!("no database url configured, using the in-memory store");
        return Ok(memory_stores());
    };
    let pool = connect(url.expose_secret(), settings.database.max_connections).await?;
    info!("using the postgres store");
    Ok(Stores {
        fragments: Arc::new(PgFragmentRepository::new(pool.clone())),
        categories: Arc::new(PgCategoryRepository::new(pool.clone())),
        followers: Arc::new(PgFollowerDirectory::new(pool)),
        memory_categories: None,
        memory_followers: None,
    })
}

#[cfg(not(feature = "db-postgres"))]
async fn stores(settings: &Settings) -> anyhow::Result<Stores> {
    if settings.database.url.is_some() {
        tracing::warn!("database url ignored: built without the db-postgres feature");
    }
    Ok(memory_stores())
}

fn keyword_classifier(settings: &Settings) -> Arc<dyn ModerationClassifier> {
    let moderation = &settings.moderation;
    Arc::new(
        KeywordClassifier::new(&moderation.blocked_terms)
            .with_review_terms(&moderation.review_terms),
    )
}

#[cfg(feature = "moderation-http")]
fn classifier(settings: &Settings) -> anyhow::Result<Arc<dyn ModerationClassifier>> {
    use moderation_adapters::{HttpClassifierConfig, HttpModerationClassifier};

    let Some((endpoint, api_key)) = settings.moderation.remote() else {
        info!("remote classifier not configured, using keyword classifier");
        return Ok(keyword_classifier(settings));
    };
    let classifier = HttpModerationClassifier::new(HttpClassifierConfig {
        endpoint: endpoint.to_string(),
        api_key: api_key.clone(),
        model: settings.moderation.model.clone(),
        connect_timeout: Duration::from_secs(2),
    })?;
    info!(endpoint, model = %settings.moderation.model, "using remote classifier");
    Ok(Arc::new(classifier))
}

#[cfg(not(feature = "moderation-http"))]
fn classifier(settings: &Settings) -> anyhow::Result<Arc<dyn ModerationClassifier>> {
    Ok(keyword_classifier(settings))
}

fn notification_sink(settings: &Settings) -> (Arc<dyn NotificationSink>, Option<Arc<NotificationOutbox>>) {
    match settings.notifications.sink {
        SinkKind::Log => {
            info!("notifications go to the log");
            (Arc::new(LogNotificationSink), None)
        }
        SinkKind::Outbox => {
            let capacity = settings.notifications.inbox_capacity;
            info!(inbox_capacity = capacity, "notifications kept in the outbox");
            let outbox = Arc::new(NotificationOutbox::with_capacity(capacity));
            (outbox.clone(), Some(outbox))
        }
    }
}

pub async fn build(settings: &Settings, metrics: Arc<Metrics>) -> anyhow::Result<App> {
    let stores = stores(settings).await?;
    let (notifications, outbox) = notification_sink(settings);
    let ports = Ports {
        fragments: stores.fragments,
        categories: stores.categories,
        followers: stores.followers,
        classifier: classifier(settings)?,
        notifications,
    };
    let service_settings = ServiceSettings { classifier_timeout: settings.moderation.timeout() };

    Ok(App {
        service: FragmentService::new(ports, service_settings, metrics),
        outbox,
        categories: stores.memory_categories,
        followers: stores.memory_followers,
        max_attempts: settings.mutation.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_sink_is_the_default() {
        let settings = Settings::from_toml("").unwrap();
        let app = build(&settings, Arc::new(Metrics::new())).await.unwrap();
        assert!(app.outbox.is_none());
        assert!(app.categories.is_some());
    }

    #[tokio::test]
    async fn outbox_sink_uses_the_configured_capacity() {
        let settings =
            Settings::from_toml("[notifications]\nsink = \"outbox\"\ninbox_capacity = 7").unwrap();
        let app = tokio_test::assert_ok!(build(&settings, Arc::new(Metrics::new())).await);
        let outbox = app.outbox.unwrap();
        assert_eq!(outbox.capacity(), 7);
        assert!(outbox.is_empty());
    }
}
