//! # Settings
//!
//! Layered configuration: built-in defaults, then an optional TOML file,
//! then `FRAGMENTS__SECTION__KEY` environment variables. A `.env` file in
//! the working directory is loaded into the environment first.
//!
//! ```text
//! FRAGMENTS__LOG__FILTER=debug
//! FRAGMENTS__MODERATION__TIMEOUT_MS=2500
//! FRAGMENTS__DATABASE__URL=postgres://...
//! FRAGMENTS__NOTIFICATIONS__SINK=outbox
//! ```

use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "FRAGMENTS";
pub const DEFAULT_CONFIG_FILE: &str = "config/default";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info,services=debug`
    pub filter: String,
    /// One JSON object per line instead of the human format
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerationSettings {
    /// Budget for one classifier call before falling back to human review
    pub timeout_ms: u64,
    /// Chat-completions endpoint for the remote classifier
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub model: String,
    /// Used by the local keyword classifier
    pub blocked_terms: Vec<String>,
    pub review_terms: Vec<String>,
}

impl ModerationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The remote classifier is used only when both endpoint and key are set.
    pub fn remote(&self) -> Option<(&str, &SecretString)> {
        self.endpoint.as_deref().zip(self.api_key.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MutationSettings {
    /// Attempts per write when a version conflict comes back
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Unset means the in-memory store
    pub url: Option<SecretString>,
    pub max_connections: u32,
}

/// Where dispatched notifications go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// One log line per notification, nothing kept
    Log,
    /// Bounded in-memory inboxes the driver can read back
    Outbox,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    pub sink: SinkKind,
    /// Notifications kept per recipient by the outbox
    pub inbox_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub log: LogSettings,
    pub moderation: ModerationSettings,
    pub mutation: MutationSettings,
    pub database: DatabaseSettings,
    pub notifications: NotificationSettings,
}

impl Settings {
    /// Loads `.env`, then the default file, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load_from(Some(DEFAULT_CONFIG_FILE))
    }

    /// Same as `load` without touching `.env`. `file` is optional on disk.
    pub fn load_from(file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Self::defaults()?;
        if let Some(file) = file {
            builder = builder.add_source(File::with_name(file).required(false));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("moderation.blocked_terms")
                    .with_list_parse_key("moderation.review_terms")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        debug!(
            json_logs = settings.log.json,
            classifier_timeout_ms = settings.moderation.timeout_ms,
            remote_classifier = settings.moderation.remote().is_some(),
            "configuration loaded"
        );
        Ok(settings)
    }

    /// Parses settings from an inline TOML document layered over the defaults.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Self::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("log.filter", "info")?
            .set_default("log.json", false)?
            .set_default("moderation.timeout_ms", 5_000)?
            .set_default("moderation.model", "gpt-4o-mini")?
            .set_default("moderation.blocked_terms", Vec::<String>::new())?
            .set_default("moderation.review_terms", Vec::<String>::new())?
            .set_default("mutation.max_attempts", 3)?
            .set_default("database.max_connections", 5)?
            .set_default("notifications.sink", "log")?
            .set_default("notifications.inbox_capacity", 100)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.moderation.timeout_ms == 0 {
            return Err(ConfigError::Invalid("moderation.timeout_ms must be positive".into()));
        }
        if self.mutation.max_attempts == 0 {
            return Err(ConfigError::Invalid("mutation.max_attempts must be at least 1".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be at least 1".into()));
        }
        if self.notifications.inbox_capacity == 0 {
            return Err(ConfigError::Invalid("notifications.inbox_capacity must be at least 1".into()));
        }
        Ok(())
    }
}
