//! # fragment-trails
//!
//! Runs the fragment core behind a JSON-lines protocol on stdin/stdout.
//! Logs go to stderr so they never mix with responses.

mod driver;
mod wiring;

use std::sync::Arc;

use configs::{LogSettings, Settings};
use prometheus_client::registry::Registry;
use services::Metrics;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

fn init_tracing(log: &LogSettings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log.filter))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if log.json {
        builder.json().try_init().map_err(|e| anyhow::anyhow!(e))?;
    } else {
        builder.try_init().map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings.log)?;

    let metrics = Arc::new(Metrics::new());
    let mut registry = Registry::default();
    metrics.register(&mut registry);

    let app = wiring::build(&settings, metrics).await?;
    tracing::info!(max_attempts = app.max_attempts, "fragment-trails ready, reading commands from stdin");

    let driver = driver::Driver::new(app, registry);
    driver.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}
