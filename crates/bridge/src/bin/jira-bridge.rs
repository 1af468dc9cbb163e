//! Jira bridge service binary.
//!
//! Serves the GitHub webhook endpoint, Jira lifecycle callbacks and the
//! configuration pages.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jira_bridge::{
    server::{self, AppState},
    sync::{spawn_worker, SyncQueue},
    Config, Statsd, Store,
};

#[tokio::main]
async fn main() -> Result<()> {
    // LOG_FORMAT=json switches to structured output for log shipping
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");
    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .with(EnvFilter::from_default_env().add_directive("jira_bridge=info".parse()?))
        .init();

    info!("Starting Jira bridge...");

    let config = Config::default();
    config.validate()?;
    info!(
        environment = %config.environment,
        port = config.port,
        app_url = %config.app_url,
        "Configuration loaded"
    );

    let statsd = Statsd::from_config(&config.statsd);
    let (queue, jobs) = SyncQueue::new();
    let state = AppState::new(config, statsd, Store::new(), queue)?;

    let worker = spawn_worker(state.clone(), jobs);
    let result = server::run_server(state).await;
    worker.abort();

    result
}
