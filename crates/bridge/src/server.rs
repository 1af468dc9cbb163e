//! HTTP server: shared state and the router.

use anyhow::{Context, Result};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;

use crate::config::Config;
use crate::frontend::{self, middleware::remember_jira_context, render_errors};
use crate::github::{GitHubApp, OAuthClient};
use crate::jira::{lifecycle, JiraClient};
use crate::metrics::{track_request, Statsd};
use crate::session::{load_session, SessionCodec};
use crate::store::Store;
use crate::sync::SyncQueue;
use crate::templates::Templates;
use crate::webhooks::github_webhook_handler;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Configuration.
    pub config: Arc<Config>,
    /// Jira sites and connections.
    pub store: Store,
    /// Metrics client.
    pub statsd: Statsd,
    /// Page templates.
    pub templates: Templates,
    /// Session cookie signing.
    pub sessions: SessionCodec,
    /// GitHub App credentials.
    pub github: GitHubApp,
    /// GitHub OAuth app.
    pub oauth: OAuthClient,
    /// HTTP client shared by the Jira and GitHub clients.
    pub http: reqwest::Client,
    /// Backfill queue.
    pub sync: SyncQueue,
}

impl AppState {
    /// Build state from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if GitHub credentials are missing or invalid.
    pub fn new(config: Config, statsd: Statsd, store: Store, sync: SyncQueue) -> Result<Self> {
        let app_id = config.github_app_id.context("GITHUB_APP_ID is not set")?;
        let private_key = config
            .github_private_key
            .as_deref()
            .context("GITHUB_PRIVATE_KEY is not set")?;
        let client_id = config
            .github_client_id
            .as_deref()
            .context("GITHUB_CLIENT_ID is not set")?;
        let client_secret = config
            .github_client_secret
            .as_deref()
            .context("GITHUB_CLIENT_SECRET is not set")?;

        let http = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        let github = GitHubApp::new(http.clone(), app_id, private_key, &config.github_api_url)?;
        let oauth = OAuthClient::new(
            client_id,
            client_secret,
            &config.github_url,
            &config.oauth_callback_url(),
        )?;
        let sessions = SessionCodec::new(client_secret.as_bytes())?;

        Ok(Self {
            config: Arc::new(config),
            store,
            statsd,
            templates: Templates::new()?,
            sessions,
            github,
            oauth,
            http,
            sync,
        })
    }

    /// Client for an installed Jira site.
    pub async fn jira_client(&self, jira_host: &str) -> Option<JiraClient> {
        let installation = self.store.jira_installation(jira_host).await?;
        Some(JiraClient::new(
            self.http.clone(),
            &installation,
            &self.config.app_key,
        ))
    }
}

/// Build the HTTP router.
///
/// Middleware runs outermost first: tracing, session, Jira context capture,
/// error rendering, request metrics.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(frontend::router(&state))
        .route("/github/events", post(github_webhook_handler))
        .route("/jira/events/installed", post(lifecycle::installed))
        .route("/jira/events/uninstalled", post(lifecycle::uninstalled))
        .route("/health", get(health_handler))
        .nest_service("/public", ServeDir::new(&state.config.static_dir))
        .layer(from_fn_with_state(state.statsd.clone(), track_request))
        .layer(from_fn_with_state(state.clone(), render_errors))
        .layer(from_fn(remember_jira_context))
        .layer(from_fn_with_state(state.sessions.clone(), load_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
///
/// # Errors
///
/// Returns an error if the server fails to bind or stops unexpectedly.
pub async fn run_server(state: AppState) -> Result<()> {
    let addr = format!("0.0.0.0:{}", state.config.port);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Jira bridge listening on {addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
