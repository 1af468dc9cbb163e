//! Configuration web app.
//!
//! Pages used from GitHub (connecting installations to Jira sites) and from
//! inside Jira (connection status, retry and disconnect). Guards are
//! attached per route; session, Jira context capture, metrics and error
//! rendering are applied to the whole router in [`crate::server`].

pub mod extract;
mod github_configuration;
mod github_setup;
mod installations;
mod jira_configuration;
pub mod middleware;
mod oauth;
mod subscriptions;

use axum::{
    extract::{Request, State},
    middleware::{from_fn, from_fn_with_state, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Router,
};
use devinfo::User;
use serde_json::json;
use tracing::{error, warn};

use crate::error::{AppError, ErrorReport};
use crate::github::{GitHubClient, InstallationInfo};
use crate::server::AppState;
use crate::session::Session;
use middleware::{check_github_auth, verify_jira};

/// Title of every page.
pub const PAGE_TITLE: &str = "GitHub + Jira integration";

/// Routes of the configuration app.
pub fn router(state: &AppState) -> Router<AppState> {
    let csrf = from_fn_with_state(state.config.environment, crate::csrf::csrf_protection);
    let github_auth = from_fn(check_github_auth);
    let jira_auth = from_fn_with_state(state.clone(), verify_jira);

    Router::new()
        .route("/github/login", get(oauth::login))
        .route("/github/callback", get(oauth::callback))
        .route(
            "/github/setup",
            get(github_setup::get_setup)
                .route_layer(github_auth.clone())
                .route_layer(csrf.clone()),
        )
        .route(
            "/github/setup",
            post(github_setup::post_setup).route_layer(csrf.clone()),
        )
        .route(
            "/github/configuration",
            get(github_configuration::get_configuration)
                .route_layer(github_auth.clone())
                .route_layer(csrf.clone()),
        )
        .route(
            "/github/configuration",
            post(github_configuration::post_configuration).route_layer(csrf.clone()),
        )
        .route(
            "/github/installations",
            get(installations::list_installations)
                .route_layer(github_auth)
                .route_layer(csrf.clone()),
        )
        .route(
            "/github/subscriptions/{installation_id}",
            get(subscriptions::get_subscriptions).route_layer(csrf.clone()),
        )
        .route(
            "/github/subscription",
            post(subscriptions::delete_subscription).route_layer(csrf.clone()),
        )
        .route(
            "/jira/configuration",
            get(jira_configuration::get_configuration)
                .route_layer(jira_auth.clone())
                .route_layer(csrf),
        )
        .route(
            "/jira/configuration",
            delete(jira_configuration::delete_configuration).route_layer(jira_auth.clone()),
        )
        .route(
            "/jira/sync",
            post(jira_configuration::retry_sync).route_layer(jira_auth),
        )
        .route("/", get(app_home))
}

/// `GET /`: the GitHub App's public page.
async fn app_home(State(state): State<AppState>) -> Result<Redirect, AppError> {
    let app = state.github.app_client()?.get_app().await?;
    Ok(Redirect::to(app.public_url()))
}

/// Log frontend errors and, in production, replace them with the error page.
///
/// Only the well-known error names keep their status on the rendered page;
/// everything else is shown as a bad request.
pub async fn render_errors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let jira_host = request
        .extensions()
        .get::<Session>()
        .and_then(Session::jira_host);

    let response = next.run(request).await;
    let Some(report) = response.extensions().get::<ErrorReport>().cloned() else {
        return response;
    };

    error!(
        jira_host = jira_host.as_deref().unwrap_or_default(),
        error = %report.message,
        status = response.status().as_u16(),
        "Error in frontend app."
    );

    if !state.config.environment.is_production() {
        return response;
    }

    let status = report.rendered_status;
    state
        .statsd
        .increment("github_error_rendered", &[format!("status:{}", status.as_u16())]);

    match state
        .templates
        .render("github-error", &json!({ "title": PAGE_TITLE }))
    {
        Ok(page) => (status, page).into_response(),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Failed to render error page");
            (status, PAGE_TITLE).into_response()
        }
    }
}

/// GitHub client acting as the signed-in user.
pub(crate) fn user_client(state: &AppState, session: &Session) -> Result<GitHubClient, AppError> {
    let token = session.github_token().ok_or(AppError::Unauthorized)?;
    Ok(GitHubClient::new(
        state.http.clone(),
        &token,
        &state.config.github_api_url,
    ))
}

/// Whether `user` may manage `installation`: the account itself, or an
/// active owner of the organisation.
pub(crate) async fn is_admin(
    client: &GitHubClient,
    user: &User,
    installation: &InstallationInfo,
) -> bool {
    let account = &installation.account;
    if account.account_type.as_deref() != Some("Organization") {
        return account.login == user.login;
    }

    match client.get_org_membership(&account.login).await {
        Ok(membership) => membership.is_admin(),
        Err(e) => {
            warn!(org = %account.login, error = %format!("{e:#}"), "Could not read organization membership");
            false
        }
    }
}

/// Installation the signed-in user administers, or why it is out of reach.
pub(crate) async fn admin_installation(
    state: &AppState,
    session: &Session,
    installation_id: u64,
) -> Result<InstallationInfo, AppError> {
    let client = user_client(state, session)?;
    let user = client.get_authenticated_user().await?;

    let installation = match state
        .github
        .app_client()?
        .get_installation(installation_id)
        .await
    {
        Ok(installation) => installation,
        Err(e) => {
            warn!(installation_id, error = %format!("{e:#}"), "Installation lookup failed");
            return Err(AppError::NotFound);
        }
    };

    if is_admin(&client, &user, &installation).await {
        Ok(installation)
    } else {
        Err(AppError::Forbidden)
    }
}

/// Jira host stored in the session.
pub(crate) fn session_jira_host(session: &Session) -> Result<String, AppError> {
    session
        .jira_host()
        .ok_or_else(|| AppError::BadRequest("Jira Host url not found".to_string()))
}
