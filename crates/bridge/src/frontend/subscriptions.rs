//! Jira sites connected to one installation, as seen from GitHub.

use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::extract::{ValidForm, ValidPath};
use super::{admin_installation, PAGE_TITLE};
use crate::csrf::token_for;
use crate::error::AppError;
use crate::server::AppState;
use crate::session::Session;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectForm {
    installation_id: u64,
    jira_host: String,
}

/// `GET /github/subscriptions/{installation_id}`
pub async fn get_subscriptions(
    State(state): State<AppState>,
    session: Session,
    ValidPath(installation_id): ValidPath<u64>,
) -> Result<Html<String>, AppError> {
    let installation = admin_installation(&state, &session, installation_id).await?;

    let subscriptions: Vec<_> = state
        .store
        .subscriptions_for_installation(installation_id)
        .await
        .into_iter()
        .map(|s| json!({ "jiraHost": s.jira_host }))
        .collect();

    Ok(state.templates.render(
        "github-subscriptions",
        &json!({
            "title": PAGE_TITLE,
            "csrfToken": token_for(&session),
            "account": installation.account.login,
            "installationId": installation_id,
            "subscriptions": subscriptions,
        }),
    )?)
}

/// `POST /github/subscription`: disconnect a Jira site.
pub async fn delete_subscription(
    State(state): State<AppState>,
    session: Session,
    ValidForm(form): ValidForm<DisconnectForm>,
) -> Result<StatusCode, AppError> {
    admin_installation(&state, &session, form.installation_id).await?;

    let Some(removed) = state
        .store
        .remove_subscription(form.installation_id, &form.jira_host)
        .await
    else {
        return Err(AppError::NotFound);
    };

    if let Some(jira) = state.jira_client(&removed.jira_host).await {
        if let Err(e) = jira.delete_installation_data(form.installation_id).await {
            warn!(jira_host = %removed.jira_host, error = %format!("{e:#}"), "Failed to clear Jira data");
        }
    }

    info!(
        installation_id = form.installation_id,
        jira_host = %removed.jira_host,
        "Disconnected GitHub installation from Jira site"
    );
    state.statsd.increment("subscription.deleted", &[]);

    Ok(StatusCode::ACCEPTED)
}
