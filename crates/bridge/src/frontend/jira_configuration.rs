//! Connection status page shown inside Jira.

use axum::{extract::State, http::StatusCode, response::Html};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::extract::ValidForm;
use super::{session_jira_host, PAGE_TITLE};
use crate::csrf::token_for;
use crate::error::AppError;
use crate::server::AppState;
use crate::session::Session;
use crate::store::SyncStatus;
use crate::sync::SyncJob;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionRow {
    id: u64,
    avatar: Option<String>,
    account: String,
    number_of_synced_repos: usize,
    total_number_of_repos: Option<usize>,
    sync_status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationForm {
    installation_id: u64,
}

/// `GET /jira/configuration`
pub async fn get_configuration(
    State(state): State<AppState>,
    session: Session,
) -> Result<Html<String>, AppError> {
    let jira_host = session_jira_host(&session)?;
    let subscriptions = state.store.subscriptions_for_host(&jira_host).await;
    let app = state.github.app_client()?;

    let mut connections = Vec::with_capacity(subscriptions.len());
    for subscription in subscriptions {
        // Rows still render when GitHub cannot describe the installation.
        let account = match app.get_installation(subscription.installation_id).await {
            Ok(installation) => Some(installation.account),
            Err(e) => {
                warn!(
                    installation_id = subscription.installation_id,
                    error = %format!("{e:#}"),
                    "Could not load installation"
                );
                None
            }
        };

        connections.push(ConnectionRow {
            id: subscription.installation_id,
            avatar: account.as_ref().map(|a| a.avatar_url.clone()),
            account: account.map_or_else(
                || subscription.installation_id.to_string(),
                |a| a.login,
            ),
            number_of_synced_repos: subscription.synced_repos,
            total_number_of_repos: subscription.total_repos,
            sync_status: subscription.sync_status.to_string(),
        });
    }

    Ok(state.templates.render(
        "jira-configuration",
        &json!({
            "title": PAGE_TITLE,
            "csrfToken": token_for(&session),
            "host": jira_host,
            "connections": connections,
        }),
    )?)
}

/// `DELETE /jira/configuration`: disconnect an installation from this site.
pub async fn delete_configuration(
    State(state): State<AppState>,
    session: Session,
    ValidForm(form): ValidForm<InstallationForm>,
) -> Result<StatusCode, AppError> {
    let jira_host = session_jira_host(&session)?;
    if state
        .store
        .remove_subscription(form.installation_id, &jira_host)
        .await
        .is_none()
    {
        return Err(AppError::NotFound);
    }

    if let Some(jira) = state.jira_client(&jira_host).await {
        if let Err(e) = jira.delete_installation_data(form.installation_id).await {
            warn!(jira_host = %jira_host, error = %format!("{e:#}"), "Failed to clear Jira data");
        }
    }

    info!(installation_id = form.installation_id, jira_host = %jira_host, "Connection removed from Jira");
    state.statsd.increment("subscription.deleted", &[]);

    Ok(StatusCode::NO_CONTENT)
}

/// `POST /jira/sync`: start the backfill again.
pub async fn retry_sync(
    State(state): State<AppState>,
    session: Session,
    ValidForm(form): ValidForm<InstallationForm>,
) -> Result<StatusCode, AppError> {
    let jira_host = session_jira_host(&session)?;
    let reset = state
        .store
        .update_sync(form.installation_id, &jira_host, |s| {
            s.sync_status = SyncStatus::Pending;
            s.synced_repos = 0;
            s.total_repos = None;
        })
        .await;
    if !reset {
        return Err(AppError::NotFound);
    }

    state.sync.enqueue(SyncJob {
        installation_id: form.installation_id,
        jira_host,
    })?;
    state.statsd.increment("sync.retried", &[]);

    Ok(StatusCode::ACCEPTED)
}
