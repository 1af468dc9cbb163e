//! Connecting GitHub installations to the Jira site in the session.

use axum::{
    extract::State,
    response::{Html, Redirect},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::extract::ValidForm;
use super::{admin_installation, is_admin, session_jira_host, user_client, PAGE_TITLE};
use crate::csrf::token_for;
use crate::error::AppError;
use crate::server::AppState;
use crate::session::Session;
use crate::sync::SyncJob;

/// One row of the configuration page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InstallationRow {
    id: u64,
    avatar: String,
    html_url: String,
    account: String,
    sync_status: Option<String>,
    connected: bool,
    is_admin: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectForm {
    installation_id: u64,
}

/// `GET /github/configuration`
pub async fn get_configuration(
    State(state): State<AppState>,
    session: Session,
) -> Result<Html<String>, AppError> {
    let jira_host = session_jira_host(&session)?;
    let client = user_client(&state, &session)?;
    let user = client.get_authenticated_user().await?;
    let installations = client.list_user_installations().await?;

    let mut rows = Vec::with_capacity(installations.len());
    for installation in &installations {
        let subscription = state.store.subscription(installation.id, &jira_host).await;
        rows.push(InstallationRow {
            id: installation.id,
            avatar: installation.account.avatar_url.clone(),
            html_url: installation.account.html_url.clone(),
            account: installation.account.login.clone(),
            sync_status: subscription.as_ref().map(|s| s.sync_status.to_string()),
            connected: subscription.is_some(),
            is_admin: is_admin(&client, &user, installation).await,
        });
    }

    let client_key = state
        .store
        .jira_installation(&jira_host)
        .await
        .map(|installation| installation.client_key);

    Ok(state.templates.render(
        "github-configuration",
        &json!({
            "title": PAGE_TITLE,
            "csrfToken": token_for(&session),
            "jiraHost": jira_host,
            "clientKey": client_key,
            "installations": rows,
        }),
    )?)
}

/// `POST /github/configuration`: connect an installation and start its sync.
pub async fn post_configuration(
    State(state): State<AppState>,
    session: Session,
    ValidForm(form): ValidForm<ConnectForm>,
) -> Result<Redirect, AppError> {
    let jira_host = session_jira_host(&session)?;
    let Some(jira) = state.store.jira_installation(&jira_host).await else {
        warn!(jira_host = %jira_host, "Connect requested for a site without the app");
        return Err(AppError::NotFound);
    };

    admin_installation(&state, &session, form.installation_id).await?;

    state
        .store
        .install_subscription(form.installation_id, &jira.base_url)
        .await;
    state.sync.enqueue(SyncJob {
        installation_id: form.installation_id,
        jira_host: jira.base_url.clone(),
    })?;

    info!(
        installation_id = form.installation_id,
        jira_host = %jira.base_url,
        "Connected GitHub installation to Jira site"
    );
    state.statsd.increment("subscription.created", &[]);

    Ok(Redirect::to("/github/configuration"))
}
