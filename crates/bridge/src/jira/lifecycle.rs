//! Jira Connect lifecycle callbacks.

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::auth::verify_jira_jwt;
use crate::server::AppState;
use crate::store::JiraInstallation;

/// Body of the `installed` and `uninstalled` callbacks.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecyclePayload {
    pub client_key: String,
    pub base_url: String,
    #[serde(default)]
    pub shared_secret: Option<String>,
}

/// Check that a callback is signed by a site we already know.
fn verify_signed_by(
    headers: &HeaderMap,
    installation: &JiraInstallation,
) -> Result<(), StatusCode> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("JWT "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    match verify_jira_jwt(token, &installation.shared_secret) {
        Ok(claims) if claims.iss == installation.client_key => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// `POST /jira/events/installed`
///
/// A first install is accepted as is. Reinstalling over a known site must
/// be signed with that site's current shared secret.
pub async fn installed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LifecyclePayload>,
) -> Result<Json<Value>, StatusCode> {
    let Some(shared_secret) = payload.shared_secret else {
        warn!(client_key = %payload.client_key, "Installed callback without shared secret");
        return Err(StatusCode::BAD_REQUEST);
    };

    if let Some(existing) = state.store.jira_installation(&payload.base_url).await {
        if let Err(status) = verify_signed_by(&headers, &existing) {
            warn!(jira_host = %existing.base_url, "Rejected unsigned reinstall callback");
            return Err(status);
        }
    }

    info!(jira_host = %payload.base_url, client_key = %payload.client_key, "Jira site installed app");
    state
        .store
        .upsert_jira_installation(JiraInstallation {
            base_url: payload.base_url,
            client_key: payload.client_key,
            shared_secret,
        })
        .await;
    state.statsd.increment("jira.installed", &[]);

    Ok(Json(json!({ "status": "installed" })))
}

/// `POST /jira/events/uninstalled`
///
/// Must be signed by the site being removed.
pub async fn uninstalled(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LifecyclePayload>,
) -> Result<Json<Value>, StatusCode> {
    let Some(installation) = state.store.jira_installation(&payload.base_url).await else {
        return Err(StatusCode::NOT_FOUND);
    };

    if let Err(status) = verify_signed_by(&headers, &installation) {
        warn!(jira_host = %installation.base_url, "Rejected unsigned uninstall callback");
        return Err(status);
    }

    state
        .store
        .remove_jira_installation(&installation.client_key)
        .await;
    info!(jira_host = %installation.base_url, "Jira site uninstalled app");
    state.statsd.increment("jira.uninstalled", &[]);

    Ok(Json(json!({ "status": "uninstalled" })))
}
