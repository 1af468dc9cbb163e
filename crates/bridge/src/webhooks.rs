//! GitHub webhook handling.
//!
//! Deliveries are verified, transformed into dev-info documents and sent to
//! every Jira site connected to the delivering installation.

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use devinfo::{
    jira_id, transform_branch, transform_pull_request, transform_push, CreateEvent, DeleteEvent,
    DevInfoRepository, Installation, PullRequestEvent, PushEvent,
};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};

use crate::metrics::timed;
use crate::server::AppState;
use crate::store::Subscription;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Verify a `sha256=<hex>` signature over the raw body.
#[must_use]
pub fn verify_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    let Some(hex_signature) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(hex_signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    computed.as_slice().ct_eq(&signature_bytes).into()
}

/// Update sequence for documents built now.
///
/// Jira drops updates whose sequence is not newer than what it holds, so the
/// current time in milliseconds orders concurrent deliveries.
#[must_use]
pub fn update_sequence_id() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Deserialize)]
struct InstallationEvent {
    action: String,
    installation: Installation,
}

fn ignored(reason: &str) -> Json<Value> {
    Json(json!({ "status": "ignored", "reason": reason }))
}

fn parse<T: DeserializeOwned>(body: &[u8], event_type: &str) -> Result<T, StatusCode> {
    serde_json::from_slice(body).map_err(|e| {
        error!(event_type = %event_type, error = %e, "Failed to parse GitHub webhook payload");
        StatusCode::BAD_REQUEST
    })
}

/// `POST /github/events`
pub async fn github_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, StatusCode> {
    if let Some(secret) = &state.config.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(&body, signature, secret) {
            warn!("Rejected GitHub webhook with invalid signature");
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    let event_type = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let delivery_id = headers
        .get("X-GitHub-Delivery")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    info!(
        event_type = %event_type,
        delivery_id = %delivery_id,
        "Received GitHub webhook"
    );
    state
        .statsd
        .increment("webhooks.received", &[format!("event:{event_type}")]);

    match event_type.as_str() {
        "pull_request" | "pull_request_review" => {
            let event: PullRequestEvent = parse(&body, &event_type)?;
            handle_pull_request(&state, &event_type, event).await
        }
        "create" => {
            let event: CreateEvent = parse(&body, &event_type)?;
            handle_create(&state, event).await
        }
        "delete" => {
            let event: DeleteEvent = parse(&body, &event_type)?;
            handle_delete(&state, event).await
        }
        "push" => {
            let event: PushEvent = parse(&body, &event_type)?;
            handle_push(&state, event).await
        }
        "installation" => {
            let event: InstallationEvent = parse(&body, &event_type)?;
            handle_installation(&state, event).await
        }
        other => {
            debug!(event_type = %other, "Ignoring unsupported event");
            Ok(ignored("unsupported_event"))
        }
    }
}

/// Connections for the delivering installation, or the reason to stop.
async fn subscriptions_for(
    state: &AppState,
    installation: Option<Installation>,
) -> Result<(u64, Vec<Subscription>), Json<Value>> {
    let Some(Installation { id }) = installation else {
        return Err(ignored("no_installation"));
    };
    let subscriptions = state.store.subscriptions_for_installation(id).await;
    if subscriptions.is_empty() {
        debug!(installation_id = id, "No Jira sites connected to installation");
        return Err(ignored("no_subscriptions"));
    }
    Ok((id, subscriptions))
}

fn internal_error(event_type: &str) -> impl FnOnce(anyhow::Error) -> StatusCode + '_ {
    move |e| {
        error!(event_type = %event_type, error = %format!("{e:#}"), "Failed to process GitHub webhook");
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

async fn handle_pull_request(
    state: &AppState,
    event_type: &str,
    event: PullRequestEvent,
) -> Result<Json<Value>, StatusCode> {
    let (installation_id, subscriptions) =
        match subscriptions_for(state, event.installation).await {
            Ok(found) => found,
            Err(reply) => return Ok(reply),
        };

    let repository = &event.repository;
    let pull_request = &event.pull_request;
    let data = timed(
        &state.statsd,
        "webhooks.transform",
        &[format!("event:{event_type}")],
        async {
            let github = state.github.installation_client(installation_id).await?;
            let author = github.pull_request_author(&pull_request.user).await;
            let reviews = github
                .list_pull_request_reviews(
                    repository.owner_login(),
                    &repository.name,
                    pull_request.number,
                )
                .await?;
            Ok::<_, anyhow::Error>(transform_pull_request(
                pull_request,
                repository,
                &author,
                &reviews,
                update_sequence_id(),
            ))
        },
    )
    .await
    .map_err(internal_error(event_type))?;

    let Some(data) = data else {
        debug!(
            repo = %repository.full_name,
            pr_number = pull_request.number,
            "Pull request references no issues"
        );
        return Ok(ignored("no_issue_keys"));
    };

    Ok(submit(state, installation_id, &subscriptions, &[data], event_type).await)
}

async fn handle_create(state: &AppState, event: CreateEvent) -> Result<Json<Value>, StatusCode> {
    if event.ref_type != "branch" {
        return Ok(ignored("not_a_branch"));
    }
    let (installation_id, subscriptions) =
        match subscriptions_for(state, event.installation).await {
            Ok(found) => found,
            Err(reply) => return Ok(reply),
        };

    let repository = &event.repository;
    let data = timed(
        &state.statsd,
        "webhooks.transform",
        &["event:create".to_string()],
        async {
            let github = state.github.installation_client(installation_id).await?;
            let commit = github
                .get_commit(repository.owner_login(), &repository.name, &event.ref_name)
                .await?;
            Ok::<_, anyhow::Error>(transform_branch(&event, &commit, update_sequence_id()))
        },
    )
    .await
    .map_err(internal_error("create"))?;

    match data {
        Some(data) => Ok(submit(state, installation_id, &subscriptions, &[data], "create").await),
        None => Ok(ignored("no_issue_keys")),
    }
}

async fn handle_delete(state: &AppState, event: DeleteEvent) -> Result<Json<Value>, StatusCode> {
    if event.ref_type != "branch" {
        return Ok(ignored("not_a_branch"));
    }
    let (_, subscriptions) = match subscriptions_for(state, event.installation).await {
        Ok(found) => found,
        Err(reply) => return Ok(reply),
    };

    let repository_id = event.repository.id.to_string();
    let branch_id = jira_id(&event.ref_name);
    let sequence = update_sequence_id();

    let mut deleted = 0;
    let mut failed = 0;
    for subscription in &subscriptions {
        let Some(jira) = state.jira_client(&subscription.jira_host).await else {
            warn!(jira_host = %subscription.jira_host, "Jira site no longer installed");
            failed += 1;
            continue;
        };
        match jira.delete_branch(&repository_id, &branch_id, sequence).await {
            Ok(()) => deleted += 1,
            Err(e) => {
                error!(jira_host = %subscription.jira_host, error = %format!("{e:#}"), "Failed to delete branch");
                failed += 1;
            }
        }
    }

    Ok(Json(json!({
        "status": "processed",
        "event": "delete",
        "submitted": deleted,
        "failed": failed,
    })))
}

async fn handle_push(state: &AppState, event: PushEvent) -> Result<Json<Value>, StatusCode> {
    let (installation_id, subscriptions) =
        match subscriptions_for(state, event.installation).await {
            Ok(found) => found,
            Err(reply) => return Ok(reply),
        };

    let data = timed(
        &state.statsd,
        "webhooks.transform",
        &["event:push".to_string()],
        async { transform_push(&event, update_sequence_id()) },
    )
    .await;

    match data {
        Some(data) => Ok(submit(state, installation_id, &subscriptions, &[data], "push").await),
        None => Ok(ignored("no_issue_keys")),
    }
}

/// An uninstalled GitHub App disconnects from every Jira site.
async fn handle_installation(
    state: &AppState,
    event: InstallationEvent,
) -> Result<Json<Value>, StatusCode> {
    if event.action != "deleted" {
        return Ok(ignored("unsupported_action"));
    }

    let installation_id = event.installation.id;
    let subscriptions = state
        .store
        .subscriptions_for_installation(installation_id)
        .await;
    for subscription in &subscriptions {
        state
            .store
            .remove_subscription(installation_id, &subscription.jira_host)
            .await;
    }
    info!(
        installation_id,
        removed = subscriptions.len(),
        "GitHub App uninstalled, removed connections"
    );

    Ok(Json(json!({
        "status": "processed",
        "event": "installation",
        "removed": subscriptions.len(),
    })))
}

/// Send documents to every connected site.
///
/// A failing site is logged and counted; the others are still updated.
async fn submit(
    state: &AppState,
    installation_id: u64,
    subscriptions: &[Subscription],
    repositories: &[DevInfoRepository],
    event_type: &str,
) -> Json<Value> {
    let mut submitted = 0;
    let mut failed = 0;

    for subscription in subscriptions {
        let Some(jira) = state.jira_client(&subscription.jira_host).await else {
            warn!(jira_host = %subscription.jira_host, "Jira site no longer installed");
            failed += 1;
            continue;
        };
        match jira.submit_dev_info(repositories, installation_id).await {
            Ok(()) => submitted += 1,
            Err(e) => {
                error!(
                    jira_host = %subscription.jira_host,
                    installation_id,
                    error = %format!("{e:#}"),
                    "Failed to submit development information"
                );
                failed += 1;
            }
        }
    }

    info!(event_type = %event_type, installation_id, submitted, failed, "Relayed GitHub event to Jira");
    Json(json!({
        "status": "processed",
        "event": event_type,
        "submitted": submitted,
        "failed": failed,
    }))
}
