//! Guards and context capture for the configuration pages.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use crate::error::AppError;
use crate::jira::auth::verify_jira_jwt;
use crate::server::AppState;
use crate::session::Session;

/// Remember the Jira context (`?jwt=` and `?xdm_e=`) passed by the Jira
/// iframe, keeping earlier values when a request omits them.
pub async fn remember_jira_context(session: Session, request: Request, next: Next) -> Response {
    if let Some(query) = request.uri().query() {
        let mut jwt = None;
        let mut jira_host = None;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "jwt" if !value.is_empty() => jwt = Some(value.into_owned()),
                "xdm_e" if !value.is_empty() => jira_host = Some(value.into_owned()),
                _ => {}
            }
        }

        if jwt.is_some() || jira_host.is_some() {
            session.update(|data| {
                if jwt.is_some() {
                    data.jwt = jwt;
                }
                if jira_host.is_some() {
                    data.jira_host = jira_host;
                }
            });
        }
    }

    next.run(request).await
}

/// Send users without a GitHub token through the OAuth flow, returning
/// them to the page they asked for afterwards.
pub async fn check_github_auth(session: Session, request: Request, next: Next) -> Response {
    if session.github_token().is_some() {
        return next.run(request).await;
    }

    let return_to = request
        .uri()
        .path_and_query()
        .map_or_else(|| request.uri().path().to_string(), ToString::to_string);
    debug!(return_to = %return_to, "No GitHub token in session, redirecting to login");
    session.update(|data| data.return_to = Some(return_to));

    Redirect::to("/github/login").into_response()
}

/// Require a Jira context token signed by the site in the session.
pub async fn verify_jira(
    State(state): State<AppState>,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let data = session.data();
    let (Some(jira_host), Some(jwt)) = (data.jira_host, data.jwt) else {
        return Err(AppError::Unauthorized);
    };

    let Some(installation) = state.store.jira_installation(&jira_host).await else {
        debug!(jira_host = %jira_host, "Jira site is not installed");
        return Err(AppError::Unauthorized);
    };

    match verify_jira_jwt(&jwt, &installation.shared_secret) {
        Ok(claims) if claims.iss == installation.client_key => Ok(next.run(request).await),
        Ok(_) | Err(_) => {
            debug!(jira_host = %jira_host, "Jira context token failed verification");
            Err(AppError::Unauthorized)
        }
    }
}
