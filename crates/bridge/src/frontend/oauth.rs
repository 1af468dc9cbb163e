//! GitHub OAuth login routes.

use axum::{
    extract::{Query, State},
    response::Redirect,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::server::AppState;
use crate::session::Session;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

/// `GET /github/login`
pub async fn login(State(state): State<AppState>, session: Session) -> Redirect {
    let oauth_state = Uuid::new_v4().simple().to_string();
    session.update(|data| data.oauth_state = Some(oauth_state.clone()));
    Redirect::to(&state.oauth.authorize_url(&oauth_state))
}

/// `GET /github/callback`
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, AppError> {
    let expected = session.update(|data| data.oauth_state.take());
    let (Some(code), Some(returned)) = (params.code, params.state) else {
        return Err(AppError::BadRequest("Missing OAuth code".to_string()));
    };
    if expected.as_deref() != Some(returned.as_str()) {
        warn!("OAuth state mismatch");
        return Err(AppError::Forbidden);
    }

    let token = state.oauth.exchange_code(&code, &returned).await?;
    let return_to = session.update(|data| {
        data.github_token = Some(token);
        data.return_to.take()
    });
    info!("GitHub user signed in");
    state.statsd.increment("oauth.login", &[]);

    // Only local paths are followed.
    let target = return_to
        .as_deref()
        .filter(|path| path.starts_with('/') && !path.starts_with("//"))
        .unwrap_or("/github/configuration");
    Ok(Redirect::to(target))
}
