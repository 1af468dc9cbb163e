//! The signed-in user's installations of the app.

use axum::{extract::State, response::Html};
use serde::Serialize;
use serde_json::json;

use super::{is_admin, user_client, PAGE_TITLE};
use crate::csrf::token_for;
use crate::error::AppError;
use crate::server::AppState;
use crate::session::Session;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InstallationItem {
    id: u64,
    avatar: String,
    account: String,
    is_admin: bool,
}

/// `GET /github/installations`
pub async fn list_installations(
    State(state): State<AppState>,
    session: Session,
) -> Result<Html<String>, AppError> {
    let client = user_client(&state, &session)?;
    let user = client.get_authenticated_user().await?;

    let mut items = Vec::new();
    for installation in client.list_user_installations().await? {
        items.push(InstallationItem {
            id: installation.id,
            avatar: installation.account.avatar_url.clone(),
            is_admin: is_admin(&client, &user, &installation).await,
            account: installation.account.login,
        });
    }

    Ok(state.templates.render(
        "github-installations",
        &json!({
            "title": PAGE_TITLE,
            "csrfToken": token_for(&session),
            "installations": items,
        }),
    )?)
}
