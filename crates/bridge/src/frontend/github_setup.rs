//! Jira site selection for users arriving from the GitHub App install.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::LazyLock;

use super::extract::ValidForm;
use super::PAGE_TITLE;
use crate::csrf::token_for;
use crate::error::AppError;
use crate::server::AppState;
use crate::session::Session;

/// Jira Cloud domains a site may live under.
pub const JIRA_DOMAINS: &[&str] = &["atlassian.net", "jira.com"];

static SITE_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9-]*$").expect("valid regex"));

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupForm {
    #[serde(default)]
    jira_domain: String,
    #[serde(default)]
    jira_domain_main: String,
}

/// Site name prefilled from the Jira host in the session.
fn site_name(jira_host: Option<&str>) -> String {
    jira_host
        .and_then(|host| url::Url::parse(host).ok())
        .and_then(|url| url.host_str().map(str::to_string))
        .and_then(|host| {
            JIRA_DOMAINS
                .iter()
                .find_map(|domain| host.strip_suffix(&format!(".{domain}")).map(str::to_string))
        })
        .unwrap_or_default()
}

/// Whether a submitted site is a Jira Cloud site.
#[must_use]
pub fn is_valid_site(jira_domain: &str, jira_domain_main: &str) -> bool {
    SITE_NAME_PATTERN.is_match(jira_domain) && JIRA_DOMAINS.contains(&jira_domain_main)
}

fn render(
    state: &AppState,
    session: &Session,
    jira_domain: &str,
    error: Option<&str>,
) -> Result<axum::response::Html<String>, AppError> {
    Ok(state.templates.render(
        "github-setup",
        &json!({
            "title": PAGE_TITLE,
            "csrfToken": token_for(session),
            "jiraDomain": jira_domain,
            "domains": JIRA_DOMAINS,
            "error": error,
        }),
    )?)
}

/// `GET /github/setup`
pub async fn get_setup(State(state): State<AppState>, session: Session) -> Result<Response, AppError> {
    let jira_domain = site_name(session.jira_host().as_deref());
    Ok(render(&state, &session, &jira_domain, None)?.into_response())
}

/// `POST /github/setup`: send the user to the app's page on their site.
pub async fn post_setup(
    State(state): State<AppState>,
    session: Session,
    ValidForm(form): ValidForm<SetupForm>,
) -> Result<Response, AppError> {
    let jira_domain = form.jira_domain.trim();
    if !is_valid_site(jira_domain, &form.jira_domain_main) {
        let page = render(
            &state,
            &session,
            jira_domain,
            Some("Please enter a valid Jira Cloud site."),
        )?;
        return Ok((StatusCode::BAD_REQUEST, page).into_response());
    }

    let site = format!("https://{jira_domain}.{}", form.jira_domain_main);
    Ok(Redirect::to(&format!(
        "{site}/plugins/servlet/upm/marketplace/plugins/{}",
        state.config.app_key
    ))
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_site() {
        assert!(is_valid_site("example", "atlassian.net"));
        assert!(is_valid_site("my-team2", "jira.com"));
        assert!(!is_valid_site("", "atlassian.net"));
        assert!(!is_valid_site("evil.com/x", "atlassian.net"));
        assert!(!is_valid_site("example", "example.com"));
    }

    #[test]
    fn test_site_name_from_session_host() {
        assert_eq!(site_name(Some("https://example.atlassian.net")), "example");
        assert_eq!(site_name(Some("https://other.example.com")), "");
        assert_eq!(site_name(None), "");
    }
}
