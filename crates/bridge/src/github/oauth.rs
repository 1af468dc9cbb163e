//! GitHub OAuth web flow.

use anyhow::{anyhow, Context, Result};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;

/// OAuth app credentials.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    client_id: String,
    client_secret: String,
    github_url: String,
    redirect_uri: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl OAuthClient {
    pub fn new(
        client_id: &str,
        client_secret: &str,
        github_url: &str,
        redirect_uri: &str,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            github_url: github_url.trim_end_matches('/').to_string(),
            redirect_uri: redirect_uri.to_string(),
            http,
        })
    }

    /// URL the browser is sent to for authorization.
    #[must_use]
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}/login/oauth/authorize?client_id={}&redirect_uri={}&state={}",
            self.github_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for a user access token.
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/login/oauth/access_token", self.github_url))
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, "jira-bridge/1.0")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state),
            ])
            .send()
            .await
            .context("Failed to send OAuth token request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("GitHub OAuth error: {status} - {body}"));
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse OAuth token response")?;

        match (token.access_token, token.error) {
            (Some(access_token), None) => Ok(access_token),
            (_, error) => Err(anyhow!(
                "GitHub OAuth error: {} - {}",
                error.unwrap_or_else(|| "missing_token".to_string()),
                token.error_description.unwrap_or_default()
            )),
        }
    }
}
