//! GitHub App authentication.
//!
//! App-level calls use a short-lived RS256 JWT; installation calls use an
//! installation access token minted with that JWT. Tokens are cached until
//! shortly before they expire.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::client::GitHubClient;

/// Tokens this close to expiry are refreshed.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Lifetime of an app JWT, measured from its backdated `iat`.
const APP_JWT_LIFETIME_SECS: i64 = 600;

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Clone, Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// GitHub App credentials.
#[derive(Clone)]
pub struct GitHubApp {
    app_id: u64,
    key: EncodingKey,
    api_url: String,
    http: reqwest::Client,
    tokens: Arc<Mutex<HashMap<u64, InstallationToken>>>,
}

impl GitHubApp {
    /// Create an app from its ID and PEM private key, sending requests
    /// through `http`.
    pub fn new(
        http: reqwest::Client,
        app_id: u64,
        private_key_pem: &str,
        api_url: &str,
    ) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .context("Failed to parse GitHub App private key")?;

        Ok(Self {
            app_id,
            key,
            api_url: api_url.trim_end_matches('/').to_string(),
            http,
            tokens: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Sign an app JWT.
    ///
    /// `iat` is backdated a minute for clock drift; `exp` is ten minutes
    /// after `iat`, GitHub's maximum.
    pub fn app_jwt(&self) -> Result<String> {
        let iat = Utc::now() - Duration::seconds(60);
        let claims = AppClaims {
            iat: iat.timestamp(),
            exp: (iat + Duration::seconds(APP_JWT_LIFETIME_SECS)).timestamp(),
            iss: self.app_id.to_string(),
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .context("Failed to sign GitHub App JWT")
    }

    /// Client authenticated as the app.
    pub fn app_client(&self) -> Result<GitHubClient> {
        Ok(GitHubClient::new(
            self.http.clone(),
            &self.app_jwt()?,
            &self.api_url,
        ))
    }

    /// Client authenticated as an installation.
    pub async fn installation_client(&self, installation_id: u64) -> Result<GitHubClient> {
        let token = self.installation_token(installation_id).await?;
        Ok(GitHubClient::new(self.http.clone(), &token, &self.api_url))
    }

    /// Cached token for an installation, if it is not about to expire.
    async fn cached_token(&self, installation_id: u64) -> Option<String> {
        let tokens = self.tokens.lock().await;
        tokens
            .get(&installation_id)
            .filter(|cached| {
                cached.expires_at - Utc::now() > Duration::seconds(TOKEN_REFRESH_MARGIN_SECS)
            })
            .map(|cached| cached.token.clone())
    }

    /// The cache is not locked while a new token is requested. Concurrent
    /// misses may each mint a token; the last one stays cached.
    async fn installation_token(&self, installation_id: u64) -> Result<String> {
        if let Some(token) = self.cached_token(installation_id).await {
            return Ok(token);
        }

        debug!(installation_id, "Requesting installation access token");
        let url = format!(
            "{}/app/installations/{installation_id}/access_tokens",
            self.api_url
        );
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.app_jwt()?))
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "jira-bridge/1.0")
            .send()
            .await
            .context("Failed to send access token request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "GitHub API error creating installation token: {status} - {body}"
            ));
        }

        let token: InstallationToken = response
            .json()
            .await
            .context("Failed to parse access token response")?;
        self.tokens
            .lock()
            .await
            .insert(installation_id, token.clone());
        Ok(token.token)
    }
}
