//! GitHub REST API client.
//!
//! The same client serves app-level calls (authenticated with the app JWT),
//! installation calls (installation access token) and user calls (OAuth
//! token); only the bearer token differs.

use anyhow::{anyhow, Context, Result};
use devinfo::{CommitSummary, PullRequest, Repository, Review, User};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

/// Page size for list endpoints.
const PER_PAGE: usize = 100;

const API_VERSION: &str = "2022-11-28";
const CLIENT_USER_AGENT: &str = "jira-bridge/1.0";

/// GitHub API client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    token: String,
    api_url: String,
}

/// The GitHub App itself (`GET /app`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppInfo {
    pub id: u64,
    #[serde(default)]
    pub slug: String,
    pub name: String,
    pub html_url: String,
    /// Homepage configured for the app
    #[serde(default)]
    pub external_url: Option<String>,
}

impl AppInfo {
    /// Public page of the app.
    #[must_use]
    pub fn public_url(&self) -> &str {
        self.external_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.html_url)
    }
}

/// An installation of the app on a user or organisation account.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallationInfo {
    pub id: u64,
    pub account: User,
}

/// The authenticated user's membership in an organisation.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgMembership {
    /// `admin` or `member`
    pub role: String,
    /// `active` or `pending`
    pub state: String,
}

impl OrgMembership {
    /// Active organisation owner.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == "admin" && self.state == "active"
    }
}

#[derive(Deserialize)]
struct InstallationRepositories {
    repositories: Vec<Repository>,
}

#[derive(Deserialize)]
struct UserInstallations {
    installations: Vec<InstallationInfo>,
}

impl GitHubClient {
    /// Create a client authenticating with `token`, sharing the
    /// connection pool of `client`.
    #[must_use]
    pub fn new(client: reqwest::Client, token: &str, api_url: &str) -> Self {
        Self {
            client,
            token: token.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{path}", self.api_url);
        debug!(url = %url, "GitHub API request");

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {path}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("GitHub API error: {status} - {body}"));
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {path}"))
    }

    /// Fetch every page of a list endpoint.
    async fn get_all<T, P>(
        &self,
        path: &str,
        query: &[(&str, String)],
        items: impl Fn(P) -> Vec<T>,
    ) -> Result<Vec<T>>
    where
        P: DeserializeOwned,
    {
        let mut all = Vec::new();
        for page in 1.. {
            let mut page_query = query.to_vec();
            page_query.push(("per_page", PER_PAGE.to_string()));
            page_query.push(("page", page.to_string()));

            let batch = items(self.get(path, &page_query).await?);
            let done = batch.len() < PER_PAGE;
            all.extend(batch);
            if done {
                break;
            }
        }
        Ok(all)
    }

    /// The app itself. Requires the app JWT.
    pub async fn get_app(&self) -> Result<AppInfo> {
        self.get("/app", &[]).await
    }

    /// One installation of the app. Requires the app JWT.
    pub async fn get_installation(&self, installation_id: u64) -> Result<InstallationInfo> {
        self.get(&format!("/app/installations/{installation_id}"), &[])
            .await
    }

    /// Public profile of a user.
    pub async fn get_user(&self, login: &str) -> Result<User> {
        self.get(&format!("/users/{login}"), &[]).await
    }

    /// Full profile of a pull request author.
    ///
    /// Falls back to the user embedded in the payload when the profile
    /// cannot be read, which happens once the account has been deleted.
    pub async fn pull_request_author(&self, user: &User) -> User {
        match self.get_user(&user.login).await {
            Ok(author) => author,
            Err(e) => {
                warn!(
                    login = %user.login,
                    error = %format!("{e:#}"),
                    "Using payload user as pull request author"
                );
                user.clone()
            }
        }
    }

    /// The user the token belongs to. Requires an OAuth token.
    pub async fn get_authenticated_user(&self) -> Result<User> {
        self.get("/user", &[]).await
    }

    /// All reviews on a pull request.
    pub async fn list_pull_request_reviews(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<Review>> {
        self.get_all(
            &format!("/repos/{owner}/{repo}/pulls/{number}/reviews"),
            &[],
            |page: Vec<Review>| page,
        )
        .await
    }

    /// A single commit, by SHA or ref.
    pub async fn get_commit(&self, owner: &str, repo: &str, reference: &str) -> Result<CommitSummary> {
        self.get(&format!("/repos/{owner}/{repo}/commits/{reference}"), &[])
            .await
    }

    /// Repositories the installation can access. Requires an installation token.
    pub async fn list_installation_repositories(&self) -> Result<Vec<Repository>> {
        self.get_all(
            "/installation/repositories",
            &[],
            |page: InstallationRepositories| page.repositories,
        )
        .await
    }

    /// Every pull request of a repository, open and closed.
    pub async fn list_pull_requests(&self, owner: &str, repo: &str) -> Result<Vec<PullRequest>> {
        self.get_all(
            &format!("/repos/{owner}/{repo}/pulls"),
            &[("state", "all".to_string())],
            |page: Vec<PullRequest>| page,
        )
        .await
    }

    /// Installations of the app the user can access. Requires an OAuth token.
    pub async fn list_user_installations(&self) -> Result<Vec<InstallationInfo>> {
        self.get_all(
            "/user/installations",
            &[],
            |page: UserInstallations| page.installations,
        )
        .await
    }

    /// The user's membership in `org`. Requires an OAuth token.
    pub async fn get_org_membership(&self, org: &str) -> Result<OrgMembership> {
        self.get(&format!("/user/memberships/orgs/{org}"), &[])
            .await
    }
}
