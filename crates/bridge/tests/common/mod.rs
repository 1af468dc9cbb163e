//! Shared harness: a running bridge wired to mock GitHub and Jira servers.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use jira_bridge::config::{GlobalTags, StatsdConfig};
use jira_bridge::store::JiraInstallation;
use jira_bridge::sync::{SyncJob, SyncQueue};
use jira_bridge::{build_router, AppState, Config, Environment, Statsd, Store};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_KEY: &str = include_str!("../fixtures/github-app.pem");
pub const APP_KEY: &str = "com.github.integration.test";
pub const CLIENT_KEY: &str = "jira-client-key";
pub const SHARED_SECRET: &str = "jira-shared-secret";
pub const INSTALLATION_ID: u64 = 99;

/// A bridge listening on a random port.
pub struct TestApp {
    pub addr: SocketAddr,
    pub state: AppState,
    pub statsd: Statsd,
    pub github: MockServer,
    pub jira: MockServer,
    pub jobs: UnboundedReceiver<SyncJob>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Register the Jira mock as an installed site.
    pub async fn install_jira_site(&self) {
        self.state
            .store
            .upsert_jira_installation(JiraInstallation {
                base_url: self.jira.uri(),
                client_key: CLIENT_KEY.to_string(),
                shared_secret: SHARED_SECRET.to_string(),
            })
            .await;
    }

    /// Connect the test installation to the Jira mock.
    pub async fn connect(&self) {
        self.install_jira_site().await;
        self.state
            .store
            .install_subscription(INSTALLATION_ID, &self.jira.uri())
            .await;
    }
}

pub fn config(environment: Environment, webhook_secret: Option<&str>, github_url: &str) -> Config {
    Config {
        port: 0,
        app_url: "https://bridge.test".to_string(),
        environment,
        app_key: APP_KEY.to_string(),
        github_app_id: Some(12345),
        github_private_key: Some(TEST_KEY.to_string()),
        github_client_id: Some("client-id".to_string()),
        github_client_secret: Some("client-secret".to_string()),
        webhook_secret: webhook_secret.map(String::from),
        github_api_url: github_url.to_string(),
        github_url: github_url.to_string(),
        static_dir: concat!(env!("CARGO_MANIFEST_DIR"), "/static").to_string(),
        statsd: StatsdConfig {
            host: "localhost".to_string(),
            port: 8125,
            prefix: "jira_bridge.".to_string(),
            mock: true,
            global_tags: GlobalTags {
                environment: "test".to_string(),
                environment_type: "testenv".to_string(),
                deployment_id: "1".to_string(),
                region: "localhost".to_string(),
            },
        },
    }
}

/// Start the bridge with mock upstreams.
pub async fn spawn_app(environment: Environment, webhook_secret: Option<&str>) -> TestApp {
    let github = MockServer::start().await;
    let jira = MockServer::start().await;

    // Any installation can mint a token.
    Mock::given(method("POST"))
        .and(path_regex(r"^/app/installations/\d+/access_tokens$"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "token": "ghs_installation_token",
            "expires_at": (Utc::now() + Duration::hours(1)).to_rfc3339(),
        })))
        .mount(&github)
        .await;

    let statsd = Statsd::mock("jira_bridge.", vec!["environment:test".to_string()]);
    let (queue, jobs) = SyncQueue::new();
    let state = AppState::new(
        config(environment, webhook_secret, &github.uri()),
        statsd.clone(),
        Store::new(),
        queue,
    )
    .unwrap();

    let app = build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        addr,
        state,
        statsd,
        github,
        jira,
        jobs,
        client,
    }
}

/// `name=value` part of the session `Set-Cookie` header.
pub fn session_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("session="))
        .and_then(|v| v.split(';').next())
        .map(String::from)
}

pub fn user(login: &str) -> Value {
    json!({
        "login": login,
        "avatar_url": format!("https://avatars.test/{login}"),
        "html_url": format!("https://github.com/{login}"),
        "type": "User"
    })
}

pub fn repository() -> Value {
    json!({
        "id": 1001,
        "name": "repo",
        "full_name": "octo-org/repo",
        "html_url": "https://github.com/octo-org/repo",
        "owner": { "login": "octo-org", "type": "Organization" }
    })
}

pub fn pull_request(title: &str, branch: &str) -> Value {
    json!({
        "number": 7,
        "title": title,
        "state": "open",
        "merged": false,
        "comments": 2,
        "html_url": "https://github.com/octo-org/repo/pull/7",
        "updated_at": "2024-05-01T10:00:00Z",
        "head": {
            "ref": branch,
            "sha": "abcdef1234567890",
            "repo": { "id": 1001, "full_name": "octo-org/repo", "html_url": "https://github.com/octo-org/repo" }
        },
        "base": {
            "ref": "main",
            "sha": "0000000000000000",
            "repo": { "id": 1001, "full_name": "octo-org/repo", "html_url": "https://github.com/octo-org/repo" }
        },
        "user": user("octocat")
    })
}

pub fn pull_request_event(title: &str, branch: &str) -> Value {
    json!({
        "action": "opened",
        "pull_request": pull_request(title, branch),
        "repository": repository(),
        "installation": { "id": INSTALLATION_ID }
    })
}
