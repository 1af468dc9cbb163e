//! Integration tests for the GitHub webhook relay.
//!
//! Each test runs the full router against mock GitHub and Jira servers and
//! checks what reaches Jira.

mod common;

use common::{pull_request_event, repository, spawn_app, user, INSTALLATION_ID};
use hmac::{Hmac, Mac};
use jira_bridge::Environment;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sha2::Sha256;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

async fn mock_pull_request_lookups(github: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/users/octocat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user("octocat")))
        .mount(github)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo-org/repo/pulls/7/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "user": user("reviewer"),
                "state": "APPROVED",
                "submitted_at": "2024-05-01T09:00:00Z"
            }
        ])))
        .mount(github)
        .await;
}

async fn post_event(
    app: &common::TestApp,
    event: &str,
    body: &Value,
    signature: Option<String>,
) -> reqwest::Response {
    let body = serde_json::to_vec(body).unwrap();
    let mut request = app
        .client
        .post(app.url("/github/events"))
        .header("X-GitHub-Event", event)
        .header("X-GitHub-Delivery", "delivery-1")
        .header("Content-Type", "application/json");
    if let Some(signature) = signature {
        request = request.header("X-Hub-Signature-256", signature);
    }
    request.body(body).send().await.unwrap()
}

#[tokio::test]
async fn test_pull_request_is_submitted_to_jira() {
    let app = spawn_app(Environment::Test, None).await;
    app.connect().await;
    mock_pull_request_lookups(&app.github).await;

    Mock::given(method("POST"))
        .and(path("/rest/devinfo/0.10/bulk"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&app.jira)
        .await;

    let response = post_event(
        &app,
        "pull_request",
        &pull_request_event("ABC-123 add login", "feature/abc-123"),
        None,
    )
    .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "processed");
    assert_eq!(body["submitted"], 1);

    let requests = app.jira.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["properties"]["installationId"], INSTALLATION_ID);
    assert_eq!(sent["preventTransitions"], false);

    let repo = &sent["repositories"][0];
    assert_eq!(repo["id"], "1001");
    let pr = &repo["pullRequests"][0];
    assert_eq!(pr["issueKeys"], json!(["ABC-123"]));
    assert_eq!(pr["status"], "OPEN");
    assert_eq!(pr["displayId"], "#7");
    assert_eq!(pr["reviewers"][0]["name"], "reviewer");
    assert_eq!(pr["reviewers"][0]["approvalStatus"], "APPROVED");
    assert_eq!(repo["branches"][0]["id"], "~666561747572652f6162632d313233");

    assert!(app
        .statsd
        .recorded()
        .iter()
        .any(|line| line.starts_with("jira_bridge.webhooks.transform:")
            && line.contains("event:pull_request")));
}

#[tokio::test]
async fn test_pull_request_without_issue_keys_is_ignored() {
    let app = spawn_app(Environment::Test, None).await;
    app.connect().await;
    mock_pull_request_lookups(&app.github).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&app.jira)
        .await;

    let response = post_event(
        &app,
        "pull_request",
        &pull_request_event("Tidy up", "chore/tidy"),
        None,
    )
    .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ignored");
    assert_eq!(body["reason"], "no_issue_keys");
}

#[tokio::test]
async fn test_event_without_subscriptions_is_ignored() {
    let app = spawn_app(Environment::Test, None).await;

    let response = post_event(
        &app,
        "pull_request",
        &pull_request_event("ABC-1 fix", "abc-1"),
        None,
    )
    .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["reason"], "no_subscriptions");
}

#[tokio::test]
async fn test_signature_is_enforced() {
    let app = spawn_app(Environment::Test, Some("webhook-secret")).await;
    let event = json!({ "zen": "Keep it logically awesome." });

    let unsigned = post_event(&app, "ping", &event, None).await;
    assert_eq!(unsigned.status(), 401);

    let forged = post_event(&app, "ping", &event, Some(sign(b"{}", "webhook-secret"))).await;
    assert_eq!(forged.status(), 401);

    let signature = sign(&serde_json::to_vec(&event).unwrap(), "webhook-secret");
    let signed = post_event(&app, "ping", &event, Some(signature)).await;
    assert_eq!(signed.status(), 200);
    let body: Value = signed.json().await.unwrap();
    assert_eq!(body["reason"], "unsupported_event");
}

#[tokio::test]
async fn test_malformed_payload_is_rejected() {
    let app = spawn_app(Environment::Test, None).await;
    let response = post_event(&app, "push", &json!({ "ref": 5 }), None).await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_push_submits_commits_with_issue_keys() {
    let app = spawn_app(Environment::Test, None).await;
    app.connect().await;

    Mock::given(method("POST"))
        .and(path("/rest/devinfo/0.10/bulk"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&app.jira)
        .await;

    let event = json!({
        "ref": "refs/heads/main",
        "repository": repository(),
        "installation": { "id": INSTALLATION_ID },
        "commits": [
            {
                "id": "1111111111111111",
                "message": "ABC-9 wire up login",
                "timestamp": "2024-05-01T10:00:00Z",
                "url": "https://github.com/octo-org/repo/commit/1111111111111111",
                "author": { "name": "Octo Cat", "email": "octo@example.com" },
                "added": ["a.rs"],
                "modified": ["b.rs", "c.rs"]
            },
            {
                "id": "2222222222222222",
                "message": "formatting",
                "timestamp": "2024-05-01T10:05:00Z",
                "url": "https://github.com/octo-org/repo/commit/2222222222222222",
                "author": { "name": "Octo Cat" }
            }
        ]
    });

    let response = post_event(&app, "push", &event, None).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["submitted"], 1);

    let requests = app.jira.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let commits = sent["repositories"][0]["commits"].as_array().unwrap();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0]["fileCount"], 3);
    assert_eq!(commits[0]["displayId"], "111111");
}

#[tokio::test]
async fn test_delete_removes_branch_from_jira() {
    let app = spawn_app(Environment::Test, None).await;
    app.connect().await;

    Mock::given(method("DELETE"))
        .and(path_regex(r"^/rest/devinfo/0\.10/repository/1001/branch/.+$"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&app.jira)
        .await;

    let event = json!({
        "ref": "feature/abc-1",
        "ref_type": "branch",
        "repository": repository(),
        "installation": { "id": INSTALLATION_ID }
    });
    let response = post_event(&app, "delete", &event, None).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["submitted"], 1);

    let requests = app.jira.received_requests().await.unwrap();
    assert!(requests[0]
        .url
        .path()
        .ends_with("/branch/~666561747572652f6162632d31"));
}

#[tokio::test]
async fn test_failing_site_does_not_block_others() {
    let app = spawn_app(Environment::Test, None).await;
    app.connect().await;
    mock_pull_request_lookups(&app.github).await;

    // A second site that rejects everything.
    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken)
        .await;
    app.state
        .store
        .upsert_jira_installation(jira_bridge::store::JiraInstallation {
            base_url: broken.uri(),
            client_key: "broken".to_string(),
            shared_secret: "broken-secret".to_string(),
        })
        .await;
    app.state
        .store
        .install_subscription(INSTALLATION_ID, &broken.uri())
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/devinfo/0.10/bulk"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&app.jira)
        .await;

    let response = post_event(
        &app,
        "pull_request_review",
        &pull_request_event("ABC-5 review me", "abc-5"),
        None,
    )
    .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["submitted"], 1);
    assert_eq!(body["failed"], 1);
}

#[tokio::test]
async fn test_installation_deleted_removes_connections() {
    let app = spawn_app(Environment::Test, None).await;
    app.connect().await;

    let event = json!({
        "action": "deleted",
        "installation": { "id": INSTALLATION_ID }
    });
    let response = post_event(&app, "installation", &event, None).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["removed"], 1);
    assert!(app
        .state
        .store
        .subscriptions_for_installation(INSTALLATION_ID)
        .await
        .is_empty());
}

#[tokio::test]
async fn test_request_metrics_are_recorded() {
    let app = spawn_app(Environment::Test, None).await;
    let response = post_event(&app, "ping", &json!({}), None).await;
    assert_eq!(response.status(), 200);

    let recorded = app.statsd.recorded();
    assert!(recorded
        .iter()
        .any(|line| line.starts_with("jira_bridge.http.post./github/events.response_time:")));
    assert!(recorded
        .iter()
        .any(|line| line.starts_with("jira_bridge.http.post./github/events.status_code.200:1|c")));
}

#[tokio::test]
async fn test_review_by_deleted_account_is_skipped() {
    let app = spawn_app(Environment::Test, None).await;
    app.connect().await;

    Mock::given(method("GET"))
        .and(path("/users/octocat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user("octocat")))
        .mount(&app.github)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo-org/repo/pulls/7/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "user": null, "state": "APPROVED", "submitted_at": "2024-05-01T11:00:00Z" },
            { "user": user("alice"), "state": "COMMENTED", "submitted_at": "2024-05-01T09:00:00Z" }
        ])))
        .mount(&app.github)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/devinfo/0.10/bulk"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&app.jira)
        .await;

    let response = post_event(
        &app,
        "pull_request",
        &pull_request_event("ABC-77 ghost review", "abc-77"),
        None,
    )
    .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "processed");

    let requests = app.jira.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let reviewers = sent["repositories"][0]["pullRequests"][0]["reviewers"]
        .as_array()
        .unwrap();
    assert_eq!(reviewers.len(), 1);
    assert_eq!(reviewers[0]["name"], "alice");
}

#[tokio::test]
async fn test_unreadable_author_profile_falls_back_to_payload() {
    let app = spawn_app(Environment::Test, None).await;
    app.connect().await;

    Mock::given(method("GET"))
        .and(path("/users/octocat"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&app.github)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo-org/repo/pulls/7/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&app.github)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/devinfo/0.10/bulk"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&app.jira)
        .await;

    let response = post_event(
        &app,
        "pull_request",
        &pull_request_event("ABC-78 orphaned", "abc-78"),
        None,
    )
    .await;
    assert_eq!(response.status(), 200);

    let requests = app.jira.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let author = &sent["repositories"][0]["pullRequests"][0]["author"];
    assert_eq!(author["name"], "octocat");
    assert_eq!(author["avatar"], "https://avatars.test/octocat");
}

#[tokio::test]
async fn test_create_branch_is_submitted_to_jira() {
    let app = spawn_app(Environment::Test, None).await;
    app.connect().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo-org/repo/commits/feature/abc-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "3333333333333333",
            "html_url": "https://github.com/octo-org/repo/commit/3333333333333333",
            "commit": {
                "message": "start work",
                "author": {
                    "name": "Octo Cat",
                    "email": "octo@example.com",
                    "date": "2024-05-02T08:00:00Z"
                }
            },
            "files": [{ "filename": "a.rs" }]
        })))
        .expect(1)
        .mount(&app.github)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/devinfo/0.10/bulk"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&app.jira)
        .await;

    let event = json!({
        "ref": "feature/abc-7",
        "ref_type": "branch",
        "repository": repository(),
        "installation": { "id": INSTALLATION_ID }
    });
    let response = post_event(&app, "create", &event, None).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["submitted"], 1);

    let requests = app.jira.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let branch = &sent["repositories"][0]["branches"][0];
    assert_eq!(branch["name"], "feature/abc-7");
    assert_eq!(branch["issueKeys"], json!(["ABC-7"]));
    assert_eq!(branch["lastCommit"]["hash"], "3333333333333333");
    assert_eq!(
        branch["createPullRequestUrl"],
        "https://github.com/octo-org/repo/pull/new/feature/abc-7"
    );
}

#[tokio::test]
async fn test_create_tag_is_ignored() {
    let app = spawn_app(Environment::Test, None).await;
    app.connect().await;

    let event = json!({
        "ref": "v1.0.0",
        "ref_type": "tag",
        "repository": repository(),
        "installation": { "id": INSTALLATION_ID }
    });
    let response = post_event(&app, "create", &event, None).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["reason"], "not_a_branch");
}
