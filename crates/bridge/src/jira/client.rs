//! Jira development information API client.

use anyhow::{anyhow, Context, Result};
use devinfo::DevInfoRepository;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;
use tracing::{debug, info};

use super::auth::create_jwt;
use crate::store::JiraInstallation;

const DEVINFO_PATH: &str = "/rest/devinfo/0.10";

/// Client for one Jira site.
#[derive(Debug, Clone)]
pub struct JiraClient {
    http: reqwest::Client,
    base_url: String,
    app_key: String,
    shared_secret: String,
}

impl JiraClient {
    /// Client for a site, signing as `app_key`.
    #[must_use]
    pub fn new(http: reqwest::Client, installation: &JiraInstallation, app_key: &str) -> Self {
        Self {
            http,
            base_url: installation.base_url.trim_end_matches('/').to_string(),
            app_key: app_key.to_string(),
            shared_secret: installation.shared_secret.clone(),
        }
    }

    fn authorization(&self, method: &str, path_and_query: &str) -> Result<String> {
        let token = create_jwt(&self.app_key, &self.shared_secret, method, path_and_query)?;
        Ok(format!("JWT {token}"))
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<()> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Jira API error {action}: {status} - {body}"));
        }
        Ok(())
    }

    /// Submit repository documents for an installation.
    pub async fn submit_dev_info(
        &self,
        repositories: &[DevInfoRepository],
        installation_id: u64,
    ) -> Result<()> {
        let path = format!("{DEVINFO_PATH}/bulk");
        let body = json!({
            "preventTransitions": false,
            "repositories": repositories,
            "properties": { "installationId": installation_id },
        });

        debug!(
            jira_host = %self.base_url,
            repositories = repositories.len(),
            "Submitting development information"
        );

        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .header(AUTHORIZATION, self.authorization("POST", &path)?)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to send dev-info request")?;

        Self::check(response, "submitting dev-info").await
    }

    /// Delete a branch from a repository document.
    ///
    /// `branch_id` is the encoded branch name.
    pub async fn delete_branch(
        &self,
        repository_id: &str,
        branch_id: &str,
        update_sequence_id: i64,
    ) -> Result<()> {
        let path_and_query = format!(
            "{DEVINFO_PATH}/repository/{}/branch/{}?_updateSequenceId={update_sequence_id}",
            urlencoding::encode(repository_id),
            urlencoding::encode(branch_id)
        );

        let response = self
            .http
            .delete(format!("{}{path_and_query}", self.base_url))
            .header(AUTHORIZATION, self.authorization("DELETE", &path_and_query)?)
            .send()
            .await
            .context("Failed to send delete branch request")?;

        Self::check(response, "deleting branch").await
    }

    /// Delete everything submitted for a GitHub installation.
    pub async fn delete_installation_data(&self, installation_id: u64) -> Result<()> {
        let path_and_query = format!("{DEVINFO_PATH}/bulkByProperties?installationId={installation_id}");

        let response = self
            .http
            .delete(format!("{}{path_and_query}", self.base_url))
            .header(AUTHORIZATION, self.authorization("DELETE", &path_and_query)?)
            .send()
            .await
            .context("Failed to send delete by properties request")?;

        Self::check(response, "deleting installation data").await?;
        info!(jira_host = %self.base_url, installation_id, "Deleted installation data from Jira");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jira::auth::{query_string_hash, verify_jira_jwt};
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn client(url: &str) -> JiraClient {
        let installation = JiraInstallation {
            base_url: url.to_string(),
            client_key: "client".to_string(),
            shared_secret: "shared".to_string(),
        };
        JiraClient::new(reqwest::Client::new(), &installation, "app-key")
    }

    fn jwt_of(request: &Request) -> String {
        request
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("JWT "))
            .unwrap()
            .to_string()
    }

    fn repository() -> DevInfoRepository {
        DevInfoRepository {
            id: "1".to_string(),
            name: "octo/repo".to_string(),
            url: "https://github.com/octo/repo".to_string(),
            branches: Vec::new(),
            pull_requests: Vec::new(),
            commits: Vec::new(),
            update_sequence_id: 7,
        }
    }

    #[tokio::test]
    async fn test_submit_dev_info() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/devinfo/0.10/bulk"))
            .and(body_partial_json(json!({
                "preventTransitions": false,
                "properties": { "installationId": 99 },
                "repositories": [{ "id": "1", "name": "octo/repo" }]
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        client(&server.uri())
            .submit_dev_info(&[repository()], 99)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let claims = verify_jira_jwt(&jwt_of(&requests[0]), "shared").unwrap();
        assert_eq!(claims.iss, "app-key");
        assert_eq!(
            claims.qsh,
            Some(query_string_hash("POST", "/rest/devinfo/0.10/bulk"))
        );
    }

    #[tokio::test]
    async fn test_delete_branch_signs_query() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/devinfo/0.10/repository/1/branch/~666561747572652f61"))
            .and(query_param("_updateSequenceId", "5"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        client(&server.uri())
            .delete_branch("1", "~666561747572652f61", 5)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let claims = verify_jira_jwt(&jwt_of(&requests[0]), "shared").unwrap();
        assert_eq!(
            claims.qsh,
            Some(query_string_hash(
                "DELETE",
                "/rest/devinfo/0.10/repository/1/branch/~666561747572652f61?_updateSequenceId=5"
            ))
        );
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad payload"))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .submit_dev_info(&[repository()], 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad payload"));
    }
}
