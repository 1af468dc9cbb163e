//! GitHub payload types and Jira development information types.
//!
//! GitHub types are deserialised from webhook bodies and REST responses, so
//! every field the bridge does not need is simply ignored. Jira types mirror
//! the dev-info bulk API (camelCase JSON).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =========================================================================
// GitHub
// =========================================================================

/// GitHub App installation reference carried by webhook payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Installation {
    /// Installation ID
    pub id: u64,
}

/// GitHub user (also used for organisations as repository owners).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    /// User login
    pub login: String,
    /// Avatar image URL
    #[serde(default)]
    pub avatar_url: String,
    /// Profile URL
    #[serde(default)]
    pub html_url: String,
    /// Display name (only present on `GET /users/{login}`)
    #[serde(default)]
    pub name: Option<String>,
    /// Account type (`User` or `Organization`)
    #[serde(default, rename = "type")]
    pub account_type: Option<String>,
}

/// Minimal repository reference embedded in git refs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RepoRef {
    /// Repository ID
    #[serde(default)]
    pub id: u64,
    /// Full name (org/repo)
    #[serde(default)]
    pub full_name: String,
    /// HTML URL
    pub html_url: String,
}

/// GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Repository {
    /// Repository ID
    pub id: u64,
    /// Repository name
    pub name: String,
    /// Full name (org/repo)
    pub full_name: String,
    /// HTML URL
    pub html_url: String,
    /// Repository owner
    pub owner: User,
}

impl Repository {
    /// Owner login, used to build API paths.
    #[must_use]
    pub fn owner_login(&self) -> &str {
        &self.owner.login
    }
}

/// Git reference (branch) on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GitRef {
    /// Branch name
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Head commit SHA
    pub sha: String,
    /// Repository the branch lives in (`null` when a fork was deleted)
    #[serde(default)]
    pub repo: Option<RepoRef>,
}

/// GitHub pull request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PullRequest {
    /// PR number
    pub number: u64,
    /// PR title
    pub title: String,
    /// PR state (`open`, `closed`)
    pub state: String,
    /// Whether PR was merged
    #[serde(default)]
    pub merged: bool,
    /// Merge timestamp; list endpoints report merges only through this field
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    /// Number of issue comments
    #[serde(default)]
    pub comments: u64,
    /// PR HTML URL
    pub html_url: String,
    /// Last update time
    pub updated_at: DateTime<Utc>,
    /// Source branch
    pub head: GitRef,
    /// Target branch
    pub base: GitRef,
    /// PR author
    pub user: User,
}

impl PullRequest {
    /// Whether the pull request was merged, from either payload shape.
    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.merged || self.merged_at.is_some()
    }
}

/// `pull_request` and `pull_request_review` webhook payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PullRequestEvent {
    /// Action type (opened, closed, submitted, ...)
    pub action: String,
    /// Pull request details
    pub pull_request: PullRequest,
    /// Repository info
    pub repository: Repository,
    /// Installation that delivered the event
    #[serde(default)]
    pub installation: Option<Installation>,
}

/// Pull request review.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Review {
    /// Reviewer; `null` when the account has been deleted
    #[serde(default)]
    pub user: Option<User>,
    /// Review state (`APPROVED`, `CHANGES_REQUESTED`, `COMMENTED`, ...)
    pub state: String,
    /// Submission time (absent on pending reviews)
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

/// `create` webhook payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateEvent {
    /// Created ref name
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// `branch` or `tag`
    pub ref_type: String,
    /// Repository info
    pub repository: Repository,
    /// Installation that delivered the event
    #[serde(default)]
    pub installation: Option<Installation>,
}

/// `delete` webhook payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeleteEvent {
    /// Deleted ref name
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// `branch` or `tag`
    pub ref_type: String,
    /// Repository info
    pub repository: Repository,
    /// Installation that delivered the event
    #[serde(default)]
    pub installation: Option<Installation>,
}

/// Commit author as reported in push payloads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GitAuthor {
    /// Author name
    pub name: String,
    /// Author email
    #[serde(default)]
    pub email: Option<String>,
}

/// Commit inside a `push` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PushCommit {
    /// Commit SHA
    pub id: String,
    /// Commit message
    pub message: String,
    /// Commit time
    pub timestamp: DateTime<Utc>,
    /// Commit URL
    pub url: String,
    /// Commit author
    pub author: GitAuthor,
    /// Added files
    #[serde(default)]
    pub added: Vec<String>,
    /// Removed files
    #[serde(default)]
    pub removed: Vec<String>,
    /// Modified files
    #[serde(default)]
    pub modified: Vec<String>,
}

/// `push` webhook payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushEvent {
    /// Pushed ref (`refs/heads/main`)
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Pushed commits, oldest first
    #[serde(default)]
    pub commits: Vec<PushCommit>,
    /// Repository info
    pub repository: Repository,
    /// Installation that delivered the event
    #[serde(default)]
    pub installation: Option<Installation>,
}

/// Commit as returned by `GET /repos/{owner}/{repo}/commits/{ref}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommitSummary {
    /// Commit SHA
    pub sha: String,
    /// Commit HTML URL
    pub html_url: String,
    /// Git commit data
    pub commit: CommitDetail,
    /// Changed files
    #[serde(default)]
    pub files: Vec<serde_json::Value>,
}

/// Git data of a [`CommitSummary`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommitDetail {
    /// Commit message
    pub message: String,
    /// Author identity and date
    pub author: CommitDetailAuthor,
}

/// Author of a [`CommitDetail`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommitDetailAuthor {
    /// Author name
    pub name: String,
    /// Author email
    #[serde(default)]
    pub email: Option<String>,
    /// Authoring time
    pub date: DateTime<Utc>,
}

// =========================================================================
// Jira development information
// =========================================================================

/// Pull request status understood by the Jira development panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PullRequestStatus {
    /// Open pull request
    Open,
    /// Merged pull request
    Merged,
    /// Closed without merging
    Declined,
    /// Anything GitHub reports that maps to none of the above
    Unknown,
}

/// Reviewer approval state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    /// At least one approving review
    Approved,
    /// No approving review
    Unapproved,
}

/// Commit author in Jira's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    /// Author name
    pub name: String,
    /// Author email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Commit entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub author: CommitAuthor,
    pub author_timestamp: DateTime<Utc>,
    pub display_id: String,
    pub file_count: usize,
    pub hash: String,
    pub id: String,
    pub issue_keys: Vec<String>,
    pub message: String,
    pub url: String,
    pub update_sequence_id: i64,
}

/// Branch entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub create_pull_request_url: String,
    pub last_commit: Commit,
    pub id: String,
    pub issue_keys: Vec<String>,
    pub name: String,
    pub url: String,
    pub update_sequence_id: i64,
}

/// Pull request author in Jira's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestAuthor {
    pub avatar: String,
    pub name: String,
    pub url: String,
}

/// De-duplicated reviewer shown on the development panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reviewer {
    pub name: String,
    pub approval_status: ApprovalStatus,
    pub url: String,
    pub avatar: String,
}

/// Pull request entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestInfo {
    pub author: PullRequestAuthor,
    pub comment_count: u64,
    pub destination_branch: String,
    pub display_id: String,
    pub id: u64,
    pub issue_keys: Vec<String>,
    pub last_update: DateTime<Utc>,
    pub reviewers: Vec<Reviewer>,
    pub source_branch: String,
    pub source_branch_url: String,
    pub status: PullRequestStatus,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub url: String,
    pub update_sequence_id: i64,
}

/// Repository document submitted to the dev-info bulk endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevInfoRepository {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<Branch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pull_requests: Vec<PullRequestInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commits: Vec<Commit>,
    pub update_sequence_id: i64,
}

impl DevInfoRepository {
    /// Empty document for a GitHub repository.
    #[must_use]
    pub fn for_repository(repository: &Repository, update_sequence_id: i64) -> Self {
        Self {
            id: repository.id.to_string(),
            name: repository.full_name.clone(),
            url: repository.html_url.clone(),
            branches: Vec::new(),
            pull_requests: Vec::new(),
            commits: Vec::new(),
            update_sequence_id,
        }
    }
}
