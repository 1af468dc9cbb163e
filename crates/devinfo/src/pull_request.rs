//! Pull request transform.
//!
//! Maps a GitHub pull request and its reviews into a Jira repository document
//! carrying one branch and one pull request.

use std::collections::HashMap;

use crate::issue_keys::parse_issue_keys;
use crate::jira_id::jira_id;
use crate::model::{
    ApprovalStatus, Branch, Commit, CommitAuthor, DevInfoRepository, PullRequest,
    PullRequestAuthor, PullRequestInfo, PullRequestStatus, Repository, Review, Reviewer, User,
};
use crate::display_id;

/// Map GitHub's state/merged pair to a Jira pull request status.
#[must_use]
pub fn map_status(state: &str, merged: bool) -> PullRequestStatus {
    match state {
        "merged" => PullRequestStatus::Merged,
        "open" => PullRequestStatus::Open,
        "closed" if merged => PullRequestStatus::Merged,
        "closed" => PullRequestStatus::Declined,
        _ => PullRequestStatus::Unknown,
    }
}

/// Reduce reviews to one reviewer per user.
///
/// Reviews are walked newest first; the first review seen for a user fixes
/// their position, and any `APPROVED` review marks them approved. Reviews
/// left by deleted accounts have no user and are skipped.
#[must_use]
pub fn map_reviews(reviews: &[Review]) -> Vec<Reviewer> {
    let mut sorted: Vec<&Review> = reviews.iter().collect();
    // Stable sort; reviews without a submission time go last.
    sorted.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));

    let mut reviewers: Vec<Reviewer> = Vec::new();
    let mut index_by_login: HashMap<&str, usize> = HashMap::new();

    for review in sorted {
        let Some(user) = &review.user else {
            continue;
        };
        let approved = review.state == "APPROVED";
        match index_by_login.get(user.login.as_str()) {
            Some(&idx) => {
                if approved {
                    reviewers[idx].approval_status = ApprovalStatus::Approved;
                }
            }
            None => {
                index_by_login.insert(user.login.as_str(), reviewers.len());
                reviewers.push(Reviewer {
                    name: user.login.clone(),
                    approval_status: if approved {
                        ApprovalStatus::Approved
                    } else {
                        ApprovalStatus::Unapproved
                    },
                    url: user.html_url.clone(),
                    avatar: user.avatar_url.clone(),
                });
            }
        }
    }

    reviewers
}

/// Transform a pull request into a Jira repository document.
///
/// Returns `None` when neither the title nor the source branch references an
/// issue, or when the source repository no longer exists.
#[must_use]
pub fn transform_pull_request(
    pull_request: &PullRequest,
    repository: &Repository,
    author: &User,
    reviews: &[Review],
    update_sequence_id: i64,
) -> Option<DevInfoRepository> {
    let head = &pull_request.head;
    let issue_keys = parse_issue_keys(&format!("{}\n{}", pull_request.title, head.ref_name));

    if issue_keys.is_empty() {
        return None;
    }
    let head_repo = head.repo.as_ref()?;

    let status = map_status(&pull_request.state, pull_request.is_merged());
    let base_url = pull_request
        .base
        .repo
        .as_ref()
        .map_or(repository.html_url.as_str(), |r| r.html_url.as_str());
    let source_branch_url = format!("{}/tree/{}", head_repo.html_url, head.ref_name);

    let mut repo = DevInfoRepository::for_repository(repository, update_sequence_id);

    // A merged PR may race with GitHub auto-deleting its head branch; sending
    // the branch again would resurrect it in Jira.
    if status != PullRequestStatus::Merged {
        repo.branches.push(Branch {
            create_pull_request_url: format!("{}/pull/new/{}", head_repo.html_url, head.ref_name),
            last_commit: Commit {
                author: CommitAuthor {
                    name: author.login.clone(),
                    email: None,
                },
                author_timestamp: pull_request.updated_at,
                display_id: display_id(&head.sha),
                file_count: 0,
                hash: head.sha.clone(),
                id: head.sha.clone(),
                issue_keys: issue_keys.clone(),
                message: "n/a".to_string(),
                url: format!("{}/commit/{}", head_repo.html_url, head.sha),
                update_sequence_id,
            },
            id: jira_id(&head.ref_name),
            issue_keys: issue_keys.clone(),
            name: head.ref_name.clone(),
            url: source_branch_url.clone(),
            update_sequence_id,
        });
    }

    repo.pull_requests.push(PullRequestInfo {
        author: PullRequestAuthor {
            avatar: author.avatar_url.clone(),
            name: author.login.clone(),
            url: author.html_url.clone(),
        },
        comment_count: pull_request.comments,
        destination_branch: format!("{base_url}/tree/{}", pull_request.base.ref_name),
        display_id: format!("#{}", pull_request.number),
        id: pull_request.number,
        issue_keys,
        last_update: pull_request.updated_at,
        reviewers: map_reviews(reviews),
        source_branch: head.ref_name.clone(),
        source_branch_url,
        status,
        timestamp: pull_request.updated_at,
        title: pull_request.title.clone(),
        url: pull_request.html_url.clone(),
        update_sequence_id,
    });

    Some(repo)
}
