//! Branch transform for `create` events.

use crate::display_id;
use crate::issue_keys::parse_issue_keys;
use crate::jira_id::jira_id;
use crate::model::{Branch, Commit, CommitAuthor, CommitSummary, CreateEvent, DevInfoRepository};

/// Map a GitHub commit into a Jira commit entity carrying `issue_keys`.
#[must_use]
pub fn transform_commit_summary(
    commit: &CommitSummary,
    issue_keys: Vec<String>,
    update_sequence_id: i64,
) -> Commit {
    Commit {
        author: CommitAuthor {
            name: commit.commit.author.name.clone(),
            email: commit.commit.author.email.clone(),
        },
        author_timestamp: commit.commit.author.date,
        display_id: display_id(&commit.sha),
        file_count: commit.files.len(),
        hash: commit.sha.clone(),
        id: commit.sha.clone(),
        issue_keys,
        message: commit.commit.message.clone(),
        url: commit.html_url.clone(),
        update_sequence_id,
    }
}

/// Transform a newly created branch into a Jira repository document.
///
/// Tags are ignored. Issue keys come from the branch name and the message of
/// its head commit.
#[must_use]
pub fn transform_branch(
    event: &CreateEvent,
    last_commit: &CommitSummary,
    update_sequence_id: i64,
) -> Option<DevInfoRepository> {
    if event.ref_type != "branch" {
        return None;
    }

    let issue_keys = parse_issue_keys(&format!(
        "{}\n{}",
        event.ref_name, last_commit.commit.message
    ));
    if issue_keys.is_empty() {
        return None;
    }

    let repository = &event.repository;
    let mut repo = DevInfoRepository::for_repository(repository, update_sequence_id);
    repo.branches.push(Branch {
        create_pull_request_url: format!(
            "{}/pull/new/{}",
            repository.html_url, event.ref_name
        ),
        last_commit: transform_commit_summary(last_commit, issue_keys.clone(), update_sequence_id),
        id: jira_id(&event.ref_name),
        issue_keys,
        name: event.ref_name.clone(),
        url: format!("{}/tree/{}", repository.html_url, event.ref_name),
        update_sequence_id,
    });

    Some(repo)
}
