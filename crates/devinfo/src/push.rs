//! Push transform.

use tracing::debug;

use crate::display_id;
use crate::issue_keys::parse_issue_keys;
use crate::model::{Commit, CommitAuthor, DevInfoRepository, PushEvent};

/// Jira rejects more commits than this in one repository document.
pub const MAX_COMMITS_PER_REPOSITORY: usize = 400;

/// Transform a push into a Jira repository document of commits.
///
/// Only commits whose message references an issue are kept. When the push is
/// larger than Jira accepts, the most recent commits win.
#[must_use]
pub fn transform_push(event: &PushEvent, update_sequence_id: i64) -> Option<DevInfoRepository> {
    let mut commits: Vec<Commit> = event
        .commits
        .iter()
        .filter_map(|commit| {
            let issue_keys = parse_issue_keys(&commit.message);
            if issue_keys.is_empty() {
                return None;
            }
            Some(Commit {
                author: CommitAuthor {
                    name: commit.author.name.clone(),
                    email: commit.author.email.clone(),
                },
                author_timestamp: commit.timestamp,
                display_id: display_id(&commit.id),
                file_count: commit.added.len() + commit.removed.len() + commit.modified.len(),
                hash: commit.id.clone(),
                id: commit.id.clone(),
                issue_keys,
                message: commit.message.clone(),
                url: commit.url.clone(),
                update_sequence_id,
            })
        })
        .collect();

    if commits.is_empty() {
        return None;
    }

    if commits.len() > MAX_COMMITS_PER_REPOSITORY {
        debug!(
            total = commits.len(),
            kept = MAX_COMMITS_PER_REPOSITORY,
            "Truncating push to most recent commits"
        );
        let excess = commits.len() - MAX_COMMITS_PER_REPOSITORY;
        commits.drain(..excess);
    }

    let mut repo = DevInfoRepository::for_repository(&event.repository, update_sequence_id);
    repo.commits = commits;
    Some(repo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn commit(id: &str, message: &str) -> Value {
        json!({
            "id": id,
            "message": message,
            "timestamp": "2024-05-05T12:00:00Z",
            "url": format!("https://github.com/org/repo/commit/{id}"),
            "author": { "name": "Dev", "email": "dev@example.com" },
            "added": ["new.rs"],
            "removed": [],
            "modified": ["lib.rs", "main.rs"]
        })
    }

    fn push(commits: Vec<Value>) -> PushEvent {
        serde_json::from_value(json!({
            "ref": "refs/heads/main",
            "commits": commits,
            "repository": {
                "id": 3,
                "name": "repo",
                "full_name": "org/repo",
                "html_url": "https://github.com/org/repo",
                "owner": { "login": "org" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_transform_push_keeps_referencing_commits() {
        let event = push(vec![
            commit("aaaaaaaaaa", "TEST-1 first"),
            commit("bbbbbbbbbb", "no reference"),
            commit("cccccccccc", "fix TEST-2 and TEST-3"),
        ]);

        let repo = transform_push(&event, 10).expect("commits reference issues");

        assert_eq!(repo.commits.len(), 2);
        assert_eq!(repo.commits[0].display_id, "aaaaaa");
        assert_eq!(repo.commits[0].file_count, 3);
        assert_eq!(repo.commits[1].issue_keys, vec!["TEST-2", "TEST-3"]);
        assert!(repo.branches.is_empty());
    }

    #[test]
    fn test_transform_push_without_references() {
        let event = push(vec![commit("aaaaaaaaaa", "chore")]);
        assert!(transform_push(&event, 10).is_none());
    }

    #[test]
    fn test_transform_push_truncates_to_latest() {
        let commits = (0..MAX_COMMITS_PER_REPOSITORY + 5)
            .map(|i| commit(&format!("{i:010}"), "TEST-1"))
            .collect();
        let repo = transform_push(&push(commits), 1).unwrap();

        assert_eq!(repo.commits.len(), MAX_COMMITS_PER_REPOSITORY);
        assert_eq!(repo.commits[0].id, format!("{:010}", 5));
    }
}
