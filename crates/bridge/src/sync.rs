//! Backfill of existing pull requests for a new connection.
//!
//! Jobs are queued by the configuration pages and processed one at a time
//! by a background task. Progress is written to the store as each
//! repository finishes so the Jira configuration page can show it.

use anyhow::{anyhow, Context, Result};
use devinfo::{transform_pull_request, DevInfoRepository, Repository, User};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::github::GitHubClient;
use crate::metrics::timed;
use crate::server::AppState;
use crate::store::SyncStatus;
use crate::webhooks::update_sequence_id;

/// One connection to backfill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub installation_id: u64,
    pub jira_host: String,
}

/// Handle for queueing sync jobs.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    tx: mpsc::UnboundedSender<SyncJob>,
}

impl SyncQueue {
    /// Create a queue and the receiver the worker drains.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a job.
    pub fn enqueue(&self, job: SyncJob) -> Result<()> {
        debug!(installation_id = job.installation_id, jira_host = %job.jira_host, "Queueing sync");
        self.tx
            .send(job)
            .map_err(|_| anyhow!("Sync worker is not running"))
    }
}

/// Start the worker. It stops once every queue handle is dropped.
pub fn spawn_worker(state: AppState, mut rx: mpsc::UnboundedReceiver<SyncJob>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Sync worker started");
        while let Some(job) = rx.recv().await {
            let tags = [format!("installation_id:{}", job.installation_id)];
            let result = timed(&state.statsd, "sync.duration", &tags, run_sync(&state, &job)).await;

            let status = match result {
                Ok(()) => SyncStatus::Complete,
                Err(e) => {
                    error!(
                        installation_id = job.installation_id,
                        jira_host = %job.jira_host,
                        error = %format!("{e:#}"),
                        "Sync failed"
                    );
                    SyncStatus::Failed
                }
            };
            state
                .store
                .update_sync(job.installation_id, &job.jira_host, |s| s.sync_status = status)
                .await;
            state
                .statsd
                .increment("sync.finished", &[format!("status:{status}")]);
        }
        info!("Sync worker stopped");
    })
}

/// Backfill every repository of the installation into the Jira site.
pub async fn run_sync(state: &AppState, job: &SyncJob) -> Result<()> {
    let started = state
        .store
        .update_sync(job.installation_id, &job.jira_host, |s| {
            s.sync_status = SyncStatus::Active;
            s.synced_repos = 0;
        })
        .await;
    if !started {
        warn!(installation_id = job.installation_id, jira_host = %job.jira_host, "Connection removed before sync started");
        return Ok(());
    }

    let jira = state
        .jira_client(&job.jira_host)
        .await
        .with_context(|| format!("Jira site {} is not installed", job.jira_host))?;
    let github = state.github.installation_client(job.installation_id).await?;

    let repositories = github.list_installation_repositories().await?;
    info!(
        installation_id = job.installation_id,
        repositories = repositories.len(),
        "Starting sync"
    );
    state
        .store
        .update_sync(job.installation_id, &job.jira_host, |s| {
            s.total_repos = Some(repositories.len());
        })
        .await;

    let mut authors: HashMap<String, User> = HashMap::new();
    for (done, repository) in repositories.iter().enumerate() {
        if let Some(data) = repository_document(&github, repository, &mut authors).await? {
            jira.submit_dev_info(&[data], job.installation_id).await?;
        }

        let still_connected = state
            .store
            .update_sync(job.installation_id, &job.jira_host, |s| {
                s.synced_repos = done + 1;
            })
            .await;
        if !still_connected {
            info!(installation_id = job.installation_id, "Connection removed, stopping sync");
            return Ok(());
        }
    }

    info!(installation_id = job.installation_id, jira_host = %job.jira_host, "Sync complete");
    Ok(())
}

/// Every pull request of a repository that references an issue, merged
/// into one document.
async fn repository_document(
    github: &GitHubClient,
    repository: &Repository,
    authors: &mut HashMap<String, User>,
) -> Result<Option<DevInfoRepository>> {
    let owner = repository.owner_login();
    let pull_requests = github.list_pull_requests(owner, &repository.name).await?;
    let sequence = update_sequence_id();

    let mut document: Option<DevInfoRepository> = None;
    let mut branch_ids: HashSet<String> = HashSet::new();

    for pull_request in &pull_requests {
        let author = match authors.get(&pull_request.user.login) {
            Some(author) => author.clone(),
            None => {
                let author = github.pull_request_author(&pull_request.user).await;
                authors.insert(pull_request.user.login.clone(), author.clone());
                author
            }
        };
        let reviews = github
            .list_pull_request_reviews(owner, &repository.name, pull_request.number)
            .await?;

        let Some(data) =
            transform_pull_request(pull_request, repository, &author, &reviews, sequence)
        else {
            continue;
        };

        let merged = document
            .get_or_insert_with(|| DevInfoRepository::for_repository(repository, sequence));
        for branch in data.branches {
            if branch_ids.insert(branch.id.clone()) {
                merged.branches.push(branch);
            }
        }
        merged.pull_requests.extend(data.pull_requests);
    }

    debug!(
        repo = %repository.full_name,
        pull_requests = pull_requests.len(),
        linked = document.as_ref().map_or(0, |d| d.pull_requests.len()),
        "Built repository document"
    );
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_delivers_job() {
        let (queue, mut rx) = SyncQueue::new();
        let job = SyncJob {
            installation_id: 1,
            jira_host: "https://a.atlassian.net".to_string(),
        };
        queue.enqueue(job.clone()).unwrap();
        assert_eq!(rx.recv().await, Some(job));
    }

    #[tokio::test]
    async fn test_enqueue_without_worker_fails() {
        let (queue, rx) = SyncQueue::new();
        drop(rx);
        let result = queue.enqueue(SyncJob {
            installation_id: 1,
            jira_host: "https://a.atlassian.net".to_string(),
        });
        assert!(result.is_err());
    }
}
