//! In-memory registry of Jira sites and GitHub connections.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A Jira site that installed the Connect app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JiraInstallation {
    /// Site base URL (`https://example.atlassian.net`)
    pub base_url: String,
    /// Connect client key
    pub client_key: String,
    /// Shared secret for JWT signing
    pub shared_secret: String,
}

/// Progress of the initial backfill for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Pending,
    Active,
    Complete,
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A GitHub installation connected to a Jira site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub installation_id: u64,
    pub jira_host: String,
    pub sync_status: SyncStatus,
    pub synced_repos: usize,
    pub total_repos: Option<usize>,
}

#[derive(Default)]
struct StoreInner {
    /// Keyed by base URL
    jira_installations: HashMap<String, JiraInstallation>,
    /// Keyed by (installation, Jira host)
    subscriptions: BTreeMap<(u64, String), Subscription>,
}

/// Shared store handle.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<StoreInner>>,
}

/// Jira hosts are compared without a trailing slash.
fn normalize_host(host: &str) -> String {
    host.trim_end_matches('/').to_string()
}

impl Store {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Jira installations
    // =========================================================================

    /// Record (or refresh) a Jira site installation.
    pub async fn upsert_jira_installation(&self, installation: JiraInstallation) {
        let mut inner = self.inner.write().await;
        let host = normalize_host(&installation.base_url);
        inner.jira_installations.insert(
            host.clone(),
            JiraInstallation {
                base_url: host,
                ..installation
            },
        );
    }

    /// Remove a Jira site and every connection to it.
    pub async fn remove_jira_installation(&self, client_key: &str) -> Option<JiraInstallation> {
        let mut inner = self.inner.write().await;
        let host = inner
            .jira_installations
            .values()
            .find(|i| i.client_key == client_key)
            .map(|i| i.base_url.clone())?;

        inner.subscriptions.retain(|(_, h), _| *h != host);
        inner.jira_installations.remove(&host)
    }

    /// Look up a Jira site by base URL.
    pub async fn jira_installation(&self, host: &str) -> Option<JiraInstallation> {
        self.inner
            .read()
            .await
            .jira_installations
            .get(&normalize_host(host))
            .cloned()
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Connect a GitHub installation to a Jira site.
    ///
    /// Reconnecting an existing pair resets its sync state.
    pub async fn install_subscription(&self, installation_id: u64, jira_host: &str) -> Subscription {
        let host = normalize_host(jira_host);
        let subscription = Subscription {
            installation_id,
            jira_host: host.clone(),
            sync_status: SyncStatus::Pending,
            synced_repos: 0,
            total_repos: None,
        };

        self.inner
            .write()
            .await
            .subscriptions
            .insert((installation_id, host), subscription.clone());
        subscription
    }

    /// Disconnect a GitHub installation from a Jira site.
    pub async fn remove_subscription(
        &self,
        installation_id: u64,
        jira_host: &str,
    ) -> Option<Subscription> {
        self.inner
            .write()
            .await
            .subscriptions
            .remove(&(installation_id, normalize_host(jira_host)))
    }

    /// Look up one connection.
    pub async fn subscription(&self, installation_id: u64, jira_host: &str) -> Option<Subscription> {
        self.inner
            .read()
            .await
            .subscriptions
            .get(&(installation_id, normalize_host(jira_host)))
            .cloned()
    }

    /// All Jira sites connected to a GitHub installation.
    pub async fn subscriptions_for_installation(&self, installation_id: u64) -> Vec<Subscription> {
        self.inner
            .read()
            .await
            .subscriptions
            .range((installation_id, String::new())..)
            .take_while(|((id, _), _)| *id == installation_id)
            .map(|(_, s)| s.clone())
            .collect()
    }

    /// All GitHub installations connected to a Jira site.
    pub async fn subscriptions_for_host(&self, jira_host: &str) -> Vec<Subscription> {
        let host = normalize_host(jira_host);
        self.inner
            .read()
            .await
            .subscriptions
            .values()
            .filter(|s| s.jira_host == host)
            .cloned()
            .collect()
    }

    /// Update sync state; returns `false` when the connection is gone.
    pub async fn update_sync(
        &self,
        installation_id: u64,
        jira_host: &str,
        f: impl FnOnce(&mut Subscription),
    ) -> bool {
        let mut inner = self.inner.write().await;
        match inner
            .subscriptions
            .get_mut(&(installation_id, normalize_host(jira_host)))
        {
            Some(subscription) => {
                f(subscription);
                true
            }
            None => false,
        }
    }
}
