//! GitHub App, REST and OAuth clients.

pub mod app;
pub mod client;
pub mod oauth;

pub use app::GitHubApp;
pub use client::{AppInfo, GitHubClient, InstallationInfo, OrgMembership};
pub use oauth::OAuthClient;
