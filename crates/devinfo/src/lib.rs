//! GitHub to Jira development information mapping.
//!
//! This crate provides:
//! - Jira issue key extraction from branch names, titles and commit messages
//! - Jira-safe entity id encoding
//! - GitHub payload types and Jira dev-info (development panel) types
//! - Transforms for pull requests, branches and pushes
//!
//! All transforms are pure: they take the GitHub data plus an update sequence
//! id and return the repository document Jira expects, or `None` when nothing
//! in the event references an issue.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod branch;
pub mod issue_keys;
pub mod jira_id;
pub mod model;
pub mod pull_request;
pub mod push;

pub use branch::{transform_branch, transform_commit_summary};
pub use issue_keys::parse_issue_keys;
pub use jira_id::jira_id;
pub use model::*;
pub use pull_request::{map_reviews, map_status, transform_pull_request};
pub use push::transform_push;

/// Number of characters of a commit sha shown in the Jira development panel.
pub const DISPLAY_ID_LEN: usize = 6;

/// Short form of a commit sha for display.
#[must_use]
pub fn display_id(sha: &str) -> String {
    sha.chars().take(DISPLAY_ID_LEN).collect()
}
