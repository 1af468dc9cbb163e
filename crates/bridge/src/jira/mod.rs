//! Jira Connect: request signing, lifecycle callbacks and the dev-info client.

pub mod auth;
pub mod client;
pub mod lifecycle;

pub use client::JiraClient;
