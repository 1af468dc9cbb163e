//! GitHub to Jira bridge service.
//!
//! This crate provides:
//! - GitHub webhook handling that relays pull requests, branches and commits
//!   into Jira's development information API
//! - Jira Connect lifecycle handling and request signing
//! - A configuration web app (GitHub OAuth login, installation management,
//!   CSRF-protected forms, signed cookie sessions)
//! - Statsd request and timing instrumentation
//! - A background worker that backfills pull requests for new connections

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Most handlers and API calls can fail

pub mod config;
pub mod csrf;
pub mod error;
pub mod frontend;
pub mod github;
pub mod jira;
pub mod metrics;
pub mod server;
pub mod session;
pub mod store;
pub mod sync;
pub mod templates;
pub mod webhooks;

pub use config::{Config, Environment};
pub use error::AppError;
pub use metrics::Statsd;
pub use server::{build_router, AppState};
pub use store::Store;
