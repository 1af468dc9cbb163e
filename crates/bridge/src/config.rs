//! Configuration for the bridge service.

use anyhow::{bail, Result};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Production: errors are rendered as pages and counted.
    Production,
    /// Local development (default).
    #[default]
    Development,
    /// Automated tests: statsd is mocked and CSRF only guards `DELETE`.
    Test,
}

impl Environment {
    /// Whether this is the production environment.
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    /// Whether this is the test environment.
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            other => bail!("Unknown environment: {other}"),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Production => "production",
            Self::Development => "development",
            Self::Test => "test",
        };
        f.write_str(name)
    }
}

/// Bridge service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,
    /// Public base URL of this service.
    pub app_url: String,
    /// Deployment environment.
    pub environment: Environment,
    /// Jira Connect app key.
    pub app_key: String,
    /// GitHub App ID.
    pub github_app_id: Option<u64>,
    /// GitHub App private key (PEM).
    pub github_private_key: Option<String>,
    /// GitHub OAuth client ID.
    pub github_client_id: Option<String>,
    /// GitHub OAuth client secret; also signs session cookies.
    pub github_client_secret: Option<String>,
    /// GitHub webhook secret for signature verification.
    pub webhook_secret: Option<String>,
    /// GitHub REST API base URL.
    pub github_api_url: String,
    /// GitHub web base URL (OAuth endpoints).
    pub github_url: String,
    /// Directory served under `/public`.
    pub static_dir: String,
    /// Statsd configuration.
    pub statsd: StatsdConfig,
}

impl Default for Config {
    fn default() -> Self {
        let environment = env::var("APP_ENV")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            app_url: env::var("APP_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment,
            app_key: env::var("APP_KEY")
                .unwrap_or_else(|_| "com.github.integration.jira-bridge".to_string()),
            github_app_id: env::var("GITHUB_APP_ID").ok().and_then(|s| s.parse().ok()),
            // Keys passed through env files often carry literal "\n" sequences
            github_private_key: env::var("GITHUB_PRIVATE_KEY")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.replace("\\n", "\n")),
            github_client_id: env::var("GITHUB_CLIENT_ID").ok().filter(|s| !s.is_empty()),
            github_client_secret: env::var("GITHUB_CLIENT_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            webhook_secret: env::var("GITHUB_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            github_api_url: env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            github_url: env::var("GITHUB_URL").unwrap_or_else(|_| "https://github.com".to_string()),
            static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string()),
            statsd: StatsdConfig::from_env(environment),
        }
    }
}

impl Config {
    /// Check that everything required to serve traffic is present.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.github_app_id.is_none() {
            missing.push("GITHUB_APP_ID");
        }
        if self.github_private_key.is_none() {
            missing.push("GITHUB_PRIVATE_KEY");
        }
        if self.github_client_id.is_none() {
            missing.push("GITHUB_CLIENT_ID");
        }
        if self.github_client_secret.is_none() {
            missing.push("GITHUB_CLIENT_SECRET");
        }
        if self.environment.is_production() && self.webhook_secret.is_none() {
            missing.push("GITHUB_WEBHOOK_SECRET");
        }

        if !missing.is_empty() {
            bail!("Missing required configuration: {}", missing.join(", "));
        }
        Ok(())
    }

    /// OAuth callback URL registered with GitHub.
    #[must_use]
    pub fn oauth_callback_url(&self) -> String {
        format!("{}/github/callback", self.app_url)
    }
}

/// Statsd configuration.
#[derive(Debug, Clone)]
pub struct StatsdConfig {
    /// Statsd agent host.
    pub host: String,
    /// Statsd agent port.
    pub port: u16,
    /// Prefix prepended to every stat name.
    pub prefix: String,
    /// Buffer metrics in memory instead of sending them.
    pub mock: bool,
    /// Tags attached to every metric.
    pub global_tags: GlobalTags,
}

impl StatsdConfig {
    fn from_env(environment: Environment) -> Self {
        Self {
            host: env::var("STATSD_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("STATSD_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8125),
            prefix: "jira_bridge.".to_string(),
            mock: environment.is_test(),
            global_tags: GlobalTags::from_env(environment),
        }
    }
}

/// Tags identifying the deployment a metric came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalTags {
    pub environment: String,
    pub environment_type: String,
    pub deployment_id: String,
    pub region: String,
}

impl GlobalTags {
    fn from_env(environment: Environment) -> Self {
        let is_test = environment.is_test();
        Self {
            environment: if is_test {
                "test".to_string()
            } else {
                env::var("DEPLOY_ENV").unwrap_or_else(|_| environment.to_string())
            },
            environment_type: if is_test {
                "testenv".to_string()
            } else {
                env::var("DEPLOY_ENV_TYPE").unwrap_or_else(|_| environment.to_string())
            },
            deployment_id: env::var("DEPLOYMENT_ID").unwrap_or_else(|_| "1".to_string()),
            region: env::var("DEPLOY_REGION").unwrap_or_else(|_| "localhost".to_string()),
        }
    }

    /// Render as `key:value` statsd tags.
    #[must_use]
    pub fn to_tags(&self) -> Vec<String> {
        vec![
            format!("environment:{}", self.environment),
            format!("environment_type:{}", self.environment_type),
            format!("deployment_id:{}", self.deployment_id),
            format!("region:{}", self.region),
        ]
    }
}
