//! Atlassian Connect JWT signing and verification.
//!
//! Outgoing requests carry an HS256 JWT signed with the site's shared secret
//! whose `qsh` claim binds the token to one method, path and query.

use anyhow::{Context, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lifetime of outgoing tokens.
const TOKEN_LIFETIME_SECS: i64 = 180;

/// Claims of a Connect JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraClaims {
    /// Issuer: the app key (outgoing) or the site's client key (incoming)
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    /// Query string hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qsh: Option<String>,
    /// Atlassian account of the user, on context tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

/// Canonical request string: `METHOD&path&sorted-query`.
///
/// `jwt` itself is excluded from the query, and repeated parameters are
/// joined with commas.
#[must_use]
pub fn canonical_request(method: &str, path_and_query: &str) -> String {
    let (path, query) = path_and_query
        .split_once('?')
        .unwrap_or((path_and_query, ""));

    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    let mut params: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if key == "jwt" {
            continue;
        }
        let value = urlencoding::encode(&value).into_owned();
        match params.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => params.push((key.into_owned(), vec![value])),
        }
    }
    params.sort_by(|a, b| a.0.cmp(&b.0));

    let query = params
        .iter()
        .map(|(key, values)| {
            let mut values = values.clone();
            values.sort();
            format!("{}={}", urlencoding::encode(key), values.join(","))
        })
        .collect::<Vec<_>>()
        .join("&");

    format!("{}&{path}&{query}", method.to_uppercase())
}

/// Query string hash for a request.
#[must_use]
pub fn query_string_hash(method: &str, path_and_query: &str) -> String {
    hex::encode(Sha256::digest(canonical_request(method, path_and_query).as_bytes()))
}

/// Sign a token for one outgoing request.
pub fn create_jwt(
    app_key: &str,
    shared_secret: &str,
    method: &str,
    path_and_query: &str,
) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = JiraClaims {
        iss: app_key.to_string(),
        iat: now,
        exp: now + TOKEN_LIFETIME_SECS,
        qsh: Some(query_string_hash(method, path_and_query)),
        sub: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(shared_secret.as_bytes()),
    )
    .context("Failed to sign Jira JWT")
}

/// Verify a token signed by a Jira site.
pub fn verify_jira_jwt(token: &str, shared_secret: &str) -> Result<JiraClaims> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<JiraClaims>(
        token,
        &DecodingKey::from_secret(shared_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .context("Invalid Jira JWT")
}
