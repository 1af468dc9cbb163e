//! CSRF protection for form posts.
//!
//! Each session gets a random secret. Tokens are `salt-hmac(secret, salt)`,
//! so a fresh token can be handed to every rendered page while any token
//! issued for the session stays valid.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;
use uuid::Uuid;

use crate::config::Environment;
use crate::error::AppError;
use crate::session::Session;

type HmacSha256 = Hmac<Sha256>;

/// Form field carrying the token.
pub const CSRF_FIELD: &str = "_csrf";

/// Largest form body inspected for a token.
const MAX_FORM_BYTES: usize = 64 * 1024;

fn sign(secret: &str, salt: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(salt.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Create a token for `secret`.
#[must_use]
pub fn create_token(secret: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let signature = sign(secret, &salt).unwrap_or_default();
    format!("{salt}-{signature}")
}

/// Check a token against `secret`.
#[must_use]
pub fn verify_token(secret: &str, token: &str) -> bool {
    let Some((salt, signature)) = token.split_once('-') else {
        return false;
    };
    let Some(expected) = sign(secret, salt) else {
        return false;
    };
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// Token for a page rendered in this session, creating the session secret
/// on first use.
#[must_use]
pub fn token_for(session: &Session) -> String {
    let secret = session.update(|data| {
        data.csrf_secret
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone()
    });
    create_token(&secret)
}

/// Methods that are never checked.
fn is_ignored(method: &Method, environment: Environment) -> bool {
    if matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) {
        return true;
    }
    // Tests drive forms directly; only DELETE stays protected there.
    environment.is_test() && matches!(*method, Method::POST | Method::PUT)
}

fn header_token(request: &Request) -> Option<String> {
    ["csrf-token", "x-csrf-token", "xsrf-token", "x-xsrf-token"]
        .iter()
        .find_map(|name| request.headers().get(*name))
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn form_token(body: &[u8]) -> Option<String> {
    url::form_urlencoded::parse(body)
        .find(|(key, _)| key == CSRF_FIELD)
        .map(|(_, value)| value.into_owned())
}

/// CSRF middleware.
///
/// Looks for the token in the CSRF headers first, then in the
/// `application/x-www-form-urlencoded` body, which is buffered and handed on
/// unchanged.
pub async fn csrf_protection(
    State(environment): State<Environment>,
    session: Session,
    request: Request,
    next: Next,
) -> Response {
    if is_ignored(request.method(), environment) {
        return next.run(request).await;
    }

    let (token, request) = match header_token(&request) {
        Some(token) => (Some(token), request),
        None => {
            let (parts, body) = request.into_parts();
            let Ok(bytes) = to_bytes(body, MAX_FORM_BYTES).await else {
                return AppError::BadRequest("Request body too large".to_string()).into_response();
            };
            let token = form_token(&bytes);
            (token, Request::from_parts(parts, Body::from(bytes)))
        }
    };

    let secret = session.data().csrf_secret;
    let valid = match (secret, token) {
        (Some(secret), Some(token)) => verify_token(&secret, &token),
        _ => false,
    };

    if !valid {
        debug!(method = %request.method(), uri = %request.uri(), "Rejected request with invalid CSRF token");
        return AppError::InvalidCsrfToken.into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let token = create_token("secret");
        assert!(verify_token("secret", &token));
        assert!(!verify_token("other-secret", &token));
    }

    #[test]
    fn test_tokens_are_salted() {
        assert_ne!(create_token("secret"), create_token("secret"));
    }

    #[test]
    fn test_malformed_token() {
        assert!(!verify_token("secret", "no-dash-signature"));
        assert!(!verify_token("secret", "nodash"));
        assert!(!verify_token("secret", ""));
    }

    #[test]
    fn test_token_for_reuses_secret() {
        let session = Session::default();
        let first = token_for(&session);
        let second = token_for(&session);

        let secret = session.data().csrf_secret.unwrap();
        assert!(verify_token(&secret, &first));
        assert!(verify_token(&secret, &second));
    }

    #[test]
    fn test_ignored_methods() {
        assert!(is_ignored(&Method::GET, Environment::Production));
        assert!(!is_ignored(&Method::POST, Environment::Production));
        assert!(is_ignored(&Method::POST, Environment::Test));
        assert!(!is_ignored(&Method::DELETE, Environment::Test));
    }

    #[test]
    fn test_form_token() {
        let body = b"installationId=1&_csrf=abc-def";
        assert_eq!(form_token(body).as_deref(), Some("abc-def"));
        assert!(form_token(b"installationId=1").is_none());
    }
}
