//! Signed cookie sessions.
//!
//! The whole session lives in the `session` cookie as
//! `base64url(json).hex(hmac-sha256(json))`. Anything that fails to verify or
//! parse is treated as an empty session.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "session";

/// Session lifetime: 30 days.
pub const SESSION_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

/// Values kept across requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// Jira site the user came from (`xdm_e`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_host: Option<String>,
    /// Jira context JWT (`jwt`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
    /// GitHub OAuth user token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    /// Pending OAuth `state` parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_state: Option<String>,
    /// Path to return to after login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
    /// Per-session CSRF secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_secret: Option<String>,
}

/// Encodes and verifies session cookies.
#[derive(Clone)]
pub struct SessionCodec {
    mac: HmacSha256,
}

impl SessionCodec {
    /// Create a codec signing with `key`.
    pub fn new(key: &[u8]) -> anyhow::Result<Self> {
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| anyhow::anyhow!("Invalid session key: {e}"))?;
        Ok(Self { mac })
    }

    fn mac(&self) -> HmacSha256 {
        self.mac.clone()
    }

    /// Serialise and sign session data.
    #[must_use]
    pub fn encode(&self, data: &SessionData) -> String {
        let json = serde_json::to_vec(data).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(&json);
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("{payload}.{signature}")
    }

    /// Verify and deserialise a cookie value.
    #[must_use]
    pub fn decode(&self, value: &str) -> Option<SessionData> {
        let (payload, signature) = value.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }

    /// `Set-Cookie` header value for the session.
    #[must_use]
    pub fn set_cookie(&self, data: &SessionData) -> String {
        format!(
            "{SESSION_COOKIE}={}; Path=/; Max-Age={SESSION_MAX_AGE_SECS}; HttpOnly; SameSite=None; Secure",
            self.encode(data)
        )
    }
}

/// Handle to the current request's session.
///
/// Inserted into request extensions by [`load_session`]; handlers take it as
/// an extractor and mutate it in place.
#[derive(Debug, Clone, Default)]
pub struct Session(Arc<Mutex<SessionData>>);

impl Session {
    /// Wrap existing session data.
    #[must_use]
    pub fn new(data: SessionData) -> Self {
        Self(Arc::new(Mutex::new(data)))
    }

    /// Snapshot of the session data.
    #[must_use]
    pub fn data(&self) -> SessionData {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Modify the session.
    pub fn update<R>(&self, f: impl FnOnce(&mut SessionData) -> R) -> R {
        let mut data = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut data)
    }

    /// Jira host stored in the session.
    #[must_use]
    pub fn jira_host(&self) -> Option<String> {
        self.data().jira_host
    }

    /// GitHub token stored in the session.
    #[must_use]
    pub fn github_token(&self) -> Option<String> {
        self.data().github_token
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Session layer not installed"))
    }
}

/// Read the session cookie from request headers.
fn session_cookie(request: &Request) -> Option<&str> {
    request
        .headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

/// Session middleware.
///
/// Loads the session before the handler runs and re-issues the cookie only
/// when the handler changed it.
pub async fn load_session(
    State(codec): State<SessionCodec>,
    mut request: Request,
    next: Next,
) -> Response {
    let original = match session_cookie(&request) {
        Some(value) => codec.decode(value).unwrap_or_else(|| {
            debug!("Discarding session cookie that failed verification");
            SessionData::default()
        }),
        None => SessionData::default(),
    };

    let session = Session::new(original.clone());
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    let current = session.data();
    if current != original {
        match HeaderValue::from_str(&codec.set_cookie(&current)) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "Failed to encode session cookie"),
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> SessionData {
        SessionData {
            jira_host: Some("https://example.atlassian.net".to_string()),
            github_token: Some("gho_token".to_string()),
            ..SessionData::default()
        }
    }

    #[test]
    fn test_encode_decode() {
        let codec = SessionCodec::new(b"secret").unwrap();
        let value = codec.encode(&data());
        assert_eq!(codec.decode(&value), Some(data()));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let codec = SessionCodec::new(b"secret").unwrap();
        let value = codec.encode(&data());
        let (_, signature) = value.rsplit_once('.').unwrap();

        let forged = SessionData {
            github_token: Some("stolen".to_string()),
            ..data()
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());

        assert!(codec.decode(&format!("{forged_payload}.{signature}")).is_none());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let value = SessionCodec::new(b"secret").unwrap().encode(&data());
        assert!(SessionCodec::new(b"other").unwrap().decode(&value).is_none());
    }

    #[test]
    fn test_garbage_rejected() {
        let codec = SessionCodec::new(b"secret").unwrap();
        assert!(codec.decode("not-a-cookie").is_none());
        assert!(codec.decode("abc.zz").is_none());
    }

    #[test]
    fn test_set_cookie_attributes() {
        let cookie = SessionCodec::new(b"secret").unwrap().set_cookie(&SessionData::default());
        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("Max-Age=2592000"));
        assert!(cookie.contains("SameSite=None"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("HttpOnly"));
    }

    #[test]
    fn test_session_update() {
        let session = Session::default();
        session.update(|d| d.jwt = Some("token".to_string()));
        assert_eq!(session.data().jwt.as_deref(), Some("token"));
    }
}
