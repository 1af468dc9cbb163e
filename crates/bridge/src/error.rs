//! Error types for the configuration web app.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors returned by frontend handlers and guards.
///
/// The `Display` text doubles as the public error name, so the first three
/// variants must keep their exact wording.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid credentials
    #[error("Unauthorized")]
    Unauthorized,

    /// Authenticated but not allowed
    #[error("Forbidden")]
    Forbidden,

    /// Unknown installation or subscription
    #[error("Not Found")]
    NotFound,

    /// CSRF token missing or wrong
    #[error("invalid csrf token")]
    InvalidCsrfToken,

    /// Invalid user input
    #[error("{0}")]
    BadRequest(String),

    /// Upstream or internal failure
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Status used when the error page is rendered.
    ///
    /// Only the well-known names map to their own status; every other error
    /// is reported to the browser as a bad request.
    #[must_use]
    pub fn rendered_status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Status used for the plain (non-production) response.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidCsrfToken => StatusCode::FORBIDDEN,
            other => other.rendered_status(),
        }
    }
}

/// Attached to error responses so the error-rendering middleware can log
/// and re-render them.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// Error message (`Display` of the chain).
    pub message: String,
    /// Status for the rendered error page.
    pub rendered_status: StatusCode,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let report = ErrorReport {
            message: format!("{self:#}"),
            rendered_status: self.rendered_status(),
        };
        let mut response = (self.status(), report.message.clone()).into_response();
        response.extensions_mut().insert(report);
        response
    }
}
