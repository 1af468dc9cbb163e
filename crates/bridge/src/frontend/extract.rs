//! Extractors whose rejections go through error rendering.

use axum::extract::{
    rejection::{FormRejection, PathRejection},
    FromRequest, FromRequestParts,
};

use crate::error::AppError;

/// `Form` that rejects bad input as [`AppError::BadRequest`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Form), rejection(AppError))]
pub struct ValidForm<T>(pub T);

/// `Path` that rejects bad input as [`AppError::BadRequest`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ValidPath<T>(pub T);

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
