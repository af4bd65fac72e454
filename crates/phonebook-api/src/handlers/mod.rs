//! HTTP handlers for the phonebook API.

pub mod health;
pub mod import;
pub mod mutations;
pub mod search;

use axum::extract::rejection::JsonRejection;

use crate::error::ApiError;

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}
