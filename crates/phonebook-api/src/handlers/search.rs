//! Search handlers.
//!
//! - GET /api/users?search= - Search, sorted
//! - GET /api/users/export  - The same search as a CSV download

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use phonebook_directory::{AuthContext, SearchResponse};

use crate::error::{failure_status, ApiError};
use crate::models::SearchParams;
use crate::router::ApiState;
use crate::services::csv_codec::export_csv;

/// GET /api/users?search=
///
/// The body always carries `records`; a failed search answers with an empty
/// list, the failure, and a matching status.
pub async fn search_users(
    State(state): State<ApiState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<SearchParams>,
) -> (StatusCode, Json<SearchResponse>) {
    let response = state.service.search(&auth, params.search.as_deref()).await;
    let status = response
        .error
        .as_ref()
        .map_or(StatusCode::OK, |failure| failure_status(failure.kind));
    (status, Json(response))
}

/// GET /api/users/export?search=
pub async fn export_users(
    State(state): State<ApiState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.service.search(&auth, params.search.as_deref()).await;
    if let Some(failure) = response.error {
        return Err(failure.into());
    }

    let body = export_csv(&response.records)?;
    tracing::info!(rows = response.records.len(), "Phonebook exported");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"phonebook.csv\"",
            ),
        ],
        body,
    ))
}
