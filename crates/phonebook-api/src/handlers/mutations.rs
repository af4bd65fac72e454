//! Single-record handlers.
//!
//! - POST /api/users/add    - Create one entry
//! - POST /api/users/edit   - Change supplied fields of one entry
//! - POST /api/users/delete - Delete one entry

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use phonebook_directory::{AuthContext, ImportRecord, MutationResponse, RecordEdit};

use crate::error::ApiError;
use crate::models::DeleteRequest;
use crate::router::ApiState;

fn into_result(response: MutationResponse) -> Result<Json<MutationResponse>, ApiError> {
    if let Some(failure) = &response.error {
        return Err(failure.clone().into());
    }
    Ok(Json(response))
}

/// POST /api/users/add
pub async fn add_user(
    State(state): State<ApiState>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<ImportRecord>, JsonRejection>,
) -> Result<(StatusCode, Json<MutationResponse>), ApiError> {
    let Json(record) = body?;
    let response = into_result(state.service.add_one(&auth, &record).await)?;
    Ok((StatusCode::CREATED, response))
}

/// POST /api/users/edit
pub async fn edit_user(
    State(state): State<ApiState>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<RecordEdit>, JsonRejection>,
) -> Result<Json<MutationResponse>, ApiError> {
    let Json(edit) = body?;
    into_result(state.service.edit_one(&auth, &edit).await)
}

/// POST /api/users/delete
pub async fn delete_user(
    State(state): State<ApiState>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<MutationResponse>, ApiError> {
    let Json(request) = body?;
    into_result(state.service.delete_one(&auth, &request.dn).await)
}
