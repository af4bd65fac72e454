//! Import handlers.
//!
//! - POST /api/users/import     - JSON array of records
//! - POST /api/users/import/csv - Raw CSV body
//!
//! Both answer with per-record results in input order.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use phonebook_directory::{AuthContext, ImportRecord, ReconcileResponse};

use crate::error::ApiError;
use crate::router::ApiState;
use crate::services::csv_codec::parse_import_csv;

/// POST /api/users/import
pub async fn import_json(
    State(state): State<ApiState>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<Vec<ImportRecord>>, JsonRejection>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    if !auth.authorized {
        return Err(ApiError::Unauthorized);
    }
    let Json(records) = body?;
    reconcile(&state, &auth, &records).await
}

/// POST /api/users/import/csv
pub async fn import_csv(
    State(state): State<ApiState>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Json<ReconcileResponse>, ApiError> {
    if !auth.authorized {
        return Err(ApiError::Unauthorized);
    }
    let records = parse_import_csv(&body, state.max_import_rows)?;
    reconcile(&state, &auth, &records).await
}

async fn reconcile(
    state: &ApiState,
    auth: &AuthContext,
    records: &[ImportRecord],
) -> Result<Json<ReconcileResponse>, ApiError> {
    let response = state.service.reconcile(auth, records).await;
    if let Some(failure) = &response.error {
        return Err(failure.clone().into());
    }
    Ok(Json(response))
}
