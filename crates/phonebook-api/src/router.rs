//! Router and state for the phonebook API.

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use phonebook_directory::DirectoryService;

use crate::auth::{resolve_auth, Authorizer};
use crate::handlers;
use crate::services::csv_codec::DEFAULT_MAX_ROWS;

/// Shared state for phonebook routes.
#[derive(Clone)]
pub struct ApiState {
    pub service: DirectoryService,
    pub authorizer: Arc<dyn Authorizer>,
    /// Row limit for CSV imports.
    pub max_import_rows: usize,
}

impl ApiState {
    pub fn new(service: DirectoryService, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            service,
            authorizer,
            max_import_rows: DEFAULT_MAX_ROWS,
        }
    }

    #[must_use]
    pub fn with_max_import_rows(mut self, max_import_rows: usize) -> Self {
        self.max_import_rows = max_import_rows;
        self
    }
}

/// Create the phonebook router.
///
/// - GET  /api/users?search=    - Search
/// - GET  /api/users/export     - CSV export of a search
/// - POST /api/users/import     - Reconcile a JSON array of records
/// - POST /api/users/import/csv - Reconcile a CSV body
/// - POST /api/users/add        - Create one entry
/// - POST /api/users/edit       - Change fields of one entry
/// - POST /api/users/delete     - Delete one entry
/// - GET  /health               - Liveness
pub fn api_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/api/users", get(handlers::search::search_users))
        .route("/api/users/export", get(handlers::search::export_users))
        .route("/api/users/import", post(handlers::import::import_json))
        .route("/api/users/import/csv", post(handlers::import::import_csv))
        .route("/api/users/add", post(handlers::mutations::add_user))
        .route("/api/users/edit", post(handlers::mutations::edit_user))
        .route("/api/users/delete", post(handlers::mutations::delete_user))
        .layer(middleware::from_fn_with_state(state.clone(), resolve_auth));

    Router::new()
        .merge(api_routes)
        .route("/health", get(handlers::health::health))
        .with_state(state)
}
