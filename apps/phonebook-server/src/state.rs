//! Wiring of the directory core into the HTTP router.

use std::sync::Arc;

use axum::Router;
use phonebook_api::{api_router, ApiState, BearerTokenAuthorizer};
use phonebook_directory::{Directory, DirectoryConnector, DirectoryService};

use crate::config::ServerConfig;

/// Identity recorded in audit logs for callers holding the API token.
pub const TOKEN_IDENTITY: &str = "api-token";

/// Build the application router over `connector`.
pub fn build_router(config: &ServerConfig, connector: Arc<dyn DirectoryConnector>) -> Router {
    let directory = Directory::new(connector, config.directory.clone());
    let service = DirectoryService::new(directory);

    if config.api_token.is_none() {
        tracing::warn!("PHONEBOOK_API_TOKEN is not set; imports and edits are disabled");
    }
    let authorizer = BearerTokenAuthorizer::new(config.api_token.clone(), TOKEN_IDENTITY);

    api_router(ApiState::new(service, Arc::new(authorizer)))
}
