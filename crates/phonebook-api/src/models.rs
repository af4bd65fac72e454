//! Request and response shapes specific to the HTTP surface.

use serde::{Deserialize, Serialize};

/// Query parameters for `GET /api/users` and `GET /api/users/export`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub search: Option<String>,
}

/// Body of `POST /api/users/delete`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRequest {
    #[serde(alias = "distinguishedName")]
    pub dn: String,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
