//! Phonebook HTTP API.
//!
//! This crate exposes the directory service over HTTP:
//! - Search with Russian-collated results, and the same search as CSV
//! - JSON and CSV bulk import with per-record results
//! - Single-record add, edit and delete behind a bearer token
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use phonebook_api::{api_router, ApiState, BearerTokenAuthorizer};
//!
//! let authorizer = BearerTokenAuthorizer::new(Some(token), "api-token");
//! let app = api_router(ApiState::new(service, Arc::new(authorizer)));
//! ```

pub mod auth;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

// Re-export public API
pub use auth::{Authorizer, BearerTokenAuthorizer};
pub use error::{ApiError, ProblemDetails};
pub use router::{api_router, ApiState};
