//! # Phonebook Directory
//!
//! Employee-directory client for LDAP/Active Directory.
//!
//! This crate queries, normalizes and reconciles person entries held in an
//! externally managed directory, and exposes them as a flat, searchable,
//! sorted employee list.
//!
//! ## Features
//!
//! - Session-per-operation with guaranteed release and hard deadlines
//! - Escaped free-text search filters over a trusted base predicate
//! - Normalization of both attribute shapes servers return
//! - Russian collation of result lists
//! - Update-else-create reconciliation of import batches
//! - Single-record add, edit and delete
//! - Paged search results, LDAPS and STARTTLS
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use phonebook_directory::{AuthContext, Directory, DirectoryConfig, DirectoryService, LdapDirectory};
//!
//! let config = DirectoryConfig::from_env()?;
//! let connector = LdapDirectory::new(config.clone())?;
//! let service = DirectoryService::new(Directory::new(Arc::new(connector), config));
//!
//! let response = service.search(&AuthContext::anonymous(), Some("Петров")).await;
//! ```

pub mod collation;
pub mod config;
pub mod connector;
pub mod dn;
pub mod entry;
pub mod error;
pub mod filter;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod mutation;
pub mod query;
pub mod reconcile;
pub mod record;
pub mod service;
pub mod session;

// Re-exports
pub use config::{ConnectionSettings, DirectoryConfig, SearchScope};
pub use connector::LdapDirectory;
pub use entry::{normalize, RawAttributes, RawEntry};
pub use error::{DirectoryError, DirectoryResult, Operation};
pub use filter::build_filter;
#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryDirectory;
pub use mutation::MutationOperations;
pub use query::QueryEngine;
pub use reconcile::ReconciliationEngine;
pub use record::{
    DirectoryRecord, ImportRecord, PersonField, ReconciliationResult, ReconciliationStatus,
    RecordEdit,
};
pub use service::{
    AuthContext, DirectoryService, FailureKind, MutationResponse, ReconcileResponse,
    SearchResponse, ServiceFailure,
};
pub use session::{BindCredentials, Directory, DirectoryConnector, DirectorySession, SessionGuard};
