//! Boundary service
//!
//! Entry point for transports. Every call returns a response value; failures
//! travel inside it instead of as `Err`. Mutations require an authorized
//! [`AuthContext`].

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::DirectoryError;
use crate::mutation::MutationOperations;
use crate::query::QueryEngine;
use crate::reconcile::ReconciliationEngine;
use crate::record::{DirectoryRecord, ImportRecord, ReconciliationResult, RecordEdit};
use crate::session::Directory;

/// What the auth collaborator knows about the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub authorized: bool,
    /// Display identity, for audit logging only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

impl AuthContext {
    pub fn authorized(identity: impl Into<String>) -> Self {
        Self {
            authorized: true,
            identity: Some(identity.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    fn actor(&self) -> &str {
        self.identity.as_deref().unwrap_or("anonymous")
    }
}

/// Failure category, used by transports to choose a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unauthorized,
    InvalidInput,
    Timeout,
    Directory,
    Configuration,
}

/// Failure carried inside a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFailure {
    pub kind: FailureKind,
    pub code: String,
    pub message: String,
}

impl ServiceFailure {
    pub fn unauthorized() -> Self {
        Self {
            kind: FailureKind::Unauthorized,
            code: "UNAUTHORIZED".to_string(),
            message: "authorization required".to_string(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::InvalidInput,
            code: "PARSE_ERROR".to_string(),
            message: message.into(),
        }
    }
}

impl From<&DirectoryError> for ServiceFailure {
    fn from(error: &DirectoryError) -> Self {
        let kind = match error {
            DirectoryError::Configuration { .. } => FailureKind::Configuration,
            DirectoryError::Bind { .. } | DirectoryError::Operation { .. } => FailureKind::Directory,
            DirectoryError::Timeout { .. } => FailureKind::Timeout,
            DirectoryError::Parse { .. } => FailureKind::InvalidInput,
        };
        Self {
            kind,
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Always present; empty on failure.
    pub records: Vec<DirectoryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServiceFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub results: Vec<ReconciliationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServiceFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServiceFailure>,
}

impl MutationResponse {
    fn ok(dn: impl Into<String>) -> Self {
        Self {
            success: true,
            dn: Some(dn.into()),
            error: None,
        }
    }

    fn failed(error: ServiceFailure) -> Self {
        Self {
            success: false,
            dn: None,
            error: Some(error),
        }
    }
}

/// The directory core behind one handle.
#[derive(Debug, Clone)]
pub struct DirectoryService {
    query: QueryEngine,
    reconciliation: ReconciliationEngine,
    mutations: MutationOperations,
}

impl DirectoryService {
    pub fn new(directory: Directory) -> Self {
        Self {
            query: QueryEngine::new(directory.clone()),
            reconciliation: ReconciliationEngine::new(directory.clone()),
            mutations: MutationOperations::new(directory),
        }
    }

    /// Search the directory. Open to any caller.
    pub async fn search(&self, auth: &AuthContext, text: Option<&str>) -> SearchResponse {
        info!(actor = %auth.actor(), query = text.unwrap_or_default(), "Search requested");
        match self.query.query(text).await {
            Ok(records) => SearchResponse {
                records,
                error: None,
            },
            Err(e) => SearchResponse {
                records: Vec::new(),
                error: Some(ServiceFailure::from(&e)),
            },
        }
    }

    /// Reconcile an import batch.
    pub async fn reconcile(&self, auth: &AuthContext, records: &[ImportRecord]) -> ReconcileResponse {
        if !auth.authorized {
            warn!(actor = %auth.actor(), "Unauthorized import refused");
            return ReconcileResponse {
                results: Vec::new(),
                error: Some(ServiceFailure::unauthorized()),
            };
        }
        if records.is_empty() {
            return ReconcileResponse {
                results: Vec::new(),
                error: Some(ServiceFailure::invalid_input("no records to import")),
            };
        }

        info!(actor = %auth.actor(), records = records.len(), "Import requested");
        ReconcileResponse {
            results: self.reconciliation.reconcile(records).await,
            error: None,
        }
    }

    pub async fn add_one(&self, auth: &AuthContext, record: &ImportRecord) -> MutationResponse {
        if let Some(refused) = refuse_unauthorized(auth, "add") {
            return refused;
        }
        info!(actor = %auth.actor(), key = %record.key(), "Add requested");
        match self.mutations.add_one(record).await {
            Ok(dn) => MutationResponse::ok(dn),
            Err(e) => MutationResponse::failed(ServiceFailure::from(&e)),
        }
    }

    pub async fn edit_one(&self, auth: &AuthContext, edit: &RecordEdit) -> MutationResponse {
        if let Some(refused) = refuse_unauthorized(auth, "edit") {
            return refused;
        }
        info!(actor = %auth.actor(), dn = %edit.distinguished_name, "Edit requested");
        match self.mutations.edit_one(edit).await {
            Ok(()) => MutationResponse::ok(edit.distinguished_name.trim()),
            Err(e) => MutationResponse::failed(ServiceFailure::from(&e)),
        }
    }

    pub async fn delete_one(&self, auth: &AuthContext, dn: &str) -> MutationResponse {
        if let Some(refused) = refuse_unauthorized(auth, "delete") {
            return refused;
        }
        info!(actor = %auth.actor(), dn = %dn, "Delete requested");
        match self.mutations.delete_one(dn).await {
            Ok(()) => MutationResponse::ok(dn.trim()),
            Err(e) => MutationResponse::failed(ServiceFailure::from(&e)),
        }
    }
}

fn refuse_unauthorized(auth: &AuthContext, operation: &str) -> Option<MutationResponse> {
    if auth.authorized {
        return None;
    }
    warn!(actor = %auth.actor(), operation, "Unauthorized mutation refused");
    Some(MutationResponse::failed(ServiceFailure::unauthorized()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectoryConfig;
    use crate::memory::InMemoryDirectory;
    use crate::record::{PersonField, ReconciliationStatus};
    use std::sync::Arc;
    use std::time::Duration;

    const BASE: &str = "dc=example,dc=com";
    const ADMIN: &str = "cn=admin,dc=example,dc=com";

    fn service(directory: &InMemoryDirectory) -> DirectoryService {
        let config = DirectoryConfig::new("ldap://localhost", BASE, ADMIN)
            .with_password("secret")
            .with_base_filter("(objectClass=person)");
        DirectoryService::new(Directory::new(Arc::new(directory.clone()), config))
    }

    fn admin() -> AuthContext {
        AuthContext::authorized("admin@example.com")
    }

    #[tokio::test]
    async fn test_unauthorized_mutations_are_refused() {
        let directory = InMemoryDirectory::new(ADMIN, "secret");
        let service = service(&directory);
        let anonymous = AuthContext::anonymous();

        let add = service.add_one(&anonymous, &ImportRecord::new("A B")).await;
        let edit = service
            .edit_one(&anonymous, &RecordEdit::new("cn=x").set(PersonField::Mail, "m"))
            .await;
        let delete = service.delete_one(&anonymous, "cn=x").await;
        let import = service.reconcile(&anonymous, &[ImportRecord::new("A B")]).await;

        for response in [add, edit, delete] {
            assert!(!response.success);
            assert_eq!(response.error.unwrap().kind, FailureKind::Unauthorized);
        }
        assert!(import.results.is_empty());
        assert_eq!(import.error.unwrap().kind, FailureKind::Unauthorized);
        assert_eq!(directory.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn test_search_failure_is_carried_in_response() {
        let directory = InMemoryDirectory::new(ADMIN, "not-the-password");
        let response = service(&directory).search(&AuthContext::anonymous(), None).await;

        assert!(response.records.is_empty());
        let error = response.error.unwrap();
        assert_eq!(error.kind, FailureKind::Directory);
        assert_eq!(error.code, "BIND_ERROR");
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_timeout_kind() {
        let directory = InMemoryDirectory::new(ADMIN, "secret").with_search_delay(Duration::from_secs(60));
        let response = service(&directory).search(&AuthContext::anonymous(), Some("x")).await;
        assert_eq!(response.error.unwrap().kind, FailureKind::Timeout);
        assert_eq!(directory.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_add_then_search_then_delete() {
        let directory = InMemoryDirectory::new(ADMIN, "secret");
        let service = service(&directory);

        let added = service
            .add_one(&admin(), &ImportRecord::new("Иван Петров").with(PersonField::Mail, "ip@x"))
            .await;
        assert!(added.success);
        let dn = added.dn.unwrap();

        let found = service.search(&admin(), Some("Петров")).await;
        assert_eq!(found.records.len(), 1);
        assert_eq!(found.records[0].distinguished_name, dn);
        assert_eq!(found.records[0].mail.as_deref(), Some("ip@x"));

        assert!(service.delete_one(&admin(), &dn).await.success);
        assert!(service.search(&admin(), None).await.records.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_empty_batch_is_input_error() {
        let directory = InMemoryDirectory::new(ADMIN, "secret");
        let response = service(&directory).reconcile(&admin(), &[]).await;
        assert_eq!(response.error.unwrap().kind, FailureKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_reconcile_authorized() {
        let directory = InMemoryDirectory::new(ADMIN, "secret");
        let response = service(&directory)
            .reconcile(&admin(), &[ImportRecord::new("Иван Петров").with(PersonField::Mail, "x@y.z")])
            .await;
        assert!(response.error.is_none());
        assert_eq!(response.results[0].status, ReconciliationStatus::Created);
    }

    #[test]
    fn test_search_response_serialization() {
        let response = SearchResponse {
            records: vec![DirectoryRecord::new("cn=a,dc=x", "a")],
            error: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"records": [{"distinguishedName": "cn=a,dc=x", "commonName": "a"}]})
        );
    }
}
