//! Reconciliation Engine
//!
//! Update-else-create merge of import records into the directory. Every
//! record gets its own session and its own result; results come back in
//! input order regardless of how many records run at once.

use std::sync::OnceLock;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::DirectoryConfig;
use crate::dn::escape_dn_value;
use crate::error::{DirectoryError, DirectoryResult, Operation};
use crate::record::{
    split_name, ImportRecord, PersonField, ReconciliationResult, ReconciliationStatus,
};
use crate::session::{Directory, NewEntryAttributes, SessionGuard};

/// DN a person with `common_name` lives at.
pub fn user_dn(config: &DirectoryConfig, common_name: &str) -> String {
    format!(
        "cn={},{}",
        escape_dn_value(common_name),
        config.user_container_dn()
    )
}

/// Attributes for a new person entry: object classes, names, then fields.
pub fn new_entry_attributes(
    config: &DirectoryConfig,
    common_name: &str,
    fields: &[(PersonField, String)],
) -> NewEntryAttributes {
    let (given_name, surname) = split_name(common_name);
    let mut attributes = vec![
        ("objectClass".to_string(), config.user_object_classes.clone()),
        ("cn".to_string(), vec![common_name.to_string()]),
        ("sn".to_string(), vec![surname]),
        ("givenName".to_string(), vec![given_name]),
    ];
    attributes.extend(
        fields
            .iter()
            .map(|(field, value)| (field.attribute().to_string(), vec![value.clone()])),
    );
    attributes
}

/// Why a single record failed.
enum RecordFailure {
    /// No session could be opened; later records would fail the same way.
    Session(DirectoryError),
    Record(DirectoryError),
}

impl From<DirectoryError> for RecordFailure {
    fn from(e: DirectoryError) -> Self {
        RecordFailure::Record(e)
    }
}

/// Write path for bulk imports.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    directory: Directory,
}

impl ReconciliationEngine {
    pub fn new(directory: Directory) -> Self {
        Self { directory }
    }

    /// Reconcile with the configured batch deadline.
    pub async fn reconcile(&self, batch: &[ImportRecord]) -> Vec<ReconciliationResult> {
        self.reconcile_within(batch, self.directory.config().reconcile_timeout())
            .await
    }

    /// Reconcile `batch`; one result per record, in input order.
    ///
    /// A session that cannot be opened (bind rejected or timed out) marks the
    /// failing record and every record not yet started as `error`. Records
    /// still pending when `deadline` expires are reported as timed out.
    #[instrument(skip(self, batch), fields(records = batch.len()))]
    pub async fn reconcile_within(
        &self,
        batch: &[ImportRecord],
        deadline: Duration,
    ) -> Vec<ReconciliationResult> {
        let expires_at = Instant::now() + deadline;
        let systemic_failure = OnceLock::new();
        let concurrency = self.directory.config().connection.reconcile_concurrency.max(1);

        // Built up front: a closure-mapped stream is not `Send` for axum handlers.
        let pending: Vec<_> = batch
            .iter()
            .map(|record| self.reconcile_guarded(record, expires_at, deadline, &systemic_failure))
            .collect();
        let results: Vec<ReconciliationResult> = stream::iter(pending)
            .buffered(concurrency)
            .collect()
            .await;

        let count = |status| results.iter().filter(|r| r.status == status).count();
        info!(
            created = count(ReconciliationStatus::Created),
            updated = count(ReconciliationStatus::Updated),
            failed = count(ReconciliationStatus::Error),
            "Reconciliation completed"
        );
        results
    }

    async fn reconcile_guarded(
        &self,
        record: &ImportRecord,
        expires_at: Instant,
        deadline: Duration,
        systemic_failure: &OnceLock<String>,
    ) -> ReconciliationResult {
        let key = record.key();
        if let Some(reason) = systemic_failure.get() {
            return ReconciliationResult::failed(key, format!("not attempted: {reason}"));
        }
        let timed_out = || DirectoryError::timeout(Operation::Request, deadline).to_string();
        if Instant::now() >= expires_at {
            return ReconciliationResult::failed(key, timed_out());
        }

        match tokio::time::timeout_at(expires_at, self.reconcile_one(record)).await {
            Ok(Ok(ReconciliationStatus::Created)) => ReconciliationResult::created(key),
            Ok(Ok(_)) => ReconciliationResult::updated(key),
            Ok(Err(failure)) => {
                let (e, systemic) = match failure {
                    RecordFailure::Session(e) => (e, true),
                    RecordFailure::Record(e) => {
                        let systemic = e.is_systemic();
                        (e, systemic)
                    }
                };
                if systemic {
                    let _ = systemic_failure.set(e.to_string());
                }
                warn!(key = %key, error = %e, code = e.error_code(), systemic, "Record not reconciled");
                ReconciliationResult::failed(key, e.to_string())
            }
            Err(_) => ReconciliationResult::failed(key, timed_out()),
        }
    }

    async fn reconcile_one(&self, record: &ImportRecord) -> Result<ReconciliationStatus, RecordFailure> {
        let common_name = record.require_common_name()?;
        let fields = record.present_fields();

        let mut session = self.directory.open().await.map_err(RecordFailure::Session)?;
        let outcome = self
            .update_else_create(&mut session, common_name, &fields)
            .await;
        session.release().await;
        outcome.map_err(RecordFailure::Record)
    }

    async fn update_else_create(
        &self,
        session: &mut SessionGuard,
        common_name: &str,
        fields: &[(PersonField, String)],
    ) -> DirectoryResult<ReconciliationStatus> {
        let config = self.directory.config();
        let dn = user_dn(config, common_name);

        let changes = ImportRecord::changes_for(fields);
        if changes.is_empty() {
            debug!(dn = %dn, "No fields to write");
            return Ok(ReconciliationStatus::Updated);
        }

        match session.modify(&dn, &changes).await {
            Ok(()) => Ok(ReconciliationStatus::Updated),
            Err(e @ DirectoryError::Timeout { .. }) => Err(e),
            Err(e) => {
                debug!(dn = %dn, error = %e, "Modify failed, creating entry");
                let attributes = new_entry_attributes(config, common_name, fields);
                session.add(&dn, &attributes).await?;
                Ok(ReconciliationStatus::Created)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionSettings;
    use crate::memory::InMemoryDirectory;
    use std::sync::Arc;

    const BASE: &str = "dc=example,dc=com";
    const ADMIN: &str = "cn=admin,dc=example,dc=com";

    fn config() -> DirectoryConfig {
        DirectoryConfig::new("ldap://localhost", BASE, ADMIN).with_password("secret")
    }

    fn engine_with(directory: &InMemoryDirectory, config: DirectoryConfig) -> ReconciliationEngine {
        ReconciliationEngine::new(Directory::new(Arc::new(directory.clone()), config))
    }

    fn engine(directory: &InMemoryDirectory) -> ReconciliationEngine {
        engine_with(directory, config())
    }

    fn dn(cn: &str) -> String {
        format!("cn={cn},ou=users,{BASE}")
    }

    fn with_operation_timeout(ms: u64) -> DirectoryConfig {
        config().with_connection(ConnectionSettings {
            operation_timeout_ms: ms,
            ..ConnectionSettings::default()
        })
    }

    #[test]
    fn test_user_dn_follows_container() {
        let staff = config().with_user_container("ou=staff");
        assert_eq!(user_dn(&staff, "A B"), "cn=A B,ou=staff,dc=example,dc=com");

        let flat = config().with_user_container("");
        assert_eq!(user_dn(&flat, "A B"), "cn=A B,dc=example,dc=com");
    }

    #[test]
    fn test_user_dn_escapes_common_name() {
        assert_eq!(user_dn(&config(), "Иван Петров"), dn("Иван Петров"));
        assert_eq!(
            user_dn(&config(), "Doe, John"),
            "cn=Doe\\, John,ou=users,dc=example,dc=com"
        );
    }

    #[tokio::test]
    async fn test_creates_missing_entry_with_split_name() {
        let directory = InMemoryDirectory::new(ADMIN, "secret");
        let batch = vec![ImportRecord::new("Иван Петров").with(PersonField::Mail, "x@y.z")];

        let results = engine(&directory).reconcile(&batch).await;

        assert_eq!(results, vec![ReconciliationResult::created("Иван Петров")]);
        let dn = dn("Иван Петров");
        assert_eq!(directory.attribute(&dn, "sn").unwrap(), vec!["Петров"]);
        assert_eq!(directory.attribute(&dn, "givenName").unwrap(), vec!["Иван"]);
        assert_eq!(directory.attribute(&dn, "mail").unwrap(), vec!["x@y.z"]);
        assert_eq!(
            directory.attribute(&dn, "objectClass").unwrap(),
            vec!["inetOrgPerson", "organizationalPerson", "person", "top"]
        );
        assert_eq!(directory.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_rerun_updates_without_duplicates() {
        let directory = InMemoryDirectory::new(ADMIN, "secret");
        let batch = vec![
            ImportRecord::new("Иван Петров").with(PersonField::Mail, "x@y.z"),
            ImportRecord::new("Анна Смирнова").with(PersonField::Mobile, "+7 900 111-22-33"),
        ];

        engine(&directory).reconcile(&batch).await;
        let second = engine(&directory).reconcile(&batch).await;

        assert!(second
            .iter()
            .all(|r| r.status == ReconciliationStatus::Updated));
        assert_eq!(directory.len(), 2);
        assert_eq!(
            directory.attribute(&dn("Анна Смирнова"), "mobile").unwrap(),
            vec!["+79001112233"]
        );
    }

    #[tokio::test]
    async fn test_failure_is_isolated_to_its_record() {
        let directory = InMemoryDirectory::new(ADMIN, "secret");
        directory.fail_writes_for(&dn("B B"));
        let batch = vec![
            ImportRecord::new("A A").with(PersonField::Title, "Engineer"),
            ImportRecord::new("B B").with(PersonField::Title, "Engineer"),
            ImportRecord::new("C C").with(PersonField::Title, "Engineer"),
        ];

        let results = engine(&directory).reconcile(&batch).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], ReconciliationResult::created("A A"));
        assert_eq!(results[1].key, "B B");
        assert_eq!(results[1].status, ReconciliationStatus::Error);
        assert!(results[1].error.as_deref().unwrap().contains("unwilling"));
        assert_eq!(results[2], ReconciliationResult::created("C C"));
        assert_eq!(directory.open_sessions(), 0);
        assert_eq!(directory.sessions_opened(), 3);
    }

    #[tokio::test]
    async fn test_empty_change_set_reports_updated_without_writes() {
        let directory = InMemoryDirectory::new(ADMIN, "secret");
        let batch = vec![ImportRecord::new("Иван Петров").with(PersonField::Mail, "   ")];

        let results = engine(&directory).reconcile(&batch).await;

        assert_eq!(results, vec![ReconciliationResult::updated("Иван Петров")]);
        assert!(directory.operations().is_empty());
    }

    #[tokio::test]
    async fn test_record_without_common_name_makes_no_directory_call() {
        let directory = InMemoryDirectory::new(ADMIN, "secret");
        let batch = vec![
            ImportRecord::default().with(PersonField::Mail, "x@y.z"),
            ImportRecord::new("Иван Петров"),
        ];

        let results = engine(&directory).reconcile(&batch).await;

        assert_eq!(results[0].status, ReconciliationStatus::Error);
        assert!(results[0].error.as_deref().unwrap().contains("common name"));
        assert_eq!(results[1].status, ReconciliationStatus::Updated);
        assert_eq!(directory.sessions_opened(), 1);
    }

    #[tokio::test]
    async fn test_bind_failure_is_systemic() {
        let directory = InMemoryDirectory::new(ADMIN, "rotated");
        let batch = vec![
            ImportRecord::new("A A").with(PersonField::Title, "x"),
            ImportRecord::new("B B").with(PersonField::Title, "x"),
            ImportRecord::new("C C").with(PersonField::Title, "x"),
        ];

        let results = engine(&directory).reconcile(&batch).await;

        assert!(results.iter().all(|r| r.status == ReconciliationStatus::Error));
        assert!(results[0].error.as_deref().unwrap().contains("bind failed"));
        assert!(results[2].error.as_deref().unwrap().starts_with("not attempted"));
        assert_eq!(directory.sessions_opened(), 1);
    }

    #[tokio::test]
    async fn test_parallel_reconcile_preserves_order() {
        let directory = InMemoryDirectory::new(ADMIN, "secret");
        let mut config = config();
        config.connection.reconcile_concurrency = 4;
        let names: Vec<String> = (0..10).map(|i| format!("Сотрудник {i}")).collect();
        let batch: Vec<ImportRecord> = names
            .iter()
            .map(|n| ImportRecord::new(n.clone()).with(PersonField::DepartmentNumber, "42"))
            .collect();

        let results = engine_with(&directory, config).reconcile(&batch).await;

        let keys: Vec<&str> = results.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, names.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(directory.len(), 10);
        assert_eq!(directory.open_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_deadline_marks_pending_records() {
        let directory =
            InMemoryDirectory::new(ADMIN, "secret").with_bind_delay(Duration::from_millis(400));
        let batch = vec![
            ImportRecord::new("A A").with(PersonField::Title, "x"),
            ImportRecord::new("B B").with(PersonField::Title, "x"),
            ImportRecord::new("C C").with(PersonField::Title, "x"),
        ];
        let results = engine_with(&directory, with_operation_timeout(1_000))
            .reconcile_within(&batch, Duration::from_millis(600))
            .await;

        assert_eq!(results[0].status, ReconciliationStatus::Created);
        assert_eq!(results[1].status, ReconciliationStatus::Error);
        assert!(results[1].error.as_deref().unwrap().contains("timed out"));
        assert_eq!(results[2].status, ReconciliationStatus::Error);
        assert_eq!(directory.open_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_timeout_aborts_remaining_records() {
        let directory =
            InMemoryDirectory::new(ADMIN, "secret").with_bind_delay(Duration::from_secs(60));
        let batch = vec![
            ImportRecord::new("A A").with(PersonField::Title, "x"),
            ImportRecord::new("B B").with(PersonField::Title, "x"),
            ImportRecord::new("C C").with(PersonField::Title, "x"),
        ];
        let results = engine_with(&directory, with_operation_timeout(100))
            .reconcile_within(&batch, Duration::from_secs(60))
            .await;

        assert!(results.iter().all(|r| r.status == ReconciliationStatus::Error));
        let first = results[0].error.as_deref().unwrap();
        assert!(first.contains("bind") && first.contains("timed out"));
        for result in &results[1..] {
            assert!(result.error.as_deref().unwrap().starts_with("not attempted"));
        }
        assert_eq!(directory.sessions_opened(), 1);
        assert_eq!(directory.open_sessions(), 0);
    }
}
