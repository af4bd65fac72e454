//! End-to-end flows through the boundary service against the in-memory
//! directory.

mod common;

use std::time::Duration;

use common::{empty_directory, service_for, staff_directory, test_config};
use phonebook_directory::{
    AuthContext, FailureKind, ImportRecord, PersonField, ReconciliationStatus, RecordEdit,
};

fn editor() -> AuthContext {
    AuthContext::authorized("editor@example.com")
}

#[tokio::test]
async fn test_search_lists_people_in_collation_order() {
    let directory = staff_directory();
    let service = service_for(&directory, test_config());

    let response = service.search(&AuthContext::anonymous(), None).await;

    assert!(response.error.is_none());
    let names: Vec<&str> = response
        .records
        .iter()
        .map(|r| r.common_name.as_str())
        .collect();
    assert_eq!(names, vec!["Абрамов Илья", "Иванов Пётр", "Яковлев Олег"]);
    assert_eq!(response.records[1].uid.as_deref(), Some("ivanov"));
    assert_eq!(directory.open_sessions(), 0);
}

#[tokio::test]
async fn test_search_free_text_matches_any_attribute() {
    let directory = staff_directory();
    let service = service_for(&directory, test_config());

    let by_title = service.search(&AuthContext::anonymous(), Some("бухгалтер")).await;
    assert_eq!(by_title.records.len(), 1);
    assert_eq!(by_title.records[0].surname.as_deref(), Some("Яковлев"));

    let by_phone = service.search(&AuthContext::anonymous(), Some("1001")).await;
    assert_eq!(by_phone.records.len(), 1);

    let injection = service
        .search(&AuthContext::anonymous(), Some("*)(objectClass=*"))
        .await;
    assert!(injection.error.is_none());
    assert!(injection.records.is_empty());
}

#[tokio::test]
async fn test_single_level_scope_skips_nested_entries() {
    let directory = staff_directory();
    let config = test_config()
        .with_search_base("ou=users,dc=example,dc=com")
        .with_scope(phonebook_directory::SearchScope::SingleLevel);
    let service = service_for(&directory, config);

    let response = service.search(&AuthContext::anonymous(), None).await;

    assert_eq!(response.records.len(), 2);
    assert!(response
        .records
        .iter()
        .all(|r| r.uid.as_deref() != Some("ivanov")));
}

#[tokio::test]
async fn test_import_then_reimport_is_idempotent() {
    let directory = empty_directory();
    let service = service_for(&directory, test_config());
    let batch = vec![
        ImportRecord::new("Иван Петров").with(PersonField::Mail, "x@y.z"),
        ImportRecord::new("Мария Сидорова")
            .with(PersonField::TelephoneNumber, "+7 (495) 000-11-22")
            .with(PersonField::Title, " Директор "),
    ];

    let first = service.reconcile(&editor(), &batch).await;
    assert!(first
        .results
        .iter()
        .all(|r| r.status == ReconciliationStatus::Created));

    let second = service.reconcile(&editor(), &batch).await;
    assert!(second
        .results
        .iter()
        .all(|r| r.status == ReconciliationStatus::Updated));
    assert_eq!(directory.len(), 2);

    let listed = service.search(&editor(), Some("Сидорова")).await;
    assert_eq!(listed.records[0].telephone_number.as_deref(), Some("+74950001122"));
    assert_eq!(listed.records[0].title.as_deref(), Some("Директор"));
    assert_eq!(directory.open_sessions(), 0);
}

#[tokio::test]
async fn test_import_isolates_failing_record() {
    let directory = empty_directory();
    directory.fail_writes_for("cn=Второй Сотрудник,ou=users,dc=example,dc=com");
    let service = service_for(&directory, test_config());
    let batch: Vec<ImportRecord> = ["Первый Сотрудник", "Второй Сотрудник", "Третий Сотрудник"]
        .into_iter()
        .map(|cn| ImportRecord::new(cn).with(PersonField::DepartmentNumber, "7"))
        .collect();

    let response = service.reconcile(&editor(), &batch).await;

    let statuses: Vec<ReconciliationStatus> = response.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            ReconciliationStatus::Created,
            ReconciliationStatus::Error,
            ReconciliationStatus::Created
        ]
    );
    assert!(response.results[1].error.is_some());
}

#[tokio::test]
async fn test_interactive_edit_and_delete() {
    let directory = staff_directory();
    let service = service_for(&directory, test_config());
    let dn = "cn=Абрамов Илья,ou=users,dc=example,dc=com";

    let edited = service
        .edit_one(
            &editor(),
            &RecordEdit::new(dn)
                .set(PersonField::Mobile, "8 900 123 45 67")
                .set(PersonField::DepartmentNumber, ""),
        )
        .await;
    assert!(edited.success, "{:?}", edited.error);
    assert_eq!(directory.attribute(dn, "mobile").unwrap(), vec!["89001234567"]);
    assert_eq!(directory.attribute(dn, "departmentNumber"), None);
    assert_eq!(directory.attribute(dn, "telephoneNumber").unwrap(), vec!["1001"]);

    let deleted = service.delete_one(&editor(), dn).await;
    assert!(deleted.success);
    assert!(!directory.contains(dn));

    let again = service.delete_one(&editor(), dn).await;
    assert_eq!(again.error.unwrap().kind, FailureKind::Directory);
}

#[tokio::test(start_paused = true)]
async fn test_slow_bind_times_out_without_leaking() {
    let directory = staff_directory().with_bind_delay(Duration::from_secs(120));
    let service = service_for(&directory, test_config());

    let response = service.search(&AuthContext::anonymous(), None).await;

    assert_eq!(response.error.unwrap().kind, FailureKind::Timeout);
    assert!(response.records.is_empty());
    assert_eq!(directory.open_sessions(), 0);
}
