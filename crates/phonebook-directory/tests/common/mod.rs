//! Shared fixtures for directory integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use phonebook_directory::{Directory, DirectoryConfig, DirectoryService, InMemoryDirectory};

static INIT: Once = Once::new();

pub const BASE_DN: &str = "dc=example,dc=com";
pub const SERVICE_DN: &str = "cn=admin,dc=example,dc=com";
pub const SERVICE_PASSWORD: &str = "secret";

/// Initialize logging for tests (once).
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

pub fn test_config() -> DirectoryConfig {
    DirectoryConfig::new("ldap://directory.test", BASE_DN, SERVICE_DN)
        .with_password(SERVICE_PASSWORD)
        .with_base_filter("(objectClass=person)")
}

pub fn empty_directory() -> InMemoryDirectory {
    InMemoryDirectory::new(SERVICE_DN, SERVICE_PASSWORD)
}

/// Directory seeded with a small staff list, out of alphabetical order.
pub fn staff_directory() -> InMemoryDirectory {
    let person = |cn: &'static str, sn: &'static str, extra: Vec<(&'static str, Vec<&'static str>)>| {
        let mut attrs = vec![
            ("objectClass", vec!["inetOrgPerson", "person"]),
            ("cn", vec![cn]),
            ("sn", vec![sn]),
            ("displayName", vec![cn]),
        ];
        attrs.extend(extra);
        attrs
    };

    empty_directory()
        .with_entry(
            "cn=Яковлев Олег,ou=users,dc=example,dc=com",
            person("Яковлев Олег", "Яковлев", vec![("title", vec!["Бухгалтер"])]),
        )
        .with_entry(
            "cn=Абрамов Илья,ou=users,dc=example,dc=com",
            person(
                "Абрамов Илья",
                "Абрамов",
                vec![("telephoneNumber", vec!["1001"]), ("departmentNumber", vec!["12"])],
            ),
        )
        .with_entry(
            "uid=ivanov,cn=guest,ou=users,dc=example,dc=com",
            person("Иванов Пётр", "Иванов", vec![("mail", vec!["ivanov@example.com"])]),
        )
        .with_entry(
            "cn=Disabled Account,ou=service,dc=example,dc=com",
            vec![("objectClass", vec!["account"]), ("cn", vec!["Disabled Account"])],
        )
}

pub fn service_for(directory: &InMemoryDirectory, config: DirectoryConfig) -> DirectoryService {
    init_test_logging();
    DirectoryService::new(Directory::new(Arc::new(directory.clone()), config))
}
