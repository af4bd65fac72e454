//! Shared fixtures for phonebook API tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response},
    Router,
};
use phonebook_api::{api_router, ApiState, BearerTokenAuthorizer};
use phonebook_directory::{Directory, DirectoryConfig, DirectoryService, InMemoryDirectory};
use serde_json::Value;

static INIT: Once = Once::new();

pub const BASE_DN: &str = "dc=example,dc=com";
pub const SERVICE_DN: &str = "cn=admin,dc=example,dc=com";
pub const SERVICE_PASSWORD: &str = "secret";
pub const API_TOKEN: &str = "test-token";

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

/// Three people out of alphabetical order plus one non-person entry.
pub fn staff_directory() -> InMemoryDirectory {
    empty_directory()
        .with_entry(
            "cn=Яковлев Олег,ou=users,dc=example,dc=com",
            [
                ("objectClass", vec!["person"]),
                ("cn", vec!["Яковлев Олег"]),
                ("title", vec!["Бухгалтер"]),
            ],
        )
        .with_entry(
            "cn=Абрамов Илья,ou=users,dc=example,dc=com",
            [
                ("objectClass", vec!["person"]),
                ("cn", vec!["Абрамов Илья"]),
                ("telephoneNumber", vec!["1001"]),
            ],
        )
        .with_entry(
            "uid=ivanov,cn=guest,ou=users,dc=example,dc=com",
            [
                ("objectClass", vec!["person"]),
                ("cn", vec!["Иванов Пётр"]),
                ("mail", vec!["ivanov@example.com"]),
            ],
        )
        .with_entry(
            "cn=Printer,ou=devices,dc=example,dc=com",
            [("objectClass", vec!["device"]), ("cn", vec!["Printer"])],
        )
}

pub fn app(directory: &InMemoryDirectory) -> Router {
    app_with_config(directory, test_config())
}

pub fn app_with_config(directory: &InMemoryDirectory, config: DirectoryConfig) -> Router {
    init_test_logging();
    let service = DirectoryService::new(Directory::new(Arc::new(directory.clone()), config));
    let authorizer = BearerTokenAuthorizer::new(Some(API_TOKEN.to_string()), "api-token");
    api_router(ApiState::new(service, Arc::new(authorizer)).with_max_import_rows(50))
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: Value, authorized: bool) -> Request<Body> {
    post(uri, "application/json", body.to_string(), authorized)
}

pub fn post(uri: &str, content_type: &str, body: impl Into<Body>, authorized: bool) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type);
    if authorized {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {API_TOKEN}"));
    }
    builder.body(body.into()).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
