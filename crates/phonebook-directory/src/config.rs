//! Directory client configuration
//!
//! Connection, search and provisioning settings, loadable from the
//! environment (`LDAP_*` variables) with fail-fast validation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, DirectoryResult};

/// Base predicate used when `LDAP_BASE_FILTER` is not set: enabled AD person accounts.
pub const DEFAULT_BASE_FILTER: &str =
    "(&(objectCategory=person)(objectClass=user)(!(userAccountControl:1.2.840.113556.1.4.803:=2)))";

/// Attributes requested when `LDAP_ATTRS` is not set.
pub const DEFAULT_SEARCH_ATTRIBUTES: &[&str] = &[
    "cn",
    "sn",
    "givenName",
    "displayName",
    "uid",
    "sAMAccountName",
    "mail",
    "telephoneNumber",
    "ipPhone",
    "mobile",
    "title",
    "department",
    "departmentNumber",
    "company",
];

/// Search scope below the search base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchScope {
    /// Immediate children of the base only.
    #[serde(alias = "one")]
    SingleLevel,
    /// The whole subtree below the base.
    #[default]
    #[serde(alias = "sub")]
    Subtree,
}

impl SearchScope {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "one" | "onelevel" | "single-level" | "single_level" => Some(SearchScope::SingleLevel),
            "sub" | "subtree" => Some(SearchScope::Subtree),
            _ => None,
        }
    }
}

/// Timeouts and batch tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Per-operation timeout (connect, bind, search, add, modify, delete, unbind).
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Overall deadline for a search request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Overall deadline for a reconciliation batch.
    #[serde(default = "default_reconcile_timeout_ms")]
    pub reconcile_timeout_ms: u64,

    /// Page size for paged search results (0 disables paging).
    #[serde(default = "default_page_size")]
    pub page_size: i32,

    /// Number of records reconciled concurrently, each on its own session.
    #[serde(default = "default_reconcile_concurrency")]
    pub reconcile_concurrency: usize,
}

fn default_operation_timeout_ms() -> u64 {
    3_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_reconcile_timeout_ms() -> u64 {
    300_000
}

fn default_page_size() -> i32 {
    500
}

fn default_reconcile_concurrency() -> usize {
    1
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            operation_timeout_ms: default_operation_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            reconcile_timeout_ms: default_reconcile_timeout_ms(),
            page_size: default_page_size(),
            reconcile_concurrency: default_reconcile_concurrency(),
        }
    }
}

/// Configuration for the directory client.
#[derive(Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Directory URI (`ldap://host:389` or `ldaps://host:636`).
    pub uri: String,

    /// Base DN for all operations (e.g., "dc=example,dc=com").
    pub base_dn: String,

    /// Service identity used for every bind.
    pub bind_dn: String,

    /// Service credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Search base override; defaults to `base_dn`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_base: Option<String>,

    #[serde(default)]
    pub search_scope: SearchScope,

    /// Attributes requested on search. Empty means the built-in default set.
    #[serde(default)]
    pub attributes: Vec<String>,

    /// Trusted base predicate, never escaped.
    #[serde(default = "default_base_filter")]
    pub base_filter: String,

    /// User container relative to `base_dn` (e.g., "ou=users").
    #[serde(default = "default_user_container")]
    pub user_container: String,

    /// Object classes written on create.
    #[serde(default = "default_user_object_classes")]
    pub user_object_classes: Vec<String>,

    /// Upgrade plain LDAP connections with STARTTLS.
    #[serde(default)]
    pub use_starttls: bool,

    /// Verify the server certificate on TLS connections.
    #[serde(default = "default_true")]
    pub tls_verify: bool,

    #[serde(default)]
    pub connection: ConnectionSettings,
}

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("uri", &self.uri)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("search_base", &self.search_base)
            .field("search_scope", &self.search_scope)
            .field("attributes", &self.attributes)
            .field("base_filter", &self.base_filter)
            .field("user_container", &self.user_container)
            .field("user_object_classes", &self.user_object_classes)
            .field("use_starttls", &self.use_starttls)
            .field("tls_verify", &self.tls_verify)
            .field("connection", &self.connection)
            .finish()
    }
}

fn default_base_filter() -> String {
    DEFAULT_BASE_FILTER.to_string()
}

fn default_user_container() -> String {
    "ou=users".to_string()
}

fn default_user_object_classes() -> Vec<String> {
    vec![
        "inetOrgPerson".to_string(),
        "organizationalPerson".to_string(),
        "person".to_string(),
        "top".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

impl DirectoryConfig {
    /// Create a new config with required fields and defaults elsewhere.
    pub fn new(
        uri: impl Into<String>,
        base_dn: impl Into<String>,
        bind_dn: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            base_dn: base_dn.into(),
            bind_dn: bind_dn.into(),
            bind_password: None,
            search_base: None,
            search_scope: SearchScope::default(),
            attributes: Vec::new(),
            base_filter: default_base_filter(),
            user_container: default_user_container(),
            user_object_classes: default_user_object_classes(),
            use_starttls: false,
            tls_verify: true,
            connection: ConnectionSettings::default(),
        }
    }

    /// Set bind password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    pub fn with_search_base(mut self, base: impl Into<String>) -> Self {
        self.search_base = Some(base.into());
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.search_scope = scope;
        self
    }

    pub fn with_base_filter(mut self, filter: impl Into<String>) -> Self {
        self.base_filter = filter.into();
        self
    }

    pub fn with_user_container(mut self, container: impl Into<String>) -> Self {
        self.user_container = container.into();
        self
    }

    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionSettings) -> Self {
        self.connection = connection;
        self
    }

    /// Load from process environment variables.
    pub fn from_env() -> DirectoryResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (environment-style names).
    pub fn from_lookup<F>(lookup: F) -> DirectoryResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| {
                DirectoryError::configuration(format!("missing required setting {key}"))
            })
        };

        let uri = require("LDAP_URI")?;
        let base_dn = require("LDAP_BASE_DN")?;
        let bind_dn = match get("LDAP_BIND_DN") {
            Some(identity) => normalize_bind_identity(&identity, &base_dn),
            None => format!("cn=admin,{base_dn}"),
        };
        let bind_password = get("LDAP_BIND_PASSWORD").or_else(|| get("LDAP_ADMIN_PASSWORD"));

        let mut config = Self::new(uri, base_dn, bind_dn);
        config.bind_password = bind_password;
        config.search_base = get("LDAP_SEARCH_BASE_DN");

        if let Some(scope) = get("LDAP_SEARCH_SCOPE") {
            config.search_scope = SearchScope::parse(&scope).ok_or_else(|| {
                DirectoryError::configuration(format!(
                    "LDAP_SEARCH_SCOPE must be 'one' or 'sub', got '{scope}'"
                ))
            })?;
        }
        if let Some(attrs) = get("LDAP_ATTRS") {
            config.attributes = attrs
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(filter) = get("LDAP_BASE_FILTER") {
            config.base_filter = filter;
        }
        if let Some(container) = get("LDAP_USER_OU") {
            config.user_container = container;
        }
        if let Some(flag) = get("LDAP_STARTTLS") {
            config.use_starttls = parse_flag("LDAP_STARTTLS", &flag)?;
        }
        if let Some(flag) = get("LDAP_TLS_NO_VERIFY") {
            config.tls_verify = !parse_flag("LDAP_TLS_NO_VERIFY", &flag)?;
        }

        let conn = &mut config.connection;
        if let Some(v) = get("LDAP_OPERATION_TIMEOUT_MS") {
            conn.operation_timeout_ms = parse_number("LDAP_OPERATION_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("LDAP_REQUEST_TIMEOUT_MS") {
            conn.request_timeout_ms = parse_number("LDAP_REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("LDAP_RECONCILE_TIMEOUT_MS") {
            conn.reconcile_timeout_ms = parse_number("LDAP_RECONCILE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("LDAP_PAGE_SIZE") {
            conn.page_size = parse_number("LDAP_PAGE_SIZE", &v)?;
        }
        if let Some(v) = get("LDAP_RECONCILE_CONCURRENCY") {
            conn.reconcile_concurrency = parse_number("LDAP_RECONCILE_CONCURRENCY", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DirectoryResult<()> {
        let uri = self.uri.to_lowercase();
        if !(uri.starts_with("ldap://") || uri.starts_with("ldaps://")) {
            return Err(DirectoryError::configuration(format!(
                "directory URI must start with ldap:// or ldaps://, got '{}'",
                self.uri
            )));
        }
        if self.base_dn.trim().is_empty() {
            return Err(DirectoryError::configuration("base DN is required"));
        }
        if self.bind_dn.trim().is_empty() {
            return Err(DirectoryError::configuration("bind identity is required"));
        }
        if self.bind_password.as_deref().map_or(true, str::is_empty) {
            return Err(DirectoryError::configuration("bind credential is required"));
        }
        if self.use_starttls && uri.starts_with("ldaps://") {
            return Err(DirectoryError::configuration(
                "STARTTLS cannot be combined with an ldaps:// URI",
            ));
        }
        if self.connection.operation_timeout_ms == 0 {
            return Err(DirectoryError::configuration(
                "operation timeout must be greater than zero",
            ));
        }
        if self.connection.request_timeout_ms <= self.connection.operation_timeout_ms {
            return Err(DirectoryError::configuration(format!(
                "request timeout ({} ms) must be longer than the operation timeout ({} ms)",
                self.connection.request_timeout_ms, self.connection.operation_timeout_ms
            )));
        }
        if self.connection.reconcile_timeout_ms == 0 {
            return Err(DirectoryError::configuration(
                "reconcile timeout must be greater than zero",
            ));
        }
        if self.connection.page_size < 0 {
            return Err(DirectoryError::configuration("page size cannot be negative"));
        }
        if self.connection.reconcile_concurrency == 0 {
            return Err(DirectoryError::configuration(
                "reconcile concurrency must be at least 1",
            ));
        }
        if self.user_object_classes.is_empty() {
            return Err(DirectoryError::configuration(
                "at least one user object class is required",
            ));
        }
        Ok(())
    }

    /// DN searched by the query engine.
    #[must_use]
    pub fn search_base(&self) -> &str {
        self.search_base.as_deref().unwrap_or(&self.base_dn)
    }

    /// Full DN of the container new users are created in.
    #[must_use]
    pub fn user_container_dn(&self) -> String {
        if self.user_container.trim().is_empty() {
            self.base_dn.clone()
        } else {
            format!("{},{}", self.user_container, self.base_dn)
        }
    }

    /// Attributes to request on search, falling back to the default set.
    #[must_use]
    pub fn search_attributes(&self) -> Vec<String> {
        if self.attributes.is_empty() {
            DEFAULT_SEARCH_ATTRIBUTES.iter().map(|a| a.to_string()).collect()
        } else {
            self.attributes.clone()
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.operation_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.request_timeout_ms)
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.reconcile_timeout_ms)
    }
}

/// Turn a `DOMAIN\user` logon name into a `user@domain` UPN using the base DN's DC parts.
///
/// DNs and UPNs pass through unchanged.
pub fn normalize_bind_identity(identity: &str, base_dn: &str) -> String {
    let lower = identity.to_lowercase();
    if lower.contains("dc=") || lower.contains("cn=") || lower.contains("ou=") {
        return identity.to_string();
    }
    if let Some((_, user)) = identity.split_once('\\') {
        if let Some(domain) = base_dn_to_domain(base_dn) {
            if !user.is_empty() {
                return format!("{user}@{domain}");
            }
        }
    }
    identity.to_string()
}

fn base_dn_to_domain(base_dn: &str) -> Option<String> {
    let parts: Vec<String> = base_dn
        .split(',')
        .filter_map(|rdn| {
            let (attr, value) = rdn.split_once('=')?;
            attr.trim()
                .eq_ignore_ascii_case("dc")
                .then(|| value.trim().to_lowercase())
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join("."))
}

fn parse_flag(var: &str, value: &str) -> DirectoryResult<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(DirectoryError::configuration(format!(
            "{var} must be a boolean, got '{other}'"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, value: &str) -> DirectoryResult<T> {
    value
        .parse()
        .map_err(|_| DirectoryError::configuration(format!("{var} must be a number, got '{value}'")))
}
