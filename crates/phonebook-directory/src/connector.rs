//! LDAP connector
//!
//! [`DirectoryConnector`] implementation over `ldap3`. Every session owns its
//! own connection and driver task; nothing is cached between sessions.

use std::collections::HashSet;

use async_trait::async_trait;
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Mod, Scope, SearchEntry};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::{DirectoryConfig, SearchScope};
use crate::entry::{AttributeValue, RawAttributes, RawEntry};
use crate::error::{DirectoryError, DirectoryResult, Operation};
use crate::record::AttributeChange;
use crate::session::{
    BindCredentials, DirectoryConnector, DirectorySession, NewEntryAttributes, SearchRequest,
};

/// LDAP result code for a rejected credential.
const INVALID_CREDENTIALS: u32 = 49;

/// Connects to an LDAP/Active Directory server.
pub struct LdapDirectory {
    config: DirectoryConfig,
}

impl LdapDirectory {
    /// Create a connector with the given configuration.
    pub fn new(config: DirectoryConfig) -> DirectoryResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    fn settings(&self) -> LdapConnSettings {
        LdapConnSettings::new()
            .set_conn_timeout(self.config.operation_timeout())
            .set_starttls(self.config.use_starttls)
            .set_no_tls_verify(!self.config.tls_verify)
    }
}

impl std::fmt::Debug for LdapDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirectory")
            .field("uri", &self.config.uri)
            .field("base_dn", &self.config.base_dn)
            .finish()
    }
}

#[async_trait]
impl DirectoryConnector for LdapDirectory {
    #[instrument(skip(self, credentials), fields(identity = %credentials.identity))]
    async fn connect(
        &self,
        credentials: &BindCredentials,
    ) -> DirectoryResult<Box<dyn DirectorySession>> {
        let uri = &self.config.uri;
        debug!(uri = %uri, "Connecting to directory");

        let (conn, ldap) = LdapConnAsync::with_settings(self.settings(), uri)
            .await
            .map_err(|e| {
                DirectoryError::bind_with_source(format!("cannot reach directory at {uri}"), e)
            })?;

        let driver = tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        // Owned from here on: a dropped bind future aborts the driver.
        let mut session = LdapSession { ldap, driver };

        let result = session
            .ldap
            .simple_bind(&credentials.identity, &credentials.credential)
            .await
            .map_err(|e| DirectoryError::bind_with_source("bind request failed", e))?;

        match result.rc {
            0 => {}
            INVALID_CREDENTIALS => return Err(DirectoryError::bind("invalid credentials")),
            rc => {
                return Err(DirectoryError::bind(format!(
                    "bind rejected with result code {rc}: {}",
                    result.text
                )))
            }
        }

        debug!("Directory bind succeeded");
        Ok(Box::new(session))
    }
}

/// One bound `ldap3` connection.
struct LdapSession {
    ldap: Ldap,
    driver: JoinHandle<()>,
}

impl Drop for LdapSession {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

fn check(operation: Operation, target: &str, result: LdapResult) -> DirectoryResult<()> {
    if result.rc == 0 {
        Ok(())
    } else {
        Err(DirectoryError::rejected(
            operation,
            target,
            result.rc,
            result.text,
        ))
    }
}

fn ldap_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::SingleLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

impl From<SearchEntry> for RawEntry {
    fn from(entry: SearchEntry) -> Self {
        let attributes = entry
            .attrs
            .into_iter()
            .map(|(name, values)| (name, AttributeValue::Multi(values)))
            .collect();
        RawEntry::new(entry.dn, RawAttributes::Map(attributes))
    }
}

#[async_trait]
impl DirectorySession for LdapSession {
    #[instrument(skip(self, request), fields(base_dn = %request.base_dn))]
    async fn search(&mut self, request: &SearchRequest) -> DirectoryResult<Vec<RawEntry>> {
        let base = request.base_dn.as_str();
        let failed = |e: ldap3::LdapError| DirectoryError::operation_with_source(Operation::Search, base, e);

        let mut adapters: Vec<Box<dyn Adapter<_, _>>> = vec![Box::new(EntriesOnly::new())];
        if request.page_size > 0 {
            adapters.push(Box::new(PagedResults::new(request.page_size)));
        }

        debug!(filter = %request.filter, page_size = request.page_size, "Searching directory");

        let mut stream = self
            .ldap
            .streaming_search_with(
                adapters,
                base,
                ldap_scope(request.scope),
                &request.filter,
                request.attributes.clone(),
            )
            .await
            .map_err(failed)?;

        let mut entries = Vec::new();
        while let Some(entry) = stream.next().await.map_err(failed)? {
            entries.push(RawEntry::from(SearchEntry::construct(entry)));
        }
        check(Operation::Search, base, stream.finish().await)?;

        info!(count = entries.len(), "Directory search completed");
        Ok(entries)
    }

    #[instrument(skip(self, attributes))]
    async fn add(&mut self, dn: &str, attributes: &NewEntryAttributes) -> DirectoryResult<()> {
        let attrs: Vec<(&str, HashSet<&str>)> = attributes
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| (name.as_str(), values.iter().map(String::as_str).collect()))
            .collect();

        let result = self
            .ldap
            .add(dn, attrs)
            .await
            .map_err(|e| DirectoryError::operation_with_source(Operation::Add, dn, e))?;
        check(Operation::Add, dn, result)?;

        info!(dn = %dn, "Directory entry created");
        Ok(())
    }

    #[instrument(skip(self, changes))]
    async fn modify(&mut self, dn: &str, changes: &[AttributeChange]) -> DirectoryResult<()> {
        // An empty replace removes the attribute without failing when it is absent.
        let mods: Vec<Mod<&str>> = changes
            .iter()
            .map(|change| match change {
                AttributeChange::Replace { attribute, value } => {
                    Mod::Replace(attribute.as_str(), HashSet::from([value.as_str()]))
                }
                AttributeChange::Clear { attribute } => {
                    Mod::Replace(attribute.as_str(), HashSet::new())
                }
            })
            .collect();

        let result = self
            .ldap
            .modify(dn, mods)
            .await
            .map_err(|e| DirectoryError::operation_with_source(Operation::Modify, dn, e))?;
        check(Operation::Modify, dn, result)?;

        info!(dn = %dn, changes = changes.len(), "Directory entry updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&mut self, dn: &str) -> DirectoryResult<()> {
        let result = self
            .ldap
            .delete(dn)
            .await
            .map_err(|e| DirectoryError::operation_with_source(Operation::Delete, dn, e))?;
        check(Operation::Delete, dn, result)?;

        info!(dn = %dn, "Directory entry deleted");
        Ok(())
    }

    async fn unbind(&mut self) -> DirectoryResult<()> {
        self.ldap
            .unbind()
            .await
            .map_err(|e| DirectoryError::operation_with_source(Operation::Unbind, "", e))
    }

    fn abort(&mut self) {
        self.driver.abort();
    }
}
