//! Connection Manager
//!
//! A session is one bound directory connection. Sessions are opened per
//! operation through a [`DirectoryConnector`] and owned by a
//! [`SessionGuard`], which enforces per-operation deadlines and guarantees
//! the connection is closed on every exit path.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{DirectoryConfig, SearchScope};
use crate::entry::RawEntry;
use crate::error::{DirectoryError, DirectoryResult, Operation};
use crate::record::AttributeChange;

/// Identity and credential used for a simple bind.
#[derive(Clone)]
pub struct BindCredentials {
    pub identity: String,
    pub credential: String,
}

impl BindCredentials {
    pub fn new(identity: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            credential: credential.into(),
        }
    }

    /// The configured service identity.
    pub fn service(config: &DirectoryConfig) -> Self {
        Self::new(
            config.bind_dn.clone(),
            config.bind_password.clone().unwrap_or_default(),
        )
    }
}

impl std::fmt::Debug for BindCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindCredentials")
            .field("identity", &self.identity)
            .field("credential", &"***REDACTED***")
            .finish()
    }
}

/// One search against the directory.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub base_dn: String,
    pub filter: String,
    pub scope: SearchScope,
    pub attributes: Vec<String>,
    /// Hard deadline for the whole search, including all pages.
    pub timeout: Duration,
    /// Entries per page; 0 requests everything in one response.
    pub page_size: i32,
}

/// Attributes of an entry to create, in write order.
pub type NewEntryAttributes = Vec<(String, Vec<String>)>;

/// Opens bound sessions.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Connect and bind. A wrong credential or unreachable host is a
    /// [`DirectoryError::Bind`].
    ///
    /// The future may be dropped at any await point (deadline or caller
    /// cancellation); implementations must not leak the connection then.
    async fn connect(&self, credentials: &BindCredentials)
        -> DirectoryResult<Box<dyn DirectorySession>>;
}

/// A bound directory session.
#[async_trait]
pub trait DirectorySession: Send {
    async fn search(&mut self, request: &SearchRequest) -> DirectoryResult<Vec<RawEntry>>;

    async fn add(&mut self, dn: &str, attributes: &NewEntryAttributes) -> DirectoryResult<()>;

    async fn modify(&mut self, dn: &str, changes: &[AttributeChange]) -> DirectoryResult<()>;

    async fn delete(&mut self, dn: &str) -> DirectoryResult<()>;

    /// Graceful close.
    async fn unbind(&mut self) -> DirectoryResult<()>;

    /// Forceful close, for paths where awaiting is impossible.
    fn abort(&mut self);
}

/// Run `future`, failing with a timeout for `operation` once `timeout` elapses.
pub async fn with_deadline<T, F>(operation: Operation, timeout: Duration, future: F) -> DirectoryResult<T>
where
    F: Future<Output = DirectoryResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(DirectoryError::timeout(operation, timeout)),
    }
}

/// Open a bound session within `timeout`.
pub async fn open_session(
    connector: &dyn DirectoryConnector,
    credentials: &BindCredentials,
    timeout: Duration,
) -> DirectoryResult<SessionGuard> {
    let session = with_deadline(Operation::Bind, timeout, connector.connect(credentials)).await?;
    debug!(identity = %credentials.identity, "Directory session opened");
    Ok(SessionGuard::new(session, timeout))
}

/// Connector plus the configuration every engine reads.
#[derive(Clone)]
pub struct Directory {
    connector: Arc<dyn DirectoryConnector>,
    config: Arc<DirectoryConfig>,
}

impl Directory {
    pub fn new(connector: Arc<dyn DirectoryConnector>, config: DirectoryConfig) -> Self {
        Self {
            connector,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Open a session bound as the service identity.
    pub async fn open(&self) -> DirectoryResult<SessionGuard> {
        open_session(
            self.connector.as_ref(),
            &BindCredentials::service(&self.config),
            self.config.operation_timeout(),
        )
        .await
    }
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Owns an open session.
///
/// `release` unbinds once; later calls are no-ops. A guard dropped without
/// release (cancellation, panic) aborts the connection.
pub struct SessionGuard {
    session: Option<Box<dyn DirectorySession>>,
    operation_timeout: Duration,
}

impl SessionGuard {
    pub fn new(session: Box<dyn DirectorySession>, operation_timeout: Duration) -> Self {
        Self {
            session: Some(session),
            operation_timeout,
        }
    }

    pub fn is_released(&self) -> bool {
        self.session.is_none()
    }

    fn session(&mut self, operation: Operation, target: &str) -> DirectoryResult<&mut Box<dyn DirectorySession>> {
        self.session
            .as_mut()
            .ok_or_else(|| DirectoryError::operation(operation, target, "session already released"))
    }

    pub async fn search(&mut self, request: &SearchRequest) -> DirectoryResult<Vec<RawEntry>> {
        let session = self.session(Operation::Search, &request.base_dn)?;
        with_deadline(Operation::Search, request.timeout, session.search(request)).await
    }

    pub async fn add(&mut self, dn: &str, attributes: &NewEntryAttributes) -> DirectoryResult<()> {
        let timeout = self.operation_timeout;
        let session = self.session(Operation::Add, dn)?;
        with_deadline(Operation::Add, timeout, session.add(dn, attributes)).await
    }

    pub async fn modify(&mut self, dn: &str, changes: &[AttributeChange]) -> DirectoryResult<()> {
        let timeout = self.operation_timeout;
        let session = self.session(Operation::Modify, dn)?;
        with_deadline(Operation::Modify, timeout, session.modify(dn, changes)).await
    }

    pub async fn delete(&mut self, dn: &str) -> DirectoryResult<()> {
        let timeout = self.operation_timeout;
        let session = self.session(Operation::Delete, dn)?;
        with_deadline(Operation::Delete, timeout, session.delete(dn)).await
    }

    /// Unbind the session. Idempotent; unbind failures are logged, not returned.
    pub async fn release(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        match with_deadline(Operation::Unbind, self.operation_timeout, session.unbind()).await {
            Ok(()) => debug!("Directory session released"),
            Err(e) => {
                warn!(error = %e, "Unbind failed, aborting connection");
                session.abort();
            }
        }
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("released", &self.is_released())
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            warn!("Directory session dropped without release, aborting connection");
            session.abort();
        }
    }
}
