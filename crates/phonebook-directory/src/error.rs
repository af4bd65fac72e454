//! Directory client error types
//!
//! Error taxonomy with systemic/local and retryable classification.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Directory operation kind, carried by operation and timeout errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Bind,
    Search,
    Add,
    Modify,
    Delete,
    Unbind,
    /// A whole request pipeline (query or reconciliation batch).
    Request,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Connect => "connect",
            Operation::Bind => "bind",
            Operation::Search => "search",
            Operation::Add => "add",
            Operation::Modify => "modify",
            Operation::Delete => "delete",
            Operation::Unbind => "unbind",
            Operation::Request => "request",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error that can occur while talking to the directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Required settings are missing or invalid. Nothing was attempted.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// The directory could not be reached or rejected the service credential.
    #[error("bind failed: {message}")]
    Bind {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A search/add/modify/delete failed for a specific target.
    #[error("{operation} failed for '{target}': {message}")]
    Operation {
        operation: Operation,
        target: String,
        /// LDAP result code, when the server answered.
        result_code: Option<u32>,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A deadline expired before the directory answered.
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: Operation, timeout_ms: u64 },

    /// Malformed input record from the transport layer.
    #[error("invalid input: {message}")]
    Parse { message: String },
}

/// Result alias used throughout the directory core.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

impl DirectoryError {
    /// Systemic errors abort the remaining work of a query or batch.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            DirectoryError::Configuration { .. } | DirectoryError::Bind { .. }
        )
    }

    /// Only timeouts are worth retrying by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DirectoryError::Timeout { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::Configuration { .. } => "CONFIGURATION_ERROR",
            DirectoryError::Bind { .. } => "BIND_ERROR",
            DirectoryError::Operation { .. } => "OPERATION_ERROR",
            DirectoryError::Timeout { .. } => "TIMEOUT",
            DirectoryError::Parse { .. } => "PARSE_ERROR",
        }
    }

    // Convenience constructors

    pub fn configuration(message: impl Into<String>) -> Self {
        DirectoryError::Configuration {
            message: message.into(),
        }
    }

    pub fn bind(message: impl Into<String>) -> Self {
        DirectoryError::Bind {
            message: message.into(),
            source: None,
        }
    }

    pub fn bind_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::Bind {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Client-side failure with no server result code.
    pub fn operation(
        operation: Operation,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        DirectoryError::Operation {
            operation,
            target: target.into(),
            result_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// The server answered with a non-success result code.
    pub fn rejected(
        operation: Operation,
        target: impl Into<String>,
        result_code: u32,
        message: impl Into<String>,
    ) -> Self {
        DirectoryError::Operation {
            operation,
            target: target.into(),
            result_code: Some(result_code),
            message: message.into(),
            source: None,
        }
    }

    pub fn operation_with_source(
        operation: Operation,
        target: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::Operation {
            operation,
            target: target.into(),
            result_code: None,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn timeout(operation: Operation, timeout: Duration) -> Self {
        DirectoryError::Timeout {
            operation,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        DirectoryError::Parse {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_systemic_classification() {
        assert!(DirectoryError::configuration("missing LDAP_URI").is_systemic());
        assert!(DirectoryError::bind("invalid credentials").is_systemic());
        assert!(!DirectoryError::rejected(Operation::Modify, "cn=x", 32, "no such object")
            .is_systemic());
        assert!(!DirectoryError::timeout(Operation::Search, Duration::from_secs(3)).is_systemic());
        assert!(!DirectoryError::parse("missing cn").is_systemic());
    }

    #[test]
    fn test_only_timeout_is_retryable() {
        assert!(DirectoryError::timeout(Operation::Bind, Duration::from_millis(500)).is_retryable());
        assert!(!DirectoryError::bind("unreachable").is_retryable());
        assert!(!DirectoryError::rejected(Operation::Add, "cn=x", 68, "exists").is_retryable());
    }

    #[test]
    fn test_display_messages() {
        let err = DirectoryError::rejected(
            Operation::Modify,
            "cn=Иван Петров,ou=users,dc=example,dc=com",
            32,
            "No such object",
        );
        assert_eq!(
            err.to_string(),
            "modify failed for 'cn=Иван Петров,ou=users,dc=example,dc=com': No such object"
        );

        let err = DirectoryError::timeout(Operation::Request, Duration::from_secs(5));
        assert_eq!(err.to_string(), "request timed out after 5000 ms");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(DirectoryError::bind("x").error_code(), "BIND_ERROR");
        assert_eq!(
            DirectoryError::timeout(Operation::Search, Duration::ZERO).error_code(),
            "TIMEOUT"
        );
        assert_eq!(DirectoryError::parse("x").error_code(), "PARSE_ERROR");
    }
}
