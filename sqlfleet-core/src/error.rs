//! Error types with comprehensive credential sanitization.
//!
//! All error types in this module ensure that connection-string passwords
//! are never exposed in error messages, logs, or any output format. Errors
//! that carry a connection descriptor always carry the redacted form.

use thiserror::Error;

/// Main error type for sqlfleet operations.
///
/// # Security
/// All error messages are sanitized to prevent credential leakage.
/// Raw connection strings and passwords are never included in error output.
#[derive(Debug, Error)]
pub enum SqlFleetError {
    /// Query text references substitution variables with no supplied value.
    ///
    /// Raised at request-construction time, before any dispatch. Never retried.
    #[error("query has unbound variables; supply values for: {names:?}")]
    UnboundVariable {
        /// Placeholder names with no substitution.
        names: Vec<String>,
    },

    /// The remote executor reported a SQL error or wrote to its error stream.
    ///
    /// Retried per the request's retry budget.
    #[error("remote execution failed against '{descriptor}': {message}")]
    RemoteExecution {
        /// Redacted connection descriptor for the failed target.
        descriptor: String,
        /// Captured SQL or transport error text.
        message: String,
    },

    /// The executor succeeded but its output could not be interpreted as the
    /// requested shape. Never retried.
    #[error("failed to interpret executor output against '{descriptor}': {context}")]
    ResultParse {
        /// Redacted connection descriptor for the target.
        descriptor: String,
        /// What could not be interpreted.
        context: String,
    },

    /// Connection descriptor lacks any recognizable authentication clause.
    #[error("connection string declares no authentication (no credentials or integrated security)")]
    MissingAuthentication,

    /// Connection descriptor has neither a user/password pair nor integrated
    /// security.
    #[error("connection string has no credentials: {context}")]
    MissingCredentials {
        /// What was searched and not found.
        context: String,
    },

    /// The query returned no tables but the caller demanded a table.
    #[error("no tables were returned by the query")]
    NoTableReturned,

    /// The query returned no rows but the caller demanded a row.
    #[error("no rows were returned by the query")]
    NoRowReturned,

    /// Neither backup destination has adequate room for the pending backup.
    #[error(
        "insufficient backup space: {primary} has {primary_free_percent:.2}% free \
         (threshold {threshold_percent}%), {alternate} has {alternate_free_mb:.2} MB free after backup"
    )]
    InsufficientBackupSpace {
        /// Primary backup directory.
        primary: String,
        /// Measured primary free-space percentage.
        primary_free_percent: f64,
        /// Required free-space percentage on the primary.
        threshold_percent: f64,
        /// Alternate UNC destination.
        alternate: String,
        /// Alternate free space after subtracting the pending backup size.
        alternate_free_mb: f64,
    },

    /// Current identity cannot read server settings required for backups.
    #[error("insufficient privileges: {required}")]
    InsufficientPrivileges {
        /// The access that the current identity lacks.
        required: String,
    },

    /// Configuration or validation error.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the invalid configuration or input.
        message: String,
    },

    /// I/O operation failed (scratch script handling, executor spawn).
    #[error("I/O operation failed: {context}")]
    Io {
        /// What was being done when the operation failed.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results with `SqlFleetError`.
pub type Result<T> = std::result::Result<T, SqlFleetError>;

impl SqlFleetError {
    /// Creates a remote-execution error carrying a redacted descriptor.
    pub fn remote_execution(descriptor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteExecution {
            descriptor: descriptor.into(),
            message: message.into(),
        }
    }

    /// Creates a result-parse error carrying a redacted descriptor.
    pub fn result_parse(descriptor: impl Into<String>, context: impl Into<String>) -> Self {
        Self::ResultParse {
            descriptor: descriptor.into(),
            context: context.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an insufficient-privileges error.
    pub fn insufficient_privileges(required: impl Into<String>) -> Self {
        Self::InsufficientPrivileges {
            required: required.into(),
        }
    }

    /// Creates an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// True when the failure is transient and eligible for retry.
    ///
    /// Only remote-execution and I/O failures are retried; structural
    /// failures (unbound variables, parse errors, missing auth) surface
    /// immediately because retrying cannot change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteExecution { .. } | Self::Io { .. })
    }
}
