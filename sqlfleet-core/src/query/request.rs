//! Query request construction and `sqlcmd`-style variable substitution.
//!
//! Requests carry the query text, named `$(variable)` substitutions, the
//! desired result shape, and the retry/timeout policy. Unresolved
//! placeholders are a request-construction error, caught before any
//! dispatch (variables inside `--` comments are excluded from the check).

use crate::{Result, error::SqlFleetError};
use regex::{NoExpand, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

/// Desired result shape for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnShape {
    /// The full result set, all tables.
    #[default]
    AllTables,
    /// The first table's rows; an error if no table was returned.
    FirstTable,
    /// The first row of the first table; an error if absent.
    FirstRow,
    /// The first column of the first row; `None` (not an error) if no row.
    Scalar,
}

/// A single query execution request.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use sqlfleet_core::query::{QueryRequest, ReturnShape};
///
/// let request = QueryRequest::new("SELECT name FROM sys.databases WHERE name = '$(databasename)'")
///     .with_value("databasename", "orders")
///     .with_shape(ReturnShape::Scalar)
///     .read_only()
///     .with_retries(3, Duration::from_secs(5));
///
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Query text, possibly containing `$(name)` placeholders.
    pub query: String,
    /// Named substitutions applied before dispatch.
    pub values: BTreeMap<String, String>,
    /// Desired result shape.
    pub shape: ReturnShape,
    /// Advertise read intent before dispatch (AlwaysOn readable secondaries).
    pub read_only: bool,
    /// Timeout forwarded to the remote executor.
    pub timeout: Duration,
    /// Additional attempts after the first failure; `None` inherits the
    /// gateway default. `Some(0)` explicitly disables retries.
    pub retries: Option<u32>,
    /// Sleep between attempts; `None` inherits the gateway default.
    pub retry_delay: Option<Duration>,
    /// Waive the unresolved-placeholder check.
    pub allow_missing_values: bool,
}

/// Default executor timeout, matching long-running backup/restore commands.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(172_800);

impl QueryRequest {
    /// Creates a request with no substitutions and the default policy:
    /// full result set, retry policy inherited from the gateway.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            values: BTreeMap::new(),
            shape: ReturnShape::AllTables,
            read_only: false,
            timeout: DEFAULT_TIMEOUT,
            retries: None,
            retry_delay: None,
            allow_missing_values: false,
        }
    }

    /// Builder method to supply one named substitution.
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Builder method to supply several substitutions at once.
    pub fn with_values<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.values
            .extend(values.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Builder method to set the result shape.
    pub const fn with_shape(mut self, shape: ReturnShape) -> Self {
        self.shape = shape;
        self
    }

    /// Builder method to request read-intent routing.
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Builder method to set the executor timeout.
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder method to set the retry budget and delay, overriding the
    /// gateway defaults. A budget of zero disables retries outright.
    pub const fn with_retries(mut self, retries: u32, retry_delay: Duration) -> Self {
        self.retries = Some(retries);
        self.retry_delay = Some(retry_delay);
        self
    }

    /// Builder method to waive the unresolved-placeholder check.
    pub const fn allow_missing_values(mut self) -> Self {
        self.allow_missing_values = true;
        self
    }

    /// Applies the named substitutions to the query text.
    ///
    /// Placeholder names are matched case-insensitively, the way `sqlcmd`
    /// variables behave. Values are inserted literally.
    pub fn substituted_query(&self) -> String {
        let mut query = self.query.clone();
        for (name, value) in &self.values {
            #[allow(clippy::expect_used)] // escaped name cannot produce an invalid pattern
            let placeholder =
                Regex::new(&format!(r"(?i)\$\({}\)", regex::escape(name)))
                    .expect("Invalid placeholder pattern");
            query = placeholder.replace_all(&query, NoExpand(value)).into_owned();
        }
        query
    }

    /// Verifies that no unresolved placeholders remain after substitution.
    ///
    /// # Errors
    /// Returns [`SqlFleetError::UnboundVariable`] listing the unresolved
    /// names, unless the request waives the check. Placeholders appearing
    /// after `--` on a line are treated as commented out and ignored.
    pub fn validate(&self) -> Result<()> {
        if self.allow_missing_values {
            return Ok(());
        }
        let unresolved = unresolved_placeholders(&self.substituted_query());
        if unresolved.is_empty() {
            Ok(())
        } else {
            Err(SqlFleetError::UnboundVariable { names: unresolved })
        }
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)] // pattern is a literal, compiled once
    PATTERN.get_or_init(|| Regex::new(r"\$\(([0-9A-Za-z_]+)\)").expect("Invalid variable pattern"))
}

/// Collects distinct unresolved `$(name)` placeholders, skipping any that
/// appear inside `--` line comments.
fn unresolved_placeholders(query: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in query.lines() {
        let effective = line.split("--").next().unwrap_or(line);
        for captures in placeholder_pattern().captures_iter(effective) {
            if let Some(name) = captures.get(1) {
                let name = name.as_str().to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]

    use super::*;

    #[test]
    fn test_substitution_is_case_insensitive() {
        let request = QueryRequest::new("BACKUP DATABASE [$(BkupDbName)] TO $(bkupfiles)")
            .with_value("bkupdbname", "orders")
            .with_value("BKUPFILES", "DISK = N'F:\\orders.bak'");
        let substituted = request.substituted_query();
        assert_eq!(
            substituted,
            "BACKUP DATABASE [orders] TO DISK = N'F:\\orders.bak'"
        );
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_unbound_variables_fail_fast() {
        let request = QueryRequest::new("RESTORE DATABASE [$(dbname)] FROM $(bkupfiles)")
            .with_value("dbname", "orders");
        match request.validate() {
            Err(SqlFleetError::UnboundVariable { names }) => {
                assert_eq!(names, vec!["bkupfiles".to_string()]);
            }
            other => panic!("expected UnboundVariable, got {other:?}"),
        }
    }

    #[test]
    fn test_commented_variables_are_ignored() {
        let request = QueryRequest::new(
            "SELECT 1 -- uses $(legacyvar) only in this comment\nSELECT '$(realvar)'",
        );
        match request.validate() {
            Err(SqlFleetError::UnboundVariable { names }) => {
                assert_eq!(names, vec!["realvar".to_string()]);
            }
            other => panic!("expected UnboundVariable, got {other:?}"),
        }
    }

    #[test]
    fn test_allow_missing_values_waives_check() {
        let request = QueryRequest::new("SELECT '$(unbound)'").allow_missing_values();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_substitution_values_are_literal() {
        // Values containing regex/expansion metacharacters are inserted verbatim.
        let request = QueryRequest::new("SELECT '$(v)'").with_value("v", "a$1\\d+${x}");
        assert_eq!(request.substituted_query(), "SELECT 'a$1\\d+${x}'");
    }
}
