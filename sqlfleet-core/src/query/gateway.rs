//! The query execution gateway: validate, rewrite, dispatch, retry, parse,
//! shape.
//!
//! Transport and SQL-level failures are retried up to the request's budget;
//! malformed output after a successful dispatch is never retried, because
//! retrying a syntactically broken result will not change the output.

use crate::connection::{self, ConnectionPart};
use crate::error::SqlFleetError;
use crate::query::executor::{ExecutorOutput, QueryExecutor};
use crate::query::request::{QueryRequest, ReturnShape};
use crate::query::result::{QueryResult, Row, ShapedResult, SqlValue};
use crate::query::GatewayConfig;
use crate::Result;
use regex::Regex;
use std::sync::{Arc, OnceLock};

/// Marker separating SQL diagnostic messages from the tabular JSON payload
/// on the executor's output stream.
const PAYLOAD_MARKER: &str = "json_tables:";

/// Gateway for executing queries through an injected [`QueryExecutor`].
pub struct QueryGateway {
    executor: Arc<dyn QueryExecutor>,
    config: GatewayConfig,
}

impl QueryGateway {
    /// Creates a gateway over the given executor and configuration.
    pub fn new(executor: Arc<dyn QueryExecutor>, config: GatewayConfig) -> Self {
        Self { executor, config }
    }

    /// The gateway's configuration.
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Executes a request and shapes the result per its return shape.
    ///
    /// # Errors
    /// - [`SqlFleetError::UnboundVariable`] before dispatch when
    ///   placeholders remain unresolved.
    /// - [`SqlFleetError::RemoteExecution`] after the retry budget is
    ///   exhausted, carrying the final failure and the redacted descriptor.
    /// - [`SqlFleetError::ResultParse`] when output cannot be interpreted
    ///   (never retried).
    /// - [`SqlFleetError::NoTableReturned`] / [`SqlFleetError::NoRowReturned`]
    ///   when the requested shape demands a non-empty result.
    pub async fn execute(
        &self,
        connection_string: &str,
        request: &QueryRequest,
    ) -> Result<ShapedResult> {
        if connection_string.trim().is_empty() {
            return Err(SqlFleetError::configuration(
                "connection string is nil or incomplete",
            ));
        }
        request.validate()?;
        let query = request.substituted_query();

        // Advertise read intent before dispatch when requested.
        let target = if request.read_only {
            connection::replace_part(connection_string, ConnectionPart::ApplicationIntent, "readonly")
        } else {
            connection_string.to_string()
        };
        let redacted = connection::redact_lossy(&target);
        tracing::debug!(descriptor = %redacted, "executing query");

        let payload = self.dispatch_with_retries(&target, &query, request, &redacted).await?;

        let result = QueryResult::from_payload(&payload)
            .map_err(|context| SqlFleetError::result_parse(redacted.clone(), context))?;
        shape_result(result, request.shape)
    }

    /// Convenience wrapper: full result set.
    pub async fn execute_tables(
        &self,
        connection_string: &str,
        request: QueryRequest,
    ) -> Result<QueryResult> {
        match self
            .execute(connection_string, &request.with_shape(ReturnShape::AllTables))
            .await?
        {
            ShapedResult::Tables(result) => Ok(result),
            _ => Err(SqlFleetError::configuration("unexpected result shape")),
        }
    }

    /// Convenience wrapper: first table's rows.
    pub async fn execute_first_table(
        &self,
        connection_string: &str,
        request: QueryRequest,
    ) -> Result<Vec<Row>> {
        match self
            .execute(connection_string, &request.with_shape(ReturnShape::FirstTable))
            .await?
        {
            ShapedResult::Rows(rows) => Ok(rows),
            _ => Err(SqlFleetError::configuration("unexpected result shape")),
        }
    }

    /// Convenience wrapper: first row of the first table.
    pub async fn execute_first_row(
        &self,
        connection_string: &str,
        request: QueryRequest,
    ) -> Result<Row> {
        match self
            .execute(connection_string, &request.with_shape(ReturnShape::FirstRow))
            .await?
        {
            ShapedResult::Row(row) => Ok(row),
            _ => Err(SqlFleetError::configuration("unexpected result shape")),
        }
    }

    /// Convenience wrapper: scalar value, `None` when no row exists.
    pub async fn execute_scalar(
        &self,
        connection_string: &str,
        request: QueryRequest,
    ) -> Result<Option<SqlValue>> {
        match self
            .execute(connection_string, &request.with_shape(ReturnShape::Scalar))
            .await?
        {
            ShapedResult::Scalar(value) => Ok(value),
            _ => Err(SqlFleetError::configuration("unexpected result shape")),
        }
    }

    /// Dispatches with the request's retry policy, returning the raw JSON
    /// payload from a successful attempt.
    async fn dispatch_with_retries(
        &self,
        target: &str,
        query: &str,
        request: &QueryRequest,
        redacted: &str,
    ) -> Result<String> {
        let retries = request.retries.unwrap_or(self.config.default_retries);
        let retry_delay = request
            .retry_delay
            .unwrap_or(self.config.default_retry_delay);
        let mut attempt: u32 = 0;
        loop {
            match self.dispatch_once(target, query, request, redacted).await {
                Ok(payload) => return Ok(payload),
                Err(error) if error.is_retryable() && attempt < retries => {
                    attempt += 1;
                    tracing::info!(
                        attempt,
                        retries,
                        delay_secs = retry_delay.as_secs(),
                        "query failed; retrying: {error}"
                    );
                    tokio::time::sleep(retry_delay).await;
                }
                Err(error) => {
                    if retries > 0 && error.is_retryable() {
                        tracing::warn!(retries, "all retries attempted; giving up");
                    }
                    return Err(error);
                }
            }
        }
    }

    /// One dispatch attempt: run the executor and classify its streams.
    async fn dispatch_once(
        &self,
        target: &str,
        query: &str,
        request: &QueryRequest,
        redacted: &str,
    ) -> Result<String> {
        let output = self.executor.run(target, query, request.timeout).await?;
        classify_output(output, redacted)
    }
}

/// Splits executor output into diagnostic messages and payload, treating a
/// non-empty error stream or a severity-11-through-25 message as a hard
/// failure carrying the redacted descriptor.
fn classify_output(output: ExecutorOutput, redacted: &str) -> Result<String> {
    if !output.stderr.trim().is_empty() {
        return Err(SqlFleetError::remote_execution(
            redacted,
            output.stderr.trim().to_string(),
        ));
    }

    let (messages, payload) = output
        .stdout
        .split_once(PAYLOAD_MARKER)
        .map_or((output.stdout.as_str(), None), |(messages, payload)| {
            (messages, Some(payload))
        });

    let messages = messages.trim();
    if severity_pattern().is_match(messages) {
        return Err(SqlFleetError::remote_execution(redacted, messages.to_string()));
    }
    if !messages.is_empty() {
        tracing::info!("SQL message: {messages}");
    }

    match payload {
        Some(payload) => Ok(payload.trim().to_string()),
        None if output.success => Ok(String::new()),
        None => Err(SqlFleetError::remote_execution(
            redacted,
            "query helper exited with failure and produced no payload".to_string(),
        )),
    }
}

/// Pattern for SQL errors with severity 11 through 25, which abort the
/// statement or connection.
fn severity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)] // pattern is a literal, compiled once
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)error \d+, severity (1[1-9]|2[0-5])").expect("Invalid severity pattern")
    })
}

/// Shapes a parsed result per the requested return shape.
fn shape_result(result: QueryResult, shape: ReturnShape) -> Result<ShapedResult> {
    match shape {
        ReturnShape::AllTables => Ok(ShapedResult::Tables(result)),
        ReturnShape::FirstTable => result
            .first_table()
            .map(|rows| ShapedResult::Rows(rows.to_vec()))
            .ok_or(SqlFleetError::NoTableReturned),
        ReturnShape::FirstRow => {
            let rows = result.first_table().ok_or(SqlFleetError::NoTableReturned)?;
            rows.first()
                .map(|row| ShapedResult::Row(row.clone()))
                .ok_or(SqlFleetError::NoRowReturned)
        }
        ReturnShape::Scalar => {
            let rows = result.first_table().ok_or(SqlFleetError::NoTableReturned)?;
            Ok(ShapedResult::Scalar(
                rows.first().and_then(Row::first_value).cloned(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn output(stdout: &str) -> ExecutorOutput {
        ExecutorOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            success: true,
        }
    }

    #[test]
    fn test_classify_splits_messages_from_payload() {
        let payload = classify_output(
            output("Processed 3 pages.\njson_tables:{ \"Table\": [] }"),
            "server=s;",
        )
        .unwrap();
        assert_eq!(payload, "{ \"Table\": [] }");
    }

    #[test]
    fn test_classify_stderr_is_hard_failure() {
        let failed = ExecutorOutput {
            stdout: String::new(),
            stderr: "Login failed for user".to_string(),
            success: false,
        };
        match classify_output(failed, "server=s;password=****;") {
            Err(SqlFleetError::RemoteExecution { descriptor, message }) => {
                assert_eq!(descriptor, "server=s;password=****;");
                assert!(message.contains("Login failed"));
            }
            other => panic!("expected RemoteExecution, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_severity_pattern() {
        for message in [
            "Msg 50000, Error 50000, Severity 16, State 1",
            "error 823, severity 24: I/O error detected",
        ] {
            assert!(
                classify_output(output(message), "server=s;").is_err(),
                "severity message not classified: {message}"
            );
        }
        // Severity 10 and below are informational.
        assert!(classify_output(output("Error 50000, Severity 10"), "server=s;").is_ok());
    }

    #[test]
    fn test_shape_result_emptiness_semantics() {
        let empty = QueryResult::default();
        assert!(matches!(
            shape_result(empty.clone(), ReturnShape::AllTables),
            Ok(ShapedResult::Tables(_))
        ));
        assert!(matches!(
            shape_result(empty.clone(), ReturnShape::FirstTable),
            Err(SqlFleetError::NoTableReturned)
        ));
        assert!(matches!(
            shape_result(empty, ReturnShape::Scalar),
            Err(SqlFleetError::NoTableReturned)
        ));

        let no_rows = QueryResult::from_rows("Table", Vec::new());
        assert!(matches!(
            shape_result(no_rows.clone(), ReturnShape::FirstRow),
            Err(SqlFleetError::NoRowReturned)
        ));
        // Scalar emptiness is an explicit absent marker, not a failure.
        assert!(matches!(
            shape_result(no_rows, ReturnShape::Scalar),
            Ok(ShapedResult::Scalar(None))
        ));
    }
}
