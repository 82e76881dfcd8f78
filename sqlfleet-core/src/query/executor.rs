//! Remote query executor capability trait and subprocess implementation.
//!
//! All SQL execution goes through an external data-access helper process;
//! this module depends only on its stdout/stderr contract. The trait is the
//! seam that lets the continuity resolver and the gateway run against a
//! fake executor returning canned payloads in tests.

use crate::{Result, error::SqlFleetError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Captured output of one executor invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOutput {
    /// Standard output: diagnostic lines followed by the tabular payload.
    pub stdout: String,
    /// Standard error: any content is treated as a hard failure.
    pub stderr: String,
    /// Whether the helper process exited successfully.
    pub success: bool,
}

/// Capability interface for dispatching a query against a target.
///
/// # Object Safety
/// This trait is object-safe, allowing injection through
/// `Arc<dyn QueryExecutor>`.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Runs `query` against the target described by `connection_string`.
    ///
    /// The timeout is forwarded to the remote helper; the helper owns its
    /// enforcement. Implementations must capture stdout and stderr
    /// separately and must not interpret the payload.
    ///
    /// # Errors
    /// Returns an error only for transport failures (helper unreachable,
    /// scratch I/O); SQL-level failures are reported through the captured
    /// streams and classified by the gateway.
    async fn run(
        &self,
        connection_string: &str,
        query: &str,
        timeout: Duration,
    ) -> Result<ExecutorOutput>;
}

/// Gateway configuration: scratch location and default retry policy.
///
/// Passed in explicitly at construction; there is no process-wide singleton.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Directory for per-invocation temporary script files.
    pub scratch_dir: PathBuf,
    /// Default retry budget applied when a request specifies none.
    pub default_retries: u32,
    /// Default sleep between retry attempts.
    pub default_retry_delay: Duration,
}

impl GatewayConfig {
    /// Creates a config with no default retries and a five-second delay.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            default_retries: 0,
            default_retry_delay: Duration::from_secs(5),
        }
    }

    /// Builder method to set the default retry policy.
    pub const fn with_default_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.default_retries = retries;
        self.default_retry_delay = delay;
        self
    }
}

/// Production executor: writes the query to a uniquely named scratch script
/// and invokes the external data-access helper on it.
///
/// Concurrent executions on the same host never collide because every
/// invocation gets its own UUID-keyed script file, removed on every exit
/// path.
pub struct ProcessExecutor {
    helper_command: PathBuf,
    scratch_dir: PathBuf,
}

impl ProcessExecutor {
    /// Creates an executor invoking `helper_command` with scripts placed
    /// under `<scratch_dir>/scripts/`.
    pub fn new(helper_command: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            helper_command: helper_command.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    fn script_path(&self) -> PathBuf {
        self.scratch_dir
            .join("scripts")
            .join(format!("sqlfleet_{}.sql", Uuid::new_v4()))
    }

    async fn invoke_helper(
        &self,
        connection_string: &str,
        script_path: &Path,
        timeout: Duration,
    ) -> Result<ExecutorOutput> {
        let output = tokio::process::Command::new(&self.helper_command)
            .arg("--connection")
            .arg(connection_string)
            .arg("--input")
            .arg(script_path)
            .arg("--timeout")
            .arg(timeout.as_secs().to_string())
            .output()
            .await
            .map_err(|e| {
                SqlFleetError::io(
                    format!(
                        "failed to launch query helper '{}'",
                        self.helper_command.display()
                    ),
                    e,
                )
            })?;
        Ok(ExecutorOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        })
    }
}

#[async_trait]
impl QueryExecutor for ProcessExecutor {
    async fn run(
        &self,
        connection_string: &str,
        query: &str,
        timeout: Duration,
    ) -> Result<ExecutorOutput> {
        let script_path = self.script_path();
        if let Some(parent) = script_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SqlFleetError::io("failed to create scratch script directory", e))?;
        }
        tokio::fs::write(&script_path, query)
            .await
            .map_err(|e| SqlFleetError::io("failed to write scratch script", e))?;

        let result = self
            .invoke_helper(connection_string, &script_path, timeout)
            .await;

        // The scratch script must not outlive the invocation, on any path.
        if let Err(e) = tokio::fs::remove_file(&script_path).await {
            tracing::warn!(
                script = %script_path.display(),
                error = %e,
                "failed to remove scratch script"
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_paths_are_unique_per_invocation() {
        let executor = ProcessExecutor::new("sqlrunner", "/tmp/sqlfleet");
        let first = executor.script_path();
        let second = executor.script_path();
        assert_ne!(first, second);
        assert!(first.starts_with("/tmp/sqlfleet/scripts"));
    }

    #[tokio::test]
    async fn test_missing_helper_is_a_transport_error() {
        let scratch = std::env::temp_dir().join(format!("sqlfleet-test-{}", Uuid::new_v4()));
        let executor = ProcessExecutor::new("/nonexistent/sqlrunner", &scratch);
        let result = executor
            .run("server=s;integrated security=SSPI;", "SELECT 1", Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(SqlFleetError::Io { .. })));
        // The scratch script was removed even though the launch failed.
        let leftovers: Vec<_> = std::fs::read_dir(scratch.join("scripts"))
            .map(|entries| entries.flatten().collect())
            .unwrap_or_default();
        assert!(leftovers.is_empty());
        let _ = std::fs::remove_dir_all(&scratch);
    }
}
