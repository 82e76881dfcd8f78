//! SQL Server settings probe: identity, directories, and derived
//! descriptors.

use crate::backup::ensure_trailing_separator;
use crate::catalog::BackupCatalog;
use crate::connection::{self, ConnectionPart};
use crate::error::SqlFleetError;
use crate::query::{QueryRequest, Row, SqlValue};
use crate::scripts;
use crate::Result;

/// Server-level settings needed for backup and restore planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Physical machine name (bypasses any AlwaysOn listener).
    pub server_name: String,
    /// Name the connection answered as (the listener, under AlwaysOn).
    pub data_source: String,
    /// Default backup directory, with a trailing separator.
    pub backup_dir: String,
    /// Default data directory, with a trailing separator.
    pub data_dir: String,
    /// Default log directory, with a trailing separator.
    pub log_dir: String,
    /// Whether the edition supports backup compression.
    pub compress_backup: bool,
    /// Engine product version.
    pub version: String,
    /// The descriptor the settings were read through.
    pub connection_string: String,
    /// Descriptor rewritten to address the machine directly, bypassing the
    /// listener.
    pub direct_connection_string: String,
}

impl BackupCatalog {
    /// Reads server settings through a database-stripped descriptor.
    ///
    /// Returns `None` when the server answered but reported no identity
    /// (typically a permissions gap rather than an outage).
    pub async fn server_settings(
        &self,
        connection_string: &str,
    ) -> Result<Option<ServerSettings>> {
        // Server-level probe: the caller's database may not exist yet.
        let probe = connection::remove_part(connection_string, ConnectionPart::Database);
        let request = QueryRequest::new(scripts::SQL_SETTINGS);
        let row = self.gateway().execute_first_row(&probe, request).await?;

        let Some(server_name) = text(&row, "ServerName") else {
            return Ok(None);
        };
        let data_source = text(&row, "DataSource").unwrap_or_else(|| server_name.clone());
        let direct_connection_string = connection_string.replace(&data_source, &server_name);
        Ok(Some(ServerSettings {
            backup_dir: ensure_trailing_separator(&text(&row, "BackupDir").unwrap_or_default()),
            data_dir: ensure_trailing_separator(&text(&row, "DataDir").unwrap_or_default()),
            log_dir: ensure_trailing_separator(&text(&row, "LogDir").unwrap_or_default()),
            compress_backup: matches!(row.get("CompressBackup"), Some(SqlValue::Int(1))),
            version: text(&row, "Version").unwrap_or_default(),
            connection_string: connection_string.to_string(),
            direct_connection_string,
            server_name,
            data_source,
        }))
    }

    /// Reads server settings for backup purposes, retrying with integrated
    /// security when the caller's login cannot see the backup directory.
    ///
    /// # Errors
    /// Returns an insufficient-privileges error when the backup directory
    /// is still unreadable under integrated security.
    pub async fn backup_server_settings(
        &self,
        connection_string: &str,
    ) -> Result<ServerSettings> {
        let settings = self.server_settings(connection_string).await?;
        let settings = match settings.filter(has_backup_dir) {
            Some(settings) => Some(settings),
            None => {
                let integrated = connection::to_integrated_security(connection_string, false);
                self.server_settings(&integrated).await?
            }
        };
        settings
            .filter(has_backup_dir)
            .ok_or_else(|| {
                SqlFleetError::insufficient_privileges(
                    "read access to the server backup directory",
                )
            })
    }
}

fn has_backup_dir(settings: &ServerSettings) -> bool {
    let dir = settings.backup_dir.trim_end_matches(['\\', '/']);
    !dir.is_empty() && !dir.eq_ignore_ascii_case("null")
}

fn text(row: &Row, column: &str) -> Option<String> {
    row.get(column)
        .and_then(SqlValue::as_str)
        .map(str::to_string)
        .filter(|value| !value.is_empty())
}
