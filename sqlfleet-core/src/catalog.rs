//! The backup catalog: header retrieval, chain resolution, and backup
//! lifecycle operations over the query gateway.
//!
//! All state lives in the external SQL engine and filesystem; the catalog
//! re-queries on every call and never caches headers across invocations,
//! because server-side backup history can change between calls.

use crate::backup::continuity::{resolve_log_chain, ContinuityOutcome};
use crate::backup::destination::DestinationSpace;
use crate::backup::headers::{most_recent_basename, BackupHeader};
use crate::backup::{backup_fileset_names, BackupSet, Lsn};
use crate::error::SqlFleetError;
use crate::query::{QueryGateway, QueryRequest, SqlValue};
use crate::scripts;
use crate::Result;
use std::collections::BTreeMap;

/// Catalog operations against one or more SQL Server targets.
///
/// Holds only the gateway; every operation takes the connection descriptor
/// it should run against, so one catalog serves a whole fleet.
pub struct BackupCatalog {
    gateway: QueryGateway,
}

impl BackupCatalog {
    /// Creates a catalog over the given gateway.
    pub const fn new(gateway: QueryGateway) -> Self {
        Self { gateway }
    }

    /// The underlying query gateway.
    pub const fn gateway(&self) -> &QueryGateway {
        &self.gateway
    }

    /// Retrieves the headers for a backup set.
    ///
    /// Multi-part sets are passed as one concatenated `DISK = N'...'` file
    /// list, so the server reads them as a single media set.
    pub async fn backup_headers(
        &self,
        connection_string: &str,
        set: &BackupSet,
    ) -> Result<Vec<BackupHeader>> {
        let fileset = backup_fileset_names(&set.paths());
        let request =
            QueryRequest::new(scripts::GET_BACKUP_HEADERS).with_value("bkupfiles", fileset);
        let rows = self
            .gateway
            .execute_first_table(connection_string, request)
            .await?;
        rows.iter().map(BackupHeader::from_row).collect()
    }

    /// Retrieves the first header for a backup set.
    ///
    /// # Errors
    /// Returns [`SqlFleetError::NoRowReturned`] when the server reports no
    /// header for the set.
    pub async fn backup_header(
        &self,
        connection_string: &str,
        set: &BackupSet,
    ) -> Result<BackupHeader> {
        self.backup_headers(connection_string, set)
            .await?
            .into_iter()
            .next()
            .ok_or(SqlFleetError::NoRowReturned)
    }

    /// Picks the most recent backup set among candidates by
    /// `BackupFinishDate`; ties break to the first candidate in input
    /// order. Returns `None` when there are no candidates.
    pub async fn most_recent_backup_set(
        &self,
        connection_string: &str,
        sets: BTreeMap<String, BackupSet>,
    ) -> Result<Option<BackupSet>> {
        if sets.len() <= 1 {
            return Ok(sets.into_values().next());
        }
        let mut headers = Vec::with_capacity(sets.len());
        for (basename, set) in &sets {
            let header = self.backup_header(connection_string, set).await?;
            headers.push((basename.clone(), header));
        }
        let Some(winner) = most_recent_basename(&headers).map(str::to_string) else {
            return Ok(None);
        };
        Ok(sets.into_iter().find(|(basename, _)| *basename == winner).map(|(_, set)| set))
    }

    /// Resolves which candidate log backup sets are applicable and
    /// contiguous for a restore anchored at `anchor`.
    ///
    /// Retrieves each candidate's header through the gateway, then runs the
    /// pure chain resolution. Callers must re-resolve immediately before
    /// use rather than cache the outcome.
    pub async fn relevant_log_backup_sets(
        &self,
        connection_string: &str,
        anchor: &BackupHeader,
        restore_lsn: Lsn,
        sets: BTreeMap<String, BackupSet>,
    ) -> Result<ContinuityOutcome> {
        let mut candidates = Vec::with_capacity(sets.len());
        for (_, set) in sets {
            let header = self.backup_header(connection_string, &set).await?;
            candidates.push((set, header));
        }
        Ok(resolve_log_chain(anchor, restore_lsn, candidates))
    }

    /// True when the log chain from `anchor` forward is unrepairable and a
    /// restore must fall back to a newer full backup.
    pub async fn has_log_backup_gap(
        &self,
        connection_string: &str,
        anchor: &BackupHeader,
        restore_lsn: Lsn,
        sets: BTreeMap<String, BackupSet>,
    ) -> Result<bool> {
        Ok(self
            .relevant_log_backup_sets(connection_string, anchor, restore_lsn, sets)
            .await?
            .is_gap())
    }

    /// The database's size in MB, from a readable secondary when available.
    pub async fn database_size_mb(
        &self,
        connection_string: &str,
        database_name: &str,
    ) -> Result<f64> {
        let request = QueryRequest::new(scripts::DATABASE_SIZE)
            .with_value("databasename", database_name)
            .read_only();
        let value = self
            .gateway
            .execute_scalar(connection_string, request)
            .await?;
        Ok(value.as_ref().and_then(SqlValue::as_f64).unwrap_or(0.0))
    }

    /// Measured free/total space on the volume holding `target_folder`.
    pub async fn disk_space(
        &self,
        connection_string: &str,
        target_folder: &str,
    ) -> Result<DestinationSpace> {
        let request =
            QueryRequest::new(scripts::DISK_SPACE).with_value("targetfolder", target_folder);
        let row = self
            .gateway
            .execute_first_row(connection_string, request)
            .await?;
        Ok(DestinationSpace {
            path: target_folder.to_string(),
            available_mb: row.get("Available_MB").and_then(SqlValue::as_f64).unwrap_or(0.0),
            total_mb: row.get("Total_MB").and_then(SqlValue::as_f64),
        })
    }

    /// Lists backup file names for a basename in the server's backup
    /// directory, via the server's own directory listing.
    pub async fn server_backup_files(
        &self,
        connection_string: &str,
        backup_dir: &str,
        backup_basename: &str,
        log_only: bool,
    ) -> Result<Vec<String>> {
        let request = QueryRequest::new(scripts::GET_BACKUP_FILES).with_values([
            ("targetfolder", backup_dir),
            ("bkupname", backup_basename),
            ("logonly", if log_only { "true" } else { "false" }),
        ]);
        let rows = self
            .gateway
            .execute_first_table(connection_string, request)
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("FileName").and_then(SqlValue::as_str))
            .map(|file_name| format!("{backup_dir}{file_name}"))
            .collect())
    }

    /// True when a backup or restore is currently executing on the server.
    pub async fn backup_in_progress(&self, connection_string: &str) -> Result<bool> {
        let request = QueryRequest::new(scripts::BACKUP_PROGRESS);
        let result = self.gateway.execute_tables(connection_string, request).await?;
        Ok(result.first_table().is_some_and(|rows| !rows.is_empty()))
    }

    /// Runs a full database backup to `backup_folder`.
    ///
    /// Skipped (returning `false`) when a backup is already in progress on
    /// the server; the in-flight backup will satisfy the caller's intent.
    pub async fn run_backup(
        &self,
        connection_string: &str,
        backup_folder: &str,
        database_name: &str,
        backup_basename: &str,
        compression: bool,
    ) -> Result<bool> {
        if self.backup_in_progress(connection_string).await? {
            tracing::info!(database = database_name, "backup already in progress; skipping");
            return Ok(false);
        }
        tracing::info!(
            database = database_name,
            destination = backup_folder,
            "backing up"
        );
        let request = QueryRequest::new(scripts::BACKUP_DATABASE).with_values([
            ("bkupdbname", database_name),
            ("bkupname", backup_basename),
            ("bkupdestdir", backup_folder),
            ("compressbackup", if compression { "true" } else { "false" }),
        ]);
        self.gateway.execute_tables(connection_string, request).await?;
        Ok(true)
    }

    /// Probes whether the target answers queries at all. Failures are
    /// reported as unreachable rather than raised.
    pub async fn server_reachable(&self, connection_string: &str) -> bool {
        let request = QueryRequest::new(scripts::SERVER_NAME);
        matches!(
            self.gateway.execute_scalar(connection_string, request).await,
            Ok(Some(value)) if !value.is_null()
        )
    }
}
