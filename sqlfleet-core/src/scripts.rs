//! Embedded T-SQL scripts with `sqlcmd`-style `$(variable)` placeholders.
//!
//! Substitutions are applied by the query gateway; every placeholder here
//! must be supplied by the calling operation.

/// Backup set metadata. Variables: `bkupfiles` (a `DISK = N'...'` list).
pub const GET_BACKUP_HEADERS: &str = "\
SET NOCOUNT ON
RESTORE HEADERONLY FROM $(bkupfiles)
";

/// Server identity, directories, and backup settings. No variables.
pub const SQL_SETTINGS: &str = "\
SET NOCOUNT ON
DECLARE @BackupDir nvarchar(512)
EXEC master.dbo.xp_instance_regread
    N'HKEY_LOCAL_MACHINE',
    N'Software\\Microsoft\\MSSQLServer\\MSSQLServer',
    N'BackupDirectory',
    @BackupDir OUTPUT
SELECT CONVERT(nvarchar(128), SERVERPROPERTY('MachineName'))   AS [ServerName],
       @@SERVERNAME                                            AS [DataSource],
       @BackupDir                                              AS [BackupDir],
       CONVERT(nvarchar(512), SERVERPROPERTY('InstanceDefaultDataPath')) AS [DataDir],
       CONVERT(nvarchar(512), SERVERPROPERTY('InstanceDefaultLogPath'))  AS [LogDir],
       CASE WHEN SERVERPROPERTY('EngineEdition') IN (2, 3) THEN 1 ELSE 0 END AS [CompressBackup],
       CONVERT(nvarchar(128), SERVERPROPERTY('ProductVersion')) AS [Version]
";

/// Free and total space on the volume holding a folder. Variables:
/// `targetfolder`.
pub const DISK_SPACE: &str = "\
SET NOCOUNT ON
SELECT TOP 1
       vs.available_bytes / 1048576.0 AS [Available_MB],
       vs.total_bytes / 1048576.0     AS [Total_MB],
       (vs.available_bytes * 100.0) / vs.total_bytes AS [Percent_Free]
FROM sys.master_files mf
CROSS APPLY sys.dm_os_volume_stats(mf.database_id, mf.file_id) vs
WHERE N'$(targetfolder)' LIKE vs.volume_mount_point + N'%'
";

/// Database size in MB. Variables: `databasename`.
pub const DATABASE_SIZE: &str = "\
SELECT SUM(size) / 128.0 AS [Size_MB] FROM [$(databasename)].[sys].[sysfiles]
";

/// Runs a full database backup. Variables: `bkupdbname`, `bkupname`,
/// `bkupdestdir`, `compressbackup` (`true`/`false`).
pub const BACKUP_DATABASE: &str = "\
DECLARE @compress nvarchar(8) = N'$(compressbackup)'
IF @compress = N'true'
    BACKUP DATABASE [$(bkupdbname)]
        TO DISK = N'$(bkupdestdir)$(bkupname).bak'
        WITH COMPRESSION, CHECKSUM, INIT, NAME = N'$(bkupname)'
ELSE
    BACKUP DATABASE [$(bkupdbname)]
        TO DISK = N'$(bkupdestdir)$(bkupname).bak'
        WITH CHECKSUM, INIT, NAME = N'$(bkupname)'
";

/// Backups currently executing on the server. No variables; returns no
/// rows when nothing is in progress.
pub const BACKUP_PROGRESS: &str = "\
SET NOCOUNT ON
SELECT r.session_id    AS [SessionId],
       r.percent_complete AS [PercentComplete],
       r.start_time    AS [StartTime]
FROM sys.dm_exec_requests r
WHERE r.command LIKE 'BACKUP%' OR r.command LIKE 'RESTORE%'
";

/// Backup files for a basename in the server's backup directory.
/// Variables: `targetfolder`, `bkupname`, `logonly` (`true`/`false`).
pub const GET_BACKUP_FILES: &str = "\
SET NOCOUNT ON
DECLARE @files TABLE (subdirectory nvarchar(512), depth int, [file] int)
INSERT INTO @files
EXEC master.sys.xp_dirtree N'$(targetfolder)', 1, 1
SELECT subdirectory AS [FileName]
FROM @files
WHERE [file] = 1
  AND subdirectory LIKE N'$(bkupname)%'
  AND ((N'$(logonly)' = N'true'  AND subdirectory LIKE N'%.trn')
    OR (N'$(logonly)' <> N'true' AND subdirectory LIKE N'%.bak'))
";

/// Connectivity probe. No variables.
pub const SERVER_NAME: &str = "SELECT @@SERVERNAME AS [ServerName]";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryRequest;

    #[test]
    fn test_every_script_placeholder_is_known() {
        // Each script must validate once its documented variables are bound.
        let cases: Vec<(&str, Vec<(&str, &str)>)> = vec![
            (GET_BACKUP_HEADERS, vec![("bkupfiles", "DISK = N''x.bak''")]),
            (SQL_SETTINGS, vec![]),
            (DISK_SPACE, vec![("targetfolder", "F:\\Backups\\")]),
            (DATABASE_SIZE, vec![("databasename", "orders")]),
            (
                BACKUP_DATABASE,
                vec![
                    ("bkupdbname", "orders"),
                    ("bkupname", "orders_20260824"),
                    ("bkupdestdir", "F:\\Backups\\"),
                    ("compressbackup", "true"),
                ],
            ),
            (BACKUP_PROGRESS, vec![]),
            (
                GET_BACKUP_FILES,
                vec![
                    ("targetfolder", "F:\\Backups\\"),
                    ("bkupname", "orders_20260824"),
                    ("logonly", "false"),
                ],
            ),
            (SERVER_NAME, vec![]),
        ];
        for (script, values) in cases {
            let request = QueryRequest::new(script).with_values(values);
            assert!(
                request.validate().is_ok(),
                "script left placeholders unbound: {script}"
            );
        }
    }
}
