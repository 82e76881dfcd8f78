//! Backup header metadata: LSNs, finish times, and header-based selection.
//!
//! Headers are owned transiently per resolution call and never cached
//! across calls, because server-side backup history can change between
//! invocations.

use crate::error::SqlFleetError;
use crate::query::{Row, SqlValue};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A log sequence number: a monotonically increasing marker of position
/// within a database's transaction log.
///
/// SQL Server reports header LSNs as `numeric(25,0)`, wider than `u64`, so
/// the newtype wraps `u128`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Lsn(pub u128);

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Lsn {
    type Err = SqlFleetError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u128>()
            .map(Self)
            .map_err(|_| SqlFleetError::configuration(format!("'{s}' is not a valid LSN")))
    }
}

impl Lsn {
    /// Parses an LSN from a result cell, accepting numeric or text form.
    pub fn from_value(value: &SqlValue) -> Result<Self> {
        match value {
            #[allow(clippy::cast_sign_loss)]
            SqlValue::Int(number) if *number >= 0 => Ok(Self(*number as u128)),
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            SqlValue::Float(number) if *number >= 0.0 => Ok(Self(*number as u128)),
            SqlValue::Text(text) => text.parse(),
            other => Err(SqlFleetError::configuration(format!(
                "{other:?} is not a valid LSN"
            ))),
        }
    }
}

/// Metadata for one backup set, from `RESTORE HEADERONLY`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupHeader {
    /// LSN of the first log record in the backup.
    pub first_lsn: Lsn,
    /// LSN of the next log record after the backup.
    pub last_lsn: Lsn,
    /// LSN of the most recent full database backup; identifies the lineage
    /// a log backup belongs to.
    pub database_backup_lsn: Lsn,
    /// When the backup finished.
    pub backup_finish_date: DateTime<Utc>,
    /// Source database name.
    pub database_name: String,
    /// Backup size in bytes.
    pub backup_size: f64,
}

impl BackupHeader {
    /// Extracts a header from a `RESTORE HEADERONLY` result row.
    ///
    /// # Errors
    /// Returns a validation error naming the missing or malformed field.
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            first_lsn: Lsn::from_value(required(row, "FirstLSN")?)?,
            last_lsn: Lsn::from_value(required(row, "LastLSN")?)?,
            database_backup_lsn: Lsn::from_value(required(row, "DatabaseBackupLSN")?)?,
            backup_finish_date: required(row, "BackupFinishDate")?
                .as_datetime()
                .ok_or_else(|| {
                    SqlFleetError::configuration("BackupFinishDate is not a timestamp")
                })?,
            database_name: required(row, "DatabaseName")?
                .as_str()
                .unwrap_or_default()
                .to_string(),
            backup_size: required(row, "BackupSize")?.as_f64().unwrap_or(0.0),
        })
    }

    /// Uncompressed backup size in megabytes.
    pub fn backup_size_mb(&self) -> f64 {
        self.backup_size / 1024.0 / 1024.0
    }

    /// Compares the backup finish time against the minimum timestamp a
    /// backup must have to be considered current.
    pub fn freshness(&self, backup_start_time: DateTime<Utc>) -> HeaderFreshness {
        if self.backup_finish_date > backup_start_time {
            HeaderFreshness::Current
        } else {
            HeaderFreshness::Outdated
        }
    }
}

/// Whether an existing backup is recent enough to reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderFreshness {
    /// Finished after the required start time; reuse it.
    Current,
    /// Finished before the required start time; a new backup is needed.
    Outdated,
    /// No header could be retrieved at all.
    NoBackup,
}

fn required<'a>(row: &'a Row, column: &str) -> Result<&'a SqlValue> {
    row.get(column).filter(|value| !value.is_null()).ok_or_else(|| {
        SqlFleetError::configuration(format!("backup header is missing '{column}'"))
    })
}

/// Picks the basename of the most recent backup among candidate headers.
///
/// Selection is by maximum `BackupFinishDate`; ties break to the first
/// candidate encountered in input order.
pub fn most_recent_basename(headers: &[(String, BackupHeader)]) -> Option<&str> {
    let mut best: Option<&(String, BackupHeader)> = None;
    for candidate in headers {
        match best {
            Some(current) if candidate.1.backup_finish_date <= current.1.backup_finish_date => {}
            _ => best = Some(candidate),
        }
    }
    best.map(|(basename, _)| basename.as_str())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) fn test_header(first: u128, last: u128, lineage: u128) -> BackupHeader {
    use chrono::TimeZone;
    BackupHeader {
        first_lsn: Lsn(first),
        last_lsn: Lsn(last),
        database_backup_lsn: Lsn(lineage),
        backup_finish_date: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
        database_name: "orders".to_string(),
        backup_size: 1024.0 * 1024.0 * 64.0,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::TimeZone;

    fn header(first: u128, last: u128, lineage: u128) -> BackupHeader {
        test_header(first, last, lineage)
    }

    #[test]
    fn test_lsn_parses_wide_values() {
        let wide = "124000000123400001234";
        let lsn: Lsn = wide.parse().unwrap();
        assert_eq!(lsn.to_string(), wide);
        assert!(Lsn::from_str("12,5").is_err());
        assert_eq!(Lsn::from_value(&SqlValue::Int(42)).unwrap(), Lsn(42));
        assert_eq!(
            Lsn::from_value(&SqlValue::Text(wide.to_string())).unwrap(),
            lsn
        );
        assert!(Lsn::from_value(&SqlValue::Null).is_err());
    }

    #[test]
    fn test_header_from_row() {
        let row = Row::from_pairs(vec![
            ("BackupName", SqlValue::Text("orders full".to_string())),
            ("FirstLSN", SqlValue::Text("100".to_string())),
            ("LastLSN", SqlValue::Int(250)),
            ("DatabaseBackupLSN", SqlValue::Int(100)),
            (
                "BackupFinishDate",
                SqlValue::DateTime(Utc.timestamp_opt(1_700_000_000, 0).single().unwrap()),
            ),
            ("DatabaseName", SqlValue::Text("orders".to_string())),
            ("BackupSize", SqlValue::Int(2_097_152)),
        ]);
        let header = BackupHeader::from_row(&row).unwrap();
        assert_eq!(header.first_lsn, Lsn(100));
        assert_eq!(header.last_lsn, Lsn(250));
        assert!((header.backup_size_mb() - 2.0).abs() < f64::EPSILON);

        let missing = Row::from_pairs(vec![("FirstLSN", SqlValue::Int(1))]);
        assert!(BackupHeader::from_row(&missing).is_err());
    }

    #[test]
    fn test_freshness_against_start_time() {
        let header = header(1, 2, 1);
        let before = Utc.timestamp_opt(1_600_000_000, 0).single().unwrap();
        let after = Utc.timestamp_opt(1_800_000_000, 0).single().unwrap();
        assert_eq!(header.freshness(before), HeaderFreshness::Current);
        assert_eq!(header.freshness(after), HeaderFreshness::Outdated);
    }

    #[test]
    fn test_most_recent_ties_break_to_first_encountered() {
        let older = {
            let mut h = header(1, 2, 1);
            h.backup_finish_date = Utc.timestamp_opt(1_600_000_000, 0).single().unwrap();
            h
        };
        let headers = vec![
            ("first_tie".to_string(), header(1, 2, 1)),
            ("older".to_string(), older),
            ("second_tie".to_string(), header(3, 4, 1)),
        ];
        assert_eq!(most_recent_basename(&headers).unwrap(), "first_tie");
        assert_eq!(most_recent_basename(&[]), None);
    }
}
