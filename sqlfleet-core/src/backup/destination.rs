//! Backup destination selection by free-space threshold.
//!
//! The primary destination is the server's own backup directory, judged by
//! free-space percentage; the alternate is a UNC share, judged by absolute
//! free space after subtracting the pending backup's estimated size.

use crate::error::SqlFleetError;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Measured space for one candidate backup destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationSpace {
    /// Destination directory (local path or UNC share).
    pub path: String,
    /// Free space in megabytes.
    pub available_mb: f64,
    /// Total volume size in megabytes; `None` when only absolute free
    /// space is known (UNC shares).
    pub total_mb: Option<f64>,
}

impl DestinationSpace {
    /// Free space as a percentage of the volume, when the volume size is
    /// known.
    pub fn percent_free(&self) -> Option<f64> {
        self.total_mb
            .filter(|total| *total > 0.0)
            .map(|total| (self.available_mb / total) * 100.0)
    }
}

/// Chooses where a pending backup should be written.
///
/// The primary wins when its free-space percentage meets or exceeds
/// `free_space_threshold_percent`; otherwise the alternate wins when it
/// still has positive free space after the estimated backup size.
///
/// # Errors
/// Returns [`SqlFleetError::InsufficientBackupSpace`] naming both candidate
/// locations and their measured space when neither qualifies.
pub fn select_backup_destination(
    primary: &DestinationSpace,
    alternate: &DestinationSpace,
    estimated_backup_mb: f64,
    free_space_threshold_percent: f64,
) -> Result<String> {
    let primary_percent = primary.percent_free().unwrap_or(0.0);
    let alternate_free_after = alternate.available_mb - estimated_backup_mb;
    tracing::info!(
        primary = %primary.path,
        primary_percent_free = format!("{primary_percent:.2}"),
        alternate = %alternate.path,
        alternate_free_after_mb = format!("{alternate_free_after:.2}"),
        "selecting backup destination"
    );

    if primary_percent >= free_space_threshold_percent {
        return Ok(primary.path.clone());
    }
    if alternate_free_after > 0.0 {
        return Ok(alternate.path.clone());
    }
    Err(SqlFleetError::InsufficientBackupSpace {
        primary: primary.path.clone(),
        primary_free_percent: primary_percent,
        threshold_percent: free_space_threshold_percent,
        alternate: alternate.path.clone(),
        alternate_free_mb: alternate_free_after,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;

    fn primary(available_mb: f64, total_mb: f64) -> DestinationSpace {
        DestinationSpace {
            path: "F:\\Backups\\".to_string(),
            available_mb,
            total_mb: Some(total_mb),
        }
    }

    fn alternate(available_mb: f64) -> DestinationSpace {
        DestinationSpace {
            path: "\\\\nas01\\sqlbackups".to_string(),
            available_mb,
            total_mb: None,
        }
    }

    #[test]
    fn test_primary_wins_at_or_above_threshold() {
        // Exactly at the threshold still qualifies.
        let choice =
            select_backup_destination(&primary(150.0, 1000.0), &alternate(10.0), 500.0, 15.0)
                .unwrap();
        assert_eq!(choice, "F:\\Backups\\");
    }

    #[test]
    fn test_alternate_wins_when_primary_below_threshold() {
        let choice =
            select_backup_destination(&primary(100.0, 1000.0), &alternate(600.0), 500.0, 15.0)
                .unwrap();
        assert_eq!(choice, "\\\\nas01\\sqlbackups");
    }

    #[test]
    fn test_neither_qualifies_is_insufficient_space() {
        // Alternate would hit exactly zero after the backup: not positive.
        let result =
            select_backup_destination(&primary(100.0, 1000.0), &alternate(500.0), 500.0, 15.0);
        match result {
            Err(SqlFleetError::InsufficientBackupSpace {
                primary, alternate, ..
            }) => {
                assert_eq!(primary, "F:\\Backups\\");
                assert_eq!(alternate, "\\\\nas01\\sqlbackups");
            }
            other => panic!("expected InsufficientBackupSpace, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_primary_volume_size_falls_through() {
        let unknown = DestinationSpace {
            path: "F:\\Backups\\".to_string(),
            available_mb: 100.0,
            total_mb: None,
        };
        let choice = select_backup_destination(&unknown, &alternate(600.0), 100.0, 15.0).unwrap();
        assert_eq!(choice, "\\\\nas01\\sqlbackups");
    }
}
