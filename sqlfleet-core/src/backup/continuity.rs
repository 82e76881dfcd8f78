//! LSN gap detection and log-backup chain selection.
//!
//! Given the header of the full (or differential) backup anchoring a
//! restore, the restore point's LSN, and candidate log backup sets, the
//! resolver decides which log sets are both relevant and contiguous —
//! without ever loading the server's own backup catalog.
//!
//! Header LSN ranges are treated as inclusive, so a set is contiguous with
//! an applied position `L` when it starts at or before `L + 1`; boundary
//! LSNs count as already applied, and only a strictly later start opens a
//! gap.

use crate::backup::headers::{BackupHeader, Lsn};
use crate::backup::BackupSet;
use serde::{Deserialize, Serialize};

/// Result of continuity analysis over candidate log backup sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContinuityOutcome {
    /// A non-empty, time-ordered chain of applicable log sets; apply these
    /// in order.
    Chain(Vec<BackupSet>),
    /// No log backups are newer than the restore point yet. Not an error.
    NothingToApply,
    /// The chain is unrepairable from the restore point forward: restore
    /// cannot proceed from log backups alone and must fall back to a newer
    /// full backup.
    Gap {
        /// Highest LSN reachable before the break.
        applied_through: Lsn,
        /// First LSN of the next available log set beyond the break.
        resumes_at: Lsn,
    },
}

impl ContinuityOutcome {
    /// True when the outcome is an unrepairable gap.
    pub const fn is_gap(&self) -> bool {
        matches!(self, Self::Gap { .. })
    }
}

/// True when a set starting at `first` continues a chain applied through
/// `position`: boundary LSNs are inclusive on the applied side, so only a
/// start strictly beyond `position + 1` opens a gap.
const fn breaks_chain(first: Lsn, position: Lsn) -> bool {
    first.0 > position.0.saturating_add(1)
}

/// Selects the applicable, contiguous log backup sets for a restore.
///
/// `anchor` is the header of the full or differential backup the restore
/// starts from; `restore_lsn` is the LSN the restored database has already
/// reached (equal to `anchor.last_lsn` for a fresh restore, later when log
/// backups were already applied).
///
/// Candidates are filtered and ordered:
/// 1. Sets from a different backup lineage (`DatabaseBackupLSN` mismatch)
///    are excluded outright — they are not merely older, they belong to a
///    different chain entirely.
/// 2. Sets whose `LastLSN` is at or below both the anchor's `LastLSN` and
///    the restore LSN are already superseded.
/// 3. Survivors are ordered by ascending `LastLSN` (backup chronology).
/// 4. The walk tracks the contiguously reachable LSN; a set starting
///    beyond it opens a gap. A gap still within the range the restore
///    needs makes the chain unrepairable; a gap confined to the
///    already-superseded region only moves the chain's starting point.
/// 5. Stale fragments from before the final starting point are dropped.
pub fn resolve_log_chain(
    anchor: &BackupHeader,
    restore_lsn: Lsn,
    candidates: Vec<(BackupSet, BackupHeader)>,
) -> ContinuityOutcome {
    let mut relevant: Vec<(BackupSet, BackupHeader)> = candidates
        .into_iter()
        .filter(|(set, header)| {
            if header.database_backup_lsn != anchor.database_backup_lsn {
                tracing::debug!(
                    basename = %set.basename,
                    lineage = %header.database_backup_lsn,
                    anchor_lineage = %anchor.database_backup_lsn,
                    "excluding log set from a different backup lineage"
                );
                return false;
            }
            if header.last_lsn <= anchor.last_lsn && header.last_lsn <= restore_lsn {
                tracing::debug!(
                    basename = %set.basename,
                    last_lsn = %header.last_lsn,
                    "excluding superseded log set"
                );
                return false;
            }
            true
        })
        .collect();

    // LastLSN is monotonically increasing within a lineage, so this is the
    // backup chronology.
    relevant.sort_by_key(|(_, header)| header.last_lsn);

    let mut current_lsn = anchor.last_lsn;
    let mut start_lsn: Option<Lsn> = None;
    for (set, header) in &relevant {
        tracing::debug!(
            basename = %set.basename,
            first_lsn = %header.first_lsn,
            last_lsn = %header.last_lsn,
            current_lsn = %current_lsn,
            "walking log set"
        );
        if breaks_chain(header.first_lsn, current_lsn) {
            if breaks_chain(header.first_lsn, restore_lsn) {
                tracing::warn!(
                    applied_through = %current_lsn,
                    resumes_at = %header.first_lsn,
                    "gap in log backups within the required range"
                );
                return ContinuityOutcome::Gap {
                    applied_through: current_lsn,
                    resumes_at: header.first_lsn,
                };
            }
            // Gap confined to the already-superseded region: the chain
            // restarts here.
            start_lsn = Some(header.first_lsn);
        } else if start_lsn.is_none() {
            start_lsn = Some(header.first_lsn);
        }
        current_lsn = header.last_lsn;
    }

    let chain: Vec<BackupSet> = match start_lsn {
        Some(start) => relevant
            .into_iter()
            .filter(|(_, header)| header.last_lsn > start)
            .map(|(set, _)| set)
            .collect(),
        None => Vec::new(),
    };

    if chain.is_empty() {
        ContinuityOutcome::NothingToApply
    } else {
        ContinuityOutcome::Chain(chain)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]

    use super::*;
    use crate::backup::group_backup_sets;
    use crate::backup::headers::test_header;

    /// Builds (set, header) candidates from (first, last, lineage) triples,
    /// one single-file log set per triple.
    fn candidates(specs: &[(u128, u128, u128)]) -> Vec<(BackupSet, BackupHeader)> {
        specs
            .iter()
            .enumerate()
            .map(|(index, &(first, last, lineage))| {
                let path = format!("F:\\Backups\\orders_log_{index:02}.trn");
                let sets = group_backup_sets([path]);
                let set = sets.into_values().next().unwrap_or_else(|| panic!("set"));
                (set, test_header(first, last, lineage))
            })
            .collect()
    }

    fn chain_basenames(outcome: &ContinuityOutcome) -> Vec<&str> {
        match outcome {
            ContinuityOutcome::Chain(sets) => {
                sets.iter().map(|set| set.basename.as_str()).collect()
            }
            other => panic!("expected a chain, got {other:?}"),
        }
    }

    #[test]
    fn test_contiguous_chain_is_returned_in_order() {
        let anchor = test_header(1, 100, 50);
        // Presented out of order; resolver must order by LastLSN.
        let outcome = resolve_log_chain(
            &anchor,
            Lsn(100),
            candidates(&[(151, 200, 50), (101, 150, 50)]),
        );
        assert_eq!(
            chain_basenames(&outcome),
            vec!["orders_log_01", "orders_log_00"]
        );
    }

    #[test]
    fn test_gap_within_required_range_is_explicit() {
        let anchor = test_header(1, 100, 50);
        let outcome = resolve_log_chain(&anchor, Lsn(100), candidates(&[(150, 200, 50)]));
        assert_eq!(
            outcome,
            ContinuityOutcome::Gap {
                applied_through: Lsn(100),
                resumes_at: Lsn(150),
            }
        );
        assert!(outcome.is_gap());
    }

    #[test]
    fn test_foreign_lineage_always_excluded() {
        let anchor = test_header(1, 100, 50);
        // The foreign set covers the right LSN range but belongs to another
        // full backup's lineage.
        let outcome = resolve_log_chain(
            &anchor,
            Lsn(100),
            candidates(&[(101, 150, 99), (101, 150, 50)]),
        );
        assert_eq!(chain_basenames(&outcome), vec!["orders_log_01"]);
    }

    #[test]
    fn test_no_candidates_is_nothing_to_apply() {
        let anchor = test_header(1, 100, 50);
        assert_eq!(
            resolve_log_chain(&anchor, Lsn(100), Vec::new()),
            ContinuityOutcome::NothingToApply
        );
        // Superseded-only candidates reduce to the same outcome.
        assert_eq!(
            resolve_log_chain(&anchor, Lsn(100), candidates(&[(10, 60, 50)])),
            ContinuityOutcome::NothingToApply
        );
    }

    #[test]
    fn test_gap_in_superseded_region_moves_start_point() {
        // Restore already reached LSN 150; records 121..139 are not needed.
        let anchor = test_header(1, 100, 50);
        let outcome = resolve_log_chain(
            &anchor,
            Lsn(150),
            candidates(&[(101, 120, 50), (140, 200, 50)]),
        );
        // The stale fragment before the gap boundary is dropped.
        assert_eq!(chain_basenames(&outcome), vec!["orders_log_01"]);
    }

    #[test]
    fn test_boundary_start_equal_to_applied_position() {
        // A set starting exactly at the applied position overlaps it:
        // inclusive on the applied side.
        let anchor = test_header(1, 100, 50);
        let outcome = resolve_log_chain(&anchor, Lsn(100), candidates(&[(100, 180, 50)]));
        assert_eq!(chain_basenames(&outcome), vec!["orders_log_00"]);
    }

    #[test]
    fn test_boundary_adjacent_start_is_contiguous() {
        // first_lsn == current_lsn + 1 continues the chain; only a strictly
        // later start opens a gap.
        let anchor = test_header(1, 100, 50);
        let adjacent = resolve_log_chain(&anchor, Lsn(100), candidates(&[(101, 180, 50)]));
        assert_eq!(chain_basenames(&adjacent), vec!["orders_log_00"]);

        let beyond = resolve_log_chain(&anchor, Lsn(100), candidates(&[(102, 180, 50)]));
        assert!(beyond.is_gap());
    }

    #[test]
    fn test_gap_resuming_right_after_restore_point_is_repairable() {
        // Anchor ends at 90, restore point is 149; the next set starts at
        // 150, exactly adjacent to the restore point.
        let anchor = test_header(1, 90, 50);
        let outcome = resolve_log_chain(&anchor, Lsn(149), candidates(&[(150, 220, 50)]));
        assert_eq!(chain_basenames(&outcome), vec!["orders_log_00"]);
    }

    #[test]
    fn test_multi_set_chain_with_overlap() {
        let anchor = test_header(1, 100, 50);
        let outcome = resolve_log_chain(
            &anchor,
            Lsn(100),
            candidates(&[(101, 150, 50), (120, 210, 50), (211, 260, 50)]),
        );
        assert_eq!(
            chain_basenames(&outcome),
            vec!["orders_log_00", "orders_log_01", "orders_log_02"]
        );
    }
}
