//! Backup catalog types: files, sets, grouping, and path helpers.
//!
//! A backup set is one or more files produced by a single backup operation,
//! sharing a common basename (multi-part backups split across `.partN`
//! files). Grouping is a pure function over paths with no I/O; the same
//! basename yields the same set regardless of directory.
//!
//! # Module Structure
//! - `headers`: `Lsn`, `BackupHeader`, and header-based selection
//! - `continuity`: the LSN gap-detection and chain-selection algorithm
//! - `destination`: primary/alternate backup destination selection

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub mod continuity;
pub mod destination;
pub mod headers;

pub use continuity::{resolve_log_chain, ContinuityOutcome};
pub use destination::{select_backup_destination, DestinationSpace};
pub use headers::{BackupHeader, HeaderFreshness, Lsn};

/// Kind of backup a file holds, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupKind {
    /// Full or differential database backup (`.bak`).
    Database,
    /// Transaction log backup (`.trn`).
    Log,
}

/// A backup file path with its derived identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    /// Full path to the file.
    pub path: PathBuf,
    /// Backup-set identity: file name stripped of part/extension suffixes.
    pub basename: String,
    /// Database or log backup, from the extension.
    pub kind: BackupKind,
}

impl BackupFile {
    /// Derives the identity of a backup file from its path.
    ///
    /// Returns `None` for files that are not `.bak`/`.trn` backups.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let file_name = path.to_str().and_then(trailing_file_name)?;
        let kind = if file_name.to_ascii_lowercase().ends_with(".trn") {
            BackupKind::Log
        } else if file_name.to_ascii_lowercase().ends_with(".bak") {
            BackupKind::Database
        } else {
            return None;
        };
        let basename = backup_basename(file_name)?;
        Some(Self {
            path,
            basename,
            kind,
        })
    }
}

/// A named backup set: the ordered files sharing one basename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSet {
    /// Shared basename identifying the set.
    pub basename: String,
    /// Member files, in input order.
    pub files: Vec<BackupFile>,
}

impl BackupSet {
    /// The member file paths, in input order.
    pub fn paths(&self) -> Vec<&Path> {
        self.files.iter().map(|file| file.path.as_path()).collect()
    }

    /// True when every member is a transaction-log backup.
    pub fn is_log(&self) -> bool {
        self.files.iter().all(|file| file.kind == BackupKind::Log)
    }
}

fn suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)] // pattern is a literal, compiled once
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\.part\d+)?\.(bak|trn)$").expect("Invalid backup suffix pattern")
    })
}

/// Trailing file-name component of a path.
///
/// Backup paths are produced by Windows servers but processed on any host,
/// so both separators are honored regardless of platform.
fn trailing_file_name(path: &str) -> Option<&str> {
    path.rsplit(['\\', '/']).next().filter(|name| !name.is_empty())
}

/// Derives a backup-set basename from a file name or path.
///
/// Strips any directory prefix (Windows or POSIX separators), a trailing
/// multi-part suffix (`.partN`), and the terminal extension (`.bak` or
/// `.trn`), case-insensitively. Returns `None` when the name carries no
/// backup extension.
pub fn backup_basename(file_name: &str) -> Option<String> {
    let name = trailing_file_name(file_name)?;
    let stripped = suffix_pattern().replace(name, "");
    if stripped == name {
        None
    } else {
        Some(stripped.into_owned())
    }
}

/// Groups raw backup file paths into named backup sets.
///
/// Paths without a recognizable backup extension are skipped. The result is
/// keyed by basename; within a set, files keep their input order.
pub fn group_backup_sets<I, P>(paths: I) -> BTreeMap<String, BackupSet>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let mut sets: BTreeMap<String, BackupSet> = BTreeMap::new();
    for path in paths {
        if let Some(file) = BackupFile::from_path(path) {
            sets.entry(file.basename.clone())
                .or_insert_with(|| BackupSet {
                    basename: file.basename.clone(),
                    files: Vec::new(),
                })
                .files
                .push(file);
        }
    }
    sets
}

/// Renders a backup set's files as the `DISK = N'...'` source list for a
/// RESTORE or HEADERONLY statement, with forward slashes normalized to
/// backslashes.
pub fn backup_fileset_names<P: AsRef<Path>>(files: &[P]) -> String {
    let clauses: Vec<String> = files
        .iter()
        .map(|file| {
            let windows_path = file.as_ref().to_string_lossy().replace('/', "\\");
            format!(" DISK = N''{windows_path}''")
        })
        .collect();
    clauses.join(",")
}

/// Converts a drive-letter path to a UNC path on the given server.
///
/// `F:\Backups\db.bak` on `sql01` becomes `\\sql01\F$\Backups\db.bak`.
/// Paths without a drive letter are returned unchanged.
pub fn to_unc_path(path: &str, server_name: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)] // pattern is a literal, compiled once
    let drive = PATTERN
        .get_or_init(|| Regex::new(r"(?i)^([a-z]):\\").expect("Invalid drive letter pattern"));
    drive
        .replace(path, format!("\\\\{server_name}\\${{1}}$\\"))
        .into_owned()
}

/// Normalizes a directory path to carry exactly one trailing separator.
pub fn ensure_trailing_separator(path: &str) -> String {
    let trimmed = path.trim_end_matches(['\\', '/']);
    let separator = if trimmed.contains('/') && !trimmed.contains('\\') {
        '/'
    } else {
        '\\'
    };
    format!("{trimmed}{separator}")
}
