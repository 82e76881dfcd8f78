//! Backup catalog, LSN continuity resolution, and remote query gateway for
//! SQL Server fleets.
//!
//! This crate automates backup/restore lifecycle decisions for fleets of
//! database servers: it groups backup files into sets, retrieves and orders
//! their headers, decides whether a sequence of log backups can be safely
//! applied to a restore point, and executes arbitrary SQL through a
//! retrying remote-execution gateway — all without ever loading SQL
//! Server's own catalog. It is consumed by an orchestration layer that
//! supplies connection parameters and invokes these operations as
//! idempotent steps.
//!
//! # Security Guarantees
//! - Connection-string passwords never appear in logs or error output;
//!   errors carry only redacted descriptors
//! - Per-invocation scratch scripts are uniquely named and removed on
//!   every exit path
//! - No credentials are stored in any long-lived structure
//!
//! # Architecture
//! - Capability trait (`QueryExecutor`) for the external query process,
//!   allowing the resolver and gateway to run against fakes in tests
//! - Explicit gateway configuration; no process-wide singletons
//! - Pure chain-resolution algorithm decoupled from all I/O

pub mod backup;
pub mod catalog;
pub mod connection;
pub mod error;
pub mod logging;
pub mod query;
pub mod scripts;
pub mod server;

// Re-export commonly used types
pub use backup::{
    backup_basename, group_backup_sets, resolve_log_chain, select_backup_destination,
    BackupFile, BackupHeader, BackupKind, BackupSet, ContinuityOutcome, DestinationSpace,
    HeaderFreshness, Lsn,
};
pub use catalog::BackupCatalog;
pub use connection::{ConnectionPart, Credentials};
pub use error::{Result, SqlFleetError};
pub use query::{
    ExecutorOutput, GatewayConfig, ProcessExecutor, QueryExecutor, QueryGateway, QueryRequest,
    QueryResult, ReturnShape, Row, ShapedResult, SqlValue,
};
pub use server::ServerSettings;
