//! Operator CLI for backup catalog inspection.
//!
//! Offers the pure, offline pieces of the catalog for quick operator use:
//! redacting connection strings for tickets and logs, and grouping backup
//! file listings into sets.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlfleet_core::{backup_basename, connection, group_backup_sets};
use std::path::PathBuf;

/// Command-line interface for the backup catalog
#[derive(Parser)]
#[command(name = "sqlfleet")]
#[command(about = "SQL Server backup catalog inspection")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Redact the password in a connection string
    Redact {
        /// Connection string (key=value; segments)
        connection_string: String,
    },
    /// Group backup file paths into named backup sets
    Group {
        /// Backup file paths (.bak / .trn)
        files: Vec<PathBuf>,
    },
    /// Derive the backup-set basename of a backup file path
    Basename {
        /// Backup file path
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    sqlfleet_core::logging::init_logging(cli.verbose, cli.quiet)
        .context("failed to initialize logging")?;

    match cli.command {
        Commands::Redact { connection_string } => {
            let redacted = connection::redact(&connection_string)
                .context("connection string could not be redacted")?;
            println!("{redacted}");
        }
        Commands::Group { files } => {
            let sets = group_backup_sets(files);
            for (basename, set) in &sets {
                println!("{basename}:");
                for file in &set.files {
                    println!("  {}", file.path.display());
                }
            }
        }
        Commands::Basename { file } => {
            let name = file
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(backup_basename)
                .context("path is not a .bak/.trn backup file")?;
            println!("{name}");
        }
    }

    Ok(())
}
