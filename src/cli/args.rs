//! CLI argument definitions using clap
//!
//! Commands:
//! - mstdb create <db> [--config <path>]
//! - mstdb info <db>
//! - mstdb read <db> <mfn>
//! - mstdb dump <db> [--from <mfn>] [--limit <n>] [--active-only]
//! - mstdb search <db> <pattern> [--max-hits <n>]
//! - mstdb write <db>            (record JSON on stdin)
//! - mstdb delete <db> <mfn>
//! - mstdb unlock <db> <mfn>
//!
//! Global flags: `--config <path>`, `--log-level <trace|info|warn|error|fatal>`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::observability::Severity;

/// mstdb - inspect and edit legacy bibliographic master files
#[derive(Parser, Debug)]
#[command(name = "mstdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Optional JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Lowest severity written to the stderr log
    #[arg(long, global = true, default_value = "info", value_parser = parse_severity)]
    pub log_level: Severity,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty database
    Create {
        /// Database path, with or without the .mst extension
        db: PathBuf,
    },

    /// Show the control record and detected format
    Info { db: PathBuf },

    /// Print one record
    Read { db: PathBuf, mfn: u32 },

    /// Print records in mfn order
    Dump {
        db: PathBuf,

        /// First mfn to print
        #[arg(long, default_value_t = 1)]
        from: u32,

        /// Stop after this many records (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,

        /// Skip deleted records
        #[arg(long)]
        active_only: bool,
    },

    /// Find active records with a field matching a regular expression
    Search {
        db: PathBuf,
        pattern: String,

        /// Stop after this many hits (0 = all)
        #[arg(long, default_value_t = 0)]
        max_hits: usize,
    },

    /// Write one record read as JSON from stdin
    Write {
        db: PathBuf,

        /// Allow overwriting a deleted record
        #[arg(long)]
        allow_inactive: bool,
    },

    /// Logically delete a record
    Delete { db: PathBuf, mfn: u32 },

    /// Clear a record lock left behind by a dead session
    Unlock { db: PathBuf, mfn: u32 },
}

fn parse_severity(name: &str) -> Result<Severity, String> {
    Severity::from_name(name).ok_or_else(|| {
        format!("unknown log level '{}' (trace, info, warn, error, fatal)", name)
    })
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dump_flags() {
        let cli = Cli::parse_from(["mstdb", "dump", "cds", "--from", "3", "--active-only"]);
        match cli.command {
            Command::Dump {
                from, active_only, limit, ..
            } => {
                assert_eq!(from, 3);
                assert_eq!(limit, 0);
                assert!(active_only);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["mstdb", "read", "cds", "7", "--config", "db.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("db.json")));
        assert!(matches!(cli.command, Command::Read { mfn: 7, .. }));
        assert_eq!(cli.log_level, Severity::Info);
    }

    #[test]
    fn test_log_level_flag() {
        let cli = Cli::parse_from(["mstdb", "--log-level", "warn", "info", "cds"]);
        assert_eq!(cli.log_level, Severity::Warn);
        assert!(Cli::try_parse_from(["mstdb", "--log-level", "loud", "info", "cds"]).is_err());
    }
}
