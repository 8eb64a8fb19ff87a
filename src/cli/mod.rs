//! CLI module for mstdb
//!
//! Provides a command-line interface for:
//! - create: Create an empty database
//! - info: Show the control record and format
//! - read / dump / search: Inspect records
//! - write / delete: Edit records
//! - unlock: Clear a stale record lock

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{create, delete, dump, info, read, run, run_command, search, unlock};
pub use errors::{CliError, CliResult};
pub use io::{read_request, write_error, write_line, write_response};
