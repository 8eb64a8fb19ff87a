//! mstdb CLI entry point
//!
//! Parses arguments and dispatches through `cli::run`. Error responses are
//! already printed as JSON on stdout; the process exits non-zero on failure.

use mstdb::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
