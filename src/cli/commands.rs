//! CLI command implementations
//!
//! Every command opens the database, does one thing, closes it and prints a
//! single JSON response. Engine failures become `{"status": "error"}`
//! responses carrying the engine's error code.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{DatabasePaths, MasterConfig};
use crate::master::{create_store, open_store, DiskMaster, MasterStore};
use crate::observability::Logger;
use crate::record::{Field, Record};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{read_request, write_error, write_response};

/// Record shape accepted by `write` on stdin.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordInput {
    #[serde(default)]
    mfn: u32,
    #[serde(default)]
    fields: Vec<Field>,
}

/// Main CLI entry point
///
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    Logger::set_threshold(cli.log_level);
    let result = load_config(cli.config.as_deref()).and_then(|config| run_command(cli.command, &config));
    if let Err(ref e) = result {
        write_error(e.code_str(), &e.to_string())?;
    }
    result
}

fn load_config(path: Option<&Path>) -> CliResult<MasterConfig> {
    match path {
        Some(path) => Ok(MasterConfig::load(path)?),
        None => Ok(MasterConfig::default()),
    }
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command, config: &MasterConfig) -> CliResult<()> {
    let data = match cmd {
        Command::Create { db } => create(&db, config)?,
        Command::Info { db } => info(&db, config)?,
        Command::Read { db, mfn } => read(&db, mfn, config)?,
        Command::Dump {
            db,
            from,
            limit,
            active_only,
        } => dump(&db, from, limit, active_only, config)?,
        Command::Search {
            db,
            pattern,
            max_hits,
        } => search(&db, &pattern, max_hits, config)?,
        Command::Write { db, allow_inactive } => {
            let input: RecordInput = serde_json::from_value(read_request()?)?;
            write(&db, input, allow_inactive, config)?
        }
        Command::Delete { db, mfn } => delete(&db, mfn, config)?,
        Command::Unlock { db, mfn } => unlock(&db, mfn, config)?,
    };
    write_response(data)
}

/// Create an empty `.mst`/`.xrf` pair
pub fn create(db: &Path, config: &MasterConfig) -> CliResult<Value> {
    let paths = DatabasePaths::new(db);
    if paths.exists() {
        return Err(CliError::Input(format!(
            "{} already exists",
            paths.master().display()
        )));
    }
    let mut store = create_store(db, config)?;
    let next_mfn = store.next_mfn();
    store.close()?;
    Ok(json!({
        "master": paths.master().display().to_string(),
        "xrf": paths.xrf().display().to_string(),
        "next_mfn": next_mfn,
    }))
}

/// Describe the control record and the format in use
pub fn info(db: &Path, config: &MasterConfig) -> CliResult<Value> {
    let mut master = DiskMaster::open(&DatabasePaths::new(db), config)?;
    let control = *master.control();
    let params = *master.params();
    let data = json!({
        "master": master.paths().master().display().to_string(),
        "format": params.describe(),
        "extended": params.is_extended(),
        "filler": params.filler(),
        "byte_order": params.byte_order().to_string(),
        "shift": params.shift(),
        "encoding": master.encoding().name(),
        "next_mfn": control.next_mfn,
        "record_count": control.record_count(),
        "next_position": control.next_position,
        "data_entry_locks": control.del,
        "exclusive_write_lock": control.ewl,
    });
    master.close()?;
    Ok(data)
}

pub fn read(db: &Path, mfn: u32, config: &MasterConfig) -> CliResult<Value> {
    let mut store = open_store(db, config)?;
    let record = store.read(mfn)?;
    store.close()?;
    Ok(serde_json::to_value(&record)?)
}

pub fn dump(
    db: &Path,
    from: u32,
    limit: usize,
    active_only: bool,
    config: &MasterConfig,
) -> CliResult<Value> {
    let mut store = open_store(db, config)?;
    let mut records: Vec<Record> = Vec::new();
    for record in store.iter().skip(from.saturating_sub(1) as usize) {
        let record = record?;
        if active_only && !record.is_active() {
            continue;
        }
        records.push(record);
        if limit > 0 && records.len() >= limit {
            break;
        }
    }
    store.close()?;
    Ok(json!({ "count": records.len(), "records": records }))
}

pub fn search(db: &Path, pattern: &str, max_hits: usize, config: &MasterConfig) -> CliResult<Value> {
    let pattern = Regex::new(pattern)?;
    let mut store = open_store(db, config)?;
    let hits = store.search_fields(&pattern, max_hits)?;
    store.close()?;
    Ok(json!({ "count": hits.len(), "hits": hits }))
}

fn write(db: &Path, input: RecordInput, allow_inactive: bool, config: &MasterConfig) -> CliResult<Value> {
    let mut record = Record::with_mfn(input.mfn);
    record.fields = input.fields;

    let mut store = open_store(db, config)?;
    let mfn = store.write_record(&mut record, allow_inactive)?;
    store.close()?;
    Ok(json!({ "mfn": mfn, "active_status": record.active_status }))
}

pub fn delete(db: &Path, mfn: u32, config: &MasterConfig) -> CliResult<Value> {
    let mut store = open_store(db, config)?;
    store.delete(mfn)?;
    store.close()?;
    Ok(json!({ "mfn": mfn, "status": "logically_deleted" }))
}

/// Forcibly clears the lock word of record `mfn`. Always goes through the
/// lock manager, whatever the configuration says.
pub fn unlock(db: &Path, mfn: u32, config: &MasterConfig) -> CliResult<Value> {
    let mut config = config.clone();
    config.multi_user = true;
    config.in_memory_master = false;
    config.in_memory_xrf = false;
    config.record_cache = false;
    config.record_cache_capacity = 0;

    let mut master = DiskMaster::open(&DatabasePaths::new(db), &config)?;
    let was_locked = master.force_unlock_record(mfn)?;
    master.close()?;
    Ok(json!({ "mfn": mfn, "was_locked": was_locked }))
}
