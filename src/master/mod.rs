//! Master engine
//!
//! [`DiskMaster`] owns one open `.mst`/`.xrf` pair. [`open_store`] and
//! [`create_store`] pick the engine variant a [`MasterConfig`] asks for
//! (disk, disk behind the write-back cache, or in-memory) and hand it back
//! behind the [`MasterStore`] contract.

mod buffer;
mod control;
mod disk;
pub(crate) mod fileio;
mod store;

pub use buffer::RecordBuffer;
pub use control::{
    ControlRecord, CONTROL_ENGINE_LEN, CONTROL_LEN, FILE_TYPE_MASTER, LOCK_REGION_AT,
    LOCK_REGION_LEN,
};
pub use disk::DiskMaster;
pub use store::{search_fields, MasterStore, Records, SearchHit};

use std::path::Path;

use crate::cache::{CachedMaster, MemoryMaster};
use crate::config::{DatabasePaths, MasterConfig};
use crate::errors::MstResult;

fn wrap(disk: DiskMaster, config: &MasterConfig) -> Box<dyn MasterStore> {
    match config.record_cache_size() {
        Some(capacity) => Box::new(CachedMaster::new(disk, capacity)),
        None => Box::new(disk),
    }
}

/// Creates a database at `base` (`base.mst` + `base.xrf`).
pub fn create_store(base: impl AsRef<Path>, config: &MasterConfig) -> MstResult<Box<dyn MasterStore>> {
    config.validate()?;
    if config.in_memory_master {
        return Ok(Box::new(MemoryMaster::new()));
    }
    let disk = DiskMaster::create(&DatabasePaths::new(base), config)?;
    Ok(wrap(disk, config))
}

/// Opens the database at `base`.
pub fn open_store(base: impl AsRef<Path>, config: &MasterConfig) -> MstResult<Box<dyn MasterStore>> {
    config.validate()?;
    if config.in_memory_master {
        return Ok(Box::new(MemoryMaster::new()));
    }
    let disk = DiskMaster::open(&DatabasePaths::new(base), config)?;
    Ok(wrap(disk, config))
}
