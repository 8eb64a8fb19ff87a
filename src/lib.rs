//! mstdb - storage engine for legacy bibliographic master files
//!
//! A database is a pair of files: the master file (`.mst`) holding
//! variable-length records behind a 32-byte control record, and the
//! cross-reference file (`.xrf`) mapping each record number to the record's
//! physical position and status.
//!
//! Entry points:
//! - [`master::open_store`] / [`master::create_store`] for the engine
//!   variant a [`config::MasterConfig`] selects
//! - [`master::DiskMaster`] for format details and the lock protocol
//! - [`codec::RecordCodec`] for encoding records without any file

pub mod binary;
pub mod cache;
pub mod cli;
pub mod codec;
pub mod config;
pub mod detect;
pub mod errors;
pub mod lock;
pub mod master;
pub mod observability;
pub mod record;
pub mod xrf;

pub use config::MasterConfig;
pub use errors::{MstError, MstErrorCode, MstResult};
pub use master::{create_store, open_store, DiskMaster, MasterStore};
pub use record::{ActiveStatus, Field, Record, RecordStatus};
