//! Alternative master stores
//!
//! - [`CachedMaster`]: write-back record cache in front of any store
//! - [`MemoryMaster`]: a store with no file behind it

mod memory;
mod write_back;

pub use memory::{MemoryMaster, MAX_TAG};
pub use write_back::{CacheClock, CachedMaster, DEFAULT_CACHE_CAPACITY};
