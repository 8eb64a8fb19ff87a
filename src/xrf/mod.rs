//! Cross-reference (XRF) store
//!
//! Maps record numbers to packed (block, offset, status, flags) pointers
//! held in fixed 512-byte blocks of 127 slots plus a chain header.

mod entry;
mod file;
mod store;

pub use entry::{XrfEntry, XrfFlag};
pub use file::{locate, XrfBlock, XrfFile, SLOTS_PER_BLOCK};
pub use store::{DirectXrf, MemoryXrf, PagedXrf, XrfStore};
