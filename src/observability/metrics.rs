//! Engine counters
//!
//! - Counters only, monotonic, reset when the handle is created
//! - Shared between the disk engine, its caches and its lock manager
//!   through an `Arc`
//! - Relaxed ordering; values are exact but not synchronized with data

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Records decoded from the master file
    records_read: AtomicU64,
    /// Record images appended at end of file
    records_appended: AtomicU64,
    /// Record images rewritten over their previous version
    records_rewritten: AtomicU64,
    /// Tombstones written for skipped or deleted numbers
    tombstones_written: AtomicU64,
    /// Cross-reference blocks loaded into the page cache
    xrf_page_loads: AtomicU64,
    /// Dirty cross-reference pages written back
    xrf_page_flushes: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_evictions: AtomicU64,
    /// Failed non-blocking lock attempts that were retried
    lock_retries: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_records_read(&self) {
        self.records_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_records_appended(&self) {
        self.records_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_records_rewritten(&self) {
        self.records_rewritten.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tombstones(&self, count: u64) {
        self.tombstones_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_xrf_page_loads(&self) {
        self.xrf_page_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_xrf_page_flushes(&self) {
        self.xrf_page_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_evictions(&self) {
        self.cache_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_lock_retries(&self) {
        self.lock_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_read: self.records_read.load(Ordering::Relaxed),
            records_appended: self.records_appended.load(Ordering::Relaxed),
            records_rewritten: self.records_rewritten.load(Ordering::Relaxed),
            tombstones_written: self.tombstones_written.load(Ordering::Relaxed),
            xrf_page_loads: self.xrf_page_loads.load(Ordering::Relaxed),
            xrf_page_flushes: self.xrf_page_flushes.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_evictions: self.cache_evictions.load(Ordering::Relaxed),
            lock_retries: self.lock_retries.load(Ordering::Relaxed),
        }
    }

    /// Current values as a single JSON object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_default()
    }
}

/// A point-in-time copy of every counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub records_read: u64,
    pub records_appended: u64,
    pub records_rewritten: u64,
    pub tombstones_written: u64,
    pub xrf_page_loads: u64,
    pub xrf_page_flushes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub lock_retries: u64,
}
