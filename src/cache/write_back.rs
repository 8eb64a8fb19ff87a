//! Write-back record cache
//!
//! Entries are keyed by an insertion timestamp from a per-cache
//! [`CacheClock`], with an mfn index on the side. Every read or write
//! re-inserts the entry with a fresh timestamp; when the cache grows past
//! its capacity the entry with the oldest timestamp is evicted, and written
//! to the inner store first if dirty.
//!
//! New records are written through immediately so the inner store keeps
//! assigning record numbers. Only updates are held back.

use std::collections::{BTreeMap, HashMap};

use crate::errors::{MstError, MstResult};
use crate::observability::{log_event_with_fields, EngineMetrics, Event, MetricsSnapshot};
use crate::record::{ActiveStatus, Record, RecordStatus};

use crate::master::MasterStore;

/// Default entry limit.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Monotonic timestamp source owned by one cache.
#[derive(Debug, Default, Clone)]
pub struct CacheClock {
    now: u64,
}

impl CacheClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts counting at `now`; useful to make eviction order observable.
    pub fn starting_at(now: u64) -> Self {
        Self { now }
    }

    pub fn tick(&mut self) -> u64 {
        self.now += 1;
        self.now
    }
}

#[derive(Debug)]
struct Entry {
    record: Record,
    dirty: bool,
}

pub struct CachedMaster<S: MasterStore> {
    inner: S,
    capacity: usize,
    clock: CacheClock,
    by_time: BTreeMap<u64, Entry>,
    by_mfn: HashMap<u32, u64>,
    metrics: EngineMetrics,
}

impl<S: MasterStore> CachedMaster<S> {
    pub fn new(inner: S, capacity: usize) -> Self {
        Self::with_clock(inner, capacity, CacheClock::new())
    }

    pub fn with_clock(inner: S, capacity: usize, clock: CacheClock) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            clock,
            by_time: BTreeMap::new(),
            by_mfn: HashMap::new(),
            metrics: EngineMetrics::new(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.by_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_time.is_empty()
    }

    pub fn contains(&self, mfn: u32) -> bool {
        self.by_mfn.contains_key(&mfn)
    }

    pub fn dirty_count(&self) -> usize {
        self.by_time.values().filter(|e| e.dirty).count()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Removes the entry for `mfn`, if cached.
    fn take(&mut self, mfn: u32) -> Option<Entry> {
        let stamp = self.by_mfn.remove(&mfn)?;
        self.by_time.remove(&stamp)
    }

    /// Inserts or refreshes `record`, then evicts down to capacity.
    fn insert(&mut self, record: Record, dirty: bool) -> MstResult<()> {
        let mfn = record.mfn;
        let was_dirty = self.take(mfn).map(|e| e.dirty).unwrap_or(false);
        let stamp = self.clock.tick();
        self.by_time.insert(
            stamp,
            Entry {
                record,
                dirty: dirty || was_dirty,
            },
        );
        self.by_mfn.insert(mfn, stamp);
        self.evict()
    }

    fn evict(&mut self) -> MstResult<()> {
        while self.by_time.len() > self.capacity {
            let Some((_, mut entry)) = self.by_time.pop_first() else {
                break;
            };
            let mfn = entry.record.mfn;
            self.by_mfn.remove(&mfn);
            self.metrics.increment_cache_evictions();
            if entry.dirty {
                self.inner.write_record(&mut entry.record, true)?;
                log_event_with_fields(
                    Event::CacheEvict,
                    &[("mfn", mfn.to_string().as_str()), ("dirty", "true")],
                );
            }
        }
        Ok(())
    }

    /// Current copy of `mfn`, from the cache or the inner store.
    fn current(&mut self, mfn: u32) -> MstResult<Record> {
        if let Some(stamp) = self.by_mfn.get(&mfn) {
            if let Some(entry) = self.by_time.get(stamp) {
                return Ok(entry.record.clone());
            }
        }
        self.inner.read(mfn)
    }

    fn write_back_dirty(&mut self) -> MstResult<usize> {
        let mut dirty: Vec<(u32, u64)> = self
            .by_time
            .iter()
            .filter(|(_, e)| e.dirty)
            .map(|(stamp, e)| (e.record.mfn, *stamp))
            .collect();
        dirty.sort_unstable();
        for (_, stamp) in &dirty {
            if let Some(entry) = self.by_time.get_mut(stamp) {
                self.inner.write_record(&mut entry.record, true)?;
                entry.dirty = false;
            }
        }
        Ok(dirty.len())
    }
}

impl<S: MasterStore> MasterStore for CachedMaster<S> {
    fn next_mfn(&self) -> u32 {
        self.inner.next_mfn()
    }

    fn read(&mut self, mfn: u32) -> MstResult<Record> {
        if let Some(entry) = self.take(mfn) {
            self.metrics.increment_cache_hits();
            let record = entry.record.clone();
            self.insert(entry.record, entry.dirty)?;
            return Ok(record);
        }
        self.metrics.increment_cache_misses();
        let record = self.inner.read(mfn)?;
        self.insert(record.clone(), false)?;
        Ok(record)
    }

    fn write_record(&mut self, record: &mut Record, allow_inactive: bool) -> MstResult<u32> {
        self.validate(record)?;
        let next = self.inner.next_mfn();

        if record.mfn == 0 || record.mfn >= next {
            let mfn = self.inner.write_record(record, allow_inactive)?;
            self.insert(record.clone(), false)?;
            return Ok(mfn);
        }

        let prior = self.current(record.mfn)?;
        if prior.status != RecordStatus::Active && !allow_inactive {
            return Err(MstError::state(format!(
                "mfn {} is {}; updating it needs allow_inactive",
                record.mfn,
                prior.status.as_str()
            )));
        }

        if record.status == RecordStatus::PhysicallyDeleted {
            self.take(record.mfn);
            return self.inner.write_record(record, true);
        }

        record.active_status = match record.status {
            RecordStatus::Active => match prior.active_status {
                Some(ActiveStatus::New) => Some(ActiveStatus::New),
                _ if prior.status == RecordStatus::PhysicallyDeleted => Some(ActiveStatus::New),
                _ => Some(ActiveStatus::PendingIndexUpdate),
            },
            _ => None,
        };
        self.insert(record.clone(), true)?;
        Ok(record.mfn)
    }

    fn validate(&self, record: &Record) -> MstResult<()> {
        self.inner.validate(record)
    }

    fn flush(&mut self) -> MstResult<()> {
        let written = self.write_back_dirty()?;
        if written > 0 {
            log_event_with_fields(Event::CacheFlush, &[("records", written.to_string().as_str())]);
        }
        self.inner.flush()
    }

    fn close(&mut self) -> MstResult<()> {
        self.flush()?;
        self.inner.close()
    }
}

impl<S: MasterStore> Drop for CachedMaster<S> {
    fn drop(&mut self) {
        if let Err(err) = self.write_back_dirty() {
            log_event_with_fields(
                Event::CacheWriteBackFailed,
                &[("error", err.to_string().as_str())],
            );
        }
    }
}
