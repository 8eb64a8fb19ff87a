//! The engine contract shared by the disk engine, the write-back cache and
//! the in-memory store.

use regex::Regex;
use serde::Serialize;

use crate::errors::{MstError, MstResult};
use crate::record::{Record, RecordStatus};

pub trait MasterStore {
    /// Number the next new record will receive.
    fn next_mfn(&self) -> u32;

    /// Reads record `mfn` (1..next_mfn). Numbers that only have a tombstone
    /// come back as field-less placeholders.
    fn read(&mut self, mfn: u32) -> MstResult<Record>;

    /// Writes `record`, assigning its mfn when it is new. Updating a record
    /// that is not active requires `allow_inactive`. On success `record`
    /// carries its final mfn, back pointer and active status.
    fn write_record(&mut self, record: &mut Record, allow_inactive: bool) -> MstResult<u32>;

    /// Fails when `record` could never be written by this store.
    fn validate(&self, record: &Record) -> MstResult<()>;

    fn flush(&mut self) -> MstResult<()>;

    fn close(&mut self) -> MstResult<()> {
        self.flush()
    }

    fn write(&mut self, record: &mut Record) -> MstResult<u32> {
        self.write_record(record, false)
    }

    /// Marks an active record as logically deleted.
    fn delete(&mut self, mfn: u32) -> MstResult<()> {
        let mut record = self.read(mfn)?;
        if record.status != RecordStatus::Active {
            return Err(MstError::state(format!(
                "mfn {} is {} and cannot be deleted",
                mfn,
                record.status.as_str()
            )));
        }
        record.status = RecordStatus::LogicallyDeleted;
        record.active_status = None;
        self.write_record(&mut record, false).map(|_| ())
    }

    /// Record numbers assigned so far, tombstones included.
    fn record_count(&self) -> u32 {
        self.next_mfn().saturating_sub(1)
    }

    /// Every record from 1 to the current last mfn, in order.
    fn iter(&mut self) -> Records<'_>
    where
        Self: Sized,
    {
        Records::new(self)
    }

    /// Active records with at least one field matching `pattern`. Stops
    /// after `max_hits` matches; 0 means no limit.
    fn search_fields(&mut self, pattern: &Regex, max_hits: usize) -> MstResult<Vec<SearchHit>>
    where
        Self: Sized,
    {
        search_fields(self, pattern, max_hits)
    }
}

impl<S: MasterStore + ?Sized> MasterStore for Box<S> {
    fn next_mfn(&self) -> u32 {
        (**self).next_mfn()
    }

    fn read(&mut self, mfn: u32) -> MstResult<Record> {
        (**self).read(mfn)
    }

    fn write_record(&mut self, record: &mut Record, allow_inactive: bool) -> MstResult<u32> {
        (**self).write_record(record, allow_inactive)
    }

    fn validate(&self, record: &Record) -> MstResult<()> {
        (**self).validate(record)
    }

    fn flush(&mut self) -> MstResult<()> {
        (**self).flush()
    }

    fn close(&mut self) -> MstResult<()> {
        (**self).close()
    }

    fn delete(&mut self, mfn: u32) -> MstResult<()> {
        (**self).delete(mfn)
    }
}

/// Lazy sequential scan. The upper bound is fixed when the scan starts;
/// records written during the scan are not visited.
pub struct Records<'a> {
    store: &'a mut dyn MasterStore,
    next: u32,
    last: u32,
}

impl<'a> Records<'a> {
    pub fn new(store: &'a mut dyn MasterStore) -> Self {
        let last = store.next_mfn().saturating_sub(1);
        Self {
            store,
            next: 1,
            last,
        }
    }
}

impl Iterator for Records<'_> {
    type Item = MstResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.last {
            return None;
        }
        let mfn = self.next;
        self.next += 1;
        Some(self.store.read(mfn))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.last + 1).saturating_sub(self.next) as usize;
        (left, Some(left))
    }
}

/// One search match: the record and the tags whose content matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub mfn: u32,
    pub tags: Vec<u32>,
}

/// Linear regular-expression scan over active records.
pub fn search_fields(
    store: &mut dyn MasterStore,
    pattern: &Regex,
    max_hits: usize,
) -> MstResult<Vec<SearchHit>> {
    let mut hits = Vec::new();
    for record in Records::new(store) {
        let record = record?;
        if !record.is_active() {
            continue;
        }
        let mut tags: Vec<u32> = record
            .fields
            .iter()
            .filter(|f| pattern.is_match(&f.content))
            .map(|f| f.tag)
            .collect();
        if tags.is_empty() {
            continue;
        }
        tags.sort_unstable();
        tags.dedup();
        hits.push(SearchHit {
            mfn: record.mfn,
            tags,
        });
        if max_hits > 0 && hits.len() >= max_hits {
            break;
        }
    }
    Ok(hits)
}
