//! Fully in-memory master store
//!
//! Follows the same numbering and status rules as the disk engine without
//! a file behind it. Numbers skipped by an explicit mfn are filled with
//! physically deleted placeholders, the in-memory stand-in for tombstones.

use crate::errors::{MstError, MstResult};
use crate::master::MasterStore;
use crate::record::{ActiveStatus, Record, RecordStatus};

/// Highest tag number a field may carry.
pub const MAX_TAG: u32 = 99_999;

#[derive(Debug, Default)]
pub struct MemoryMaster {
    records: Vec<Record>,
}

impl MemoryMaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, mfn: u32) -> MstResult<usize> {
        if mfn == 0 || mfn >= self.next_mfn() {
            return Err(MstError::mfn_out_of_range(mfn, self.next_mfn()));
        }
        Ok(mfn as usize - 1)
    }

    fn write_new(&mut self, record: &mut Record) -> u32 {
        let mfn = record.mfn.max(self.next_mfn());
        while self.next_mfn() < mfn {
            let gap = self.next_mfn();
            self.records
                .push(Record::placeholder(gap, RecordStatus::PhysicallyDeleted));
        }
        record.mfn = mfn;
        record.active_status = match record.status {
            RecordStatus::Active => Some(ActiveStatus::New),
            _ => None,
        };
        self.records.push(record.clone());
        mfn
    }

    fn write_update(&mut self, record: &mut Record, allow_inactive: bool) -> MstResult<u32> {
        let slot = self.slot(record.mfn)?;
        let prior = &self.records[slot];
        if prior.status != RecordStatus::Active && !allow_inactive {
            return Err(MstError::state(format!(
                "mfn {} is {}; updating it needs allow_inactive",
                record.mfn,
                prior.status.as_str()
            )));
        }

        if record.status == RecordStatus::PhysicallyDeleted {
            self.records[slot] = Record::placeholder(record.mfn, RecordStatus::PhysicallyDeleted);
            return Ok(record.mfn);
        }

        let fresh = prior.status == RecordStatus::PhysicallyDeleted
            || prior.active_status == Some(ActiveStatus::New);
        record.active_status = match record.status {
            RecordStatus::Active if fresh => Some(ActiveStatus::New),
            RecordStatus::Active => Some(ActiveStatus::PendingIndexUpdate),
            _ => None,
        };
        self.records[slot] = record.clone();
        Ok(record.mfn)
    }
}

impl MasterStore for MemoryMaster {
    fn next_mfn(&self) -> u32 {
        self.records.len() as u32 + 1
    }

    fn read(&mut self, mfn: u32) -> MstResult<Record> {
        let slot = self.slot(mfn)?;
        Ok(self.records[slot].clone())
    }

    fn write_record(&mut self, record: &mut Record, allow_inactive: bool) -> MstResult<u32> {
        self.validate(record)?;
        if record.mfn == 0 || record.mfn >= self.next_mfn() {
            return Ok(self.write_new(record));
        }
        self.write_update(record, allow_inactive)
    }

    fn validate(&self, record: &Record) -> MstResult<()> {
        if let Some(field) = record.fields.iter().find(|f| f.tag == 0 || f.tag > MAX_TAG) {
            return Err(MstError::range(format!(
                "tag {} outside 1..={}",
                field.tag, MAX_TAG
            )));
        }
        Ok(())
    }

    fn flush(&mut self) -> MstResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_numbers() {
        let mut store = MemoryMaster::new();
        assert_eq!(store.next_mfn(), 1);
        assert_eq!(store.write(&mut Record::new().field_with(1, "a")).unwrap(), 1);
        assert_eq!(store.write(&mut Record::new().field_with(1, "b")).unwrap(), 2);
        assert_eq!(store.read(2).unwrap().field(1), Some("b"));
        assert_eq!(store.read(1).unwrap().active_status, Some(ActiveStatus::New));
    }

    #[test]
    fn test_explicit_mfn_fills_gap() {
        let mut store = MemoryMaster::new();
        store.write(&mut Record::with_mfn(4).field_with(1, "d")).unwrap();
        assert_eq!(store.next_mfn(), 5);
        for mfn in 1..4 {
            assert_eq!(store.read(mfn).unwrap().status, RecordStatus::PhysicallyDeleted);
        }
    }

    #[test]
    fn test_inactive_update_needs_permission() {
        let mut store = MemoryMaster::new();
        store.write(&mut Record::new().field_with(1, "a")).unwrap();
        store.delete(1).unwrap();

        let mut revived = Record::with_mfn(1).field_with(1, "again");
        assert!(store.write(&mut revived).is_err());
        store.write_record(&mut revived, true).unwrap();
        assert!(store.read(1).unwrap().is_active());
    }

    #[test]
    fn test_read_out_of_range() {
        let mut store = MemoryMaster::new();
        assert!(store.read(0).is_err());
        assert!(store.read(1).is_err());
    }

    #[test]
    fn test_rejects_bad_tags() {
        let store = MemoryMaster::new();
        assert!(store.validate(&Record::new().field_with(0, "x")).is_err());
        assert!(store.validate(&Record::new().field_with(100_000, "x")).is_err());
        assert!(store.validate(&Record::new().field_with(99_999, "x")).is_ok());
    }

    #[test]
    fn test_update_of_new_record_stays_new() {
        let mut store = MemoryMaster::new();
        let mut record = Record::new().field_with(1, "a");
        store.write(&mut record).unwrap();
        record.fields[0].content = "b".to_string();
        store.write(&mut record).unwrap();
        assert_eq!(record.active_status, Some(ActiveStatus::New));
    }
}
