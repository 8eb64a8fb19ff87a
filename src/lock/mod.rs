//! Cooperative multi-writer locking
//!
//! Three locks, all advisory:
//!
//! - data-entry lock: shared, counted in DEL (control record bytes 24..28)
//! - exclusive write lock: EWL flag (bytes 28..32); excludes data entry
//! - record lock: the sign of a record's stored-length word
//!
//! Every read-modify-write of protocol state happens under a byte-range
//! lock on the bytes involved, so participants in other processes see a
//! consistent DEL/EWL pair. Attempts are non-blocking and retried under a
//! [`RetryPolicy`]; exhausting it is a `MST_LOCK_ERROR`.
//!
//! ```text
//!              acquire_data_entry_lock            acquire_exclusive_write_lock
//!   DEL=n,EWL=0 --------------------> DEL=n+1      DEL=0,EWL=0 ----------> EWL=1
//!   EWL=1       --- retry/backoff --> ...          DEL>0 or EWL=1 -- retry/backoff
//! ```

mod range;

pub use range::RangeGuard;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use serde::Serialize;

use crate::codec::FormatParams;
use crate::config::RetryPolicy;
use crate::errors::{MstError, MstResult};
use crate::master::fileio::{read_exact_at, write_all_at};
use crate::master::{CONTROL_ENGINE_LEN, LOCK_REGION_AT, LOCK_REGION_LEN};
use crate::observability::{log_event_with_fields, EngineMetrics, Event};
use crate::record::{Position, RecordStatus};
use crate::xrf::XrfEntry;

/// DEL and EWL as stored in the control record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlRegion {
    pub data_entry_locks: i32,
    pub exclusive_write_lock: i32,
}

impl ControlRegion {
    fn check(&self) -> MstResult<()> {
        if self.data_entry_locks < 0 || !matches!(self.exclusive_write_lock, 0 | 1) {
            return Err(MstError::lock(format!(
                "control region invariant violated: DEL={} EWL={}",
                self.data_entry_locks, self.exclusive_write_lock
            ))
            .with_details("force-clear the lock region with an administrative tool"));
        }
        Ok(())
    }
}

/// Proof of a held record lock. Only the issuing manager accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordLockToken {
    pub mfn: u32,
    pub position: Position,
    pub session: u64,
}

pub struct LockManager {
    path: PathBuf,
    file: Arc<File>,
    params: FormatParams,
    policy: RetryPolicy,
    session: u64,
    metrics: Arc<EngineMetrics>,
}

impl LockManager {
    pub fn new(
        path: &Path,
        file: Arc<File>,
        params: FormatParams,
        policy: RetryPolicy,
        session: u64,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            file,
            params,
            policy,
            session,
            metrics,
        }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn log(&self, event: Event, fields: &[(&str, &str)]) {
        let path = self.path.display().to_string();
        let mut all = vec![("path", path.as_str())];
        all.extend_from_slice(fields);
        log_event_with_fields(event, &all);
    }

    /// Runs `attempt` until it yields a value, the attempt budget runs out
    /// or the deadline passes.
    fn retry<T>(
        &self,
        what: &str,
        mut attempt: impl FnMut() -> MstResult<Option<T>>,
    ) -> MstResult<T> {
        let started = Instant::now();
        let mut tries = 0;
        while tries < self.policy.attempts {
            tries += 1;
            if let Some(value) = attempt()? {
                return Ok(value);
            }
            let expired = self
                .policy
                .deadline
                .map(|d| started.elapsed() + self.policy.backoff > d)
                .unwrap_or(false);
            if expired || tries == self.policy.attempts {
                break;
            }
            self.metrics.increment_lock_retries();
            thread::sleep(self.policy.backoff);
        }
        self.log(
            Event::LockRetryExhausted,
            &[("lock", what), ("attempts", tries.to_string().as_str())],
        );
        Err(MstError::lock(format!("{} not acquired after {} attempts", what, tries)))
    }

    fn read_region(&self) -> MstResult<ControlRegion> {
        let mut buf = [0u8; LOCK_REGION_LEN as usize];
        read_exact_at(&self.file, LOCK_REGION_AT, &mut buf)?;
        let order = self.params.byte_order();
        Ok(ControlRegion {
            data_entry_locks: order.read_i32(&buf[0..]),
            exclusive_write_lock: order.read_i32(&buf[4..]),
        })
    }

    fn write_region(&self, region: ControlRegion) -> MstResult<()> {
        let mut buf = [0u8; LOCK_REGION_LEN as usize];
        let order = self.params.byte_order();
        order.write_i32(&mut buf[0..], region.data_entry_locks);
        order.write_i32(&mut buf[4..], region.exclusive_write_lock);
        write_all_at(&self.file, LOCK_REGION_AT, &buf)
    }

    /// Read-modify-write of the lock region under its byte-range lock.
    /// `change` returns `None` to ask for a retry.
    fn update_region(
        &self,
        what: &str,
        mut change: impl FnMut(ControlRegion) -> MstResult<Option<ControlRegion>>,
    ) -> MstResult<ControlRegion> {
        self.retry(what, || {
            let _guard = match RangeGuard::try_lock(&self.file, LOCK_REGION_AT, LOCK_REGION_LEN)? {
                Some(guard) => guard,
                None => return Ok(None),
            };
            let region = self.read_region()?;
            region.check()?;
            match change(region)? {
                Some(updated) => {
                    self.write_region(updated)?;
                    Ok(Some(updated))
                }
                None => Ok(None),
            }
        })
    }

    /// Current DEL/EWL values.
    pub fn control_region(&self) -> MstResult<ControlRegion> {
        self.retry("control region", || {
            let _guard = match RangeGuard::try_lock(&self.file, LOCK_REGION_AT, LOCK_REGION_LEN)? {
                Some(guard) => guard,
                None => return Ok(None),
            };
            self.read_region().map(Some)
        })
    }

    pub fn acquire_data_entry_lock(&self) -> MstResult<()> {
        let region = self.update_region("data-entry lock", |r| {
            if r.exclusive_write_lock != 0 {
                return Ok(None);
            }
            Ok(Some(ControlRegion {
                data_entry_locks: r.data_entry_locks + 1,
                ..r
            }))
        })?;
        self.log(
            Event::LockAcquired,
            &[
                ("lock", "data_entry"),
                ("del", region.data_entry_locks.to_string().as_str()),
            ],
        );
        Ok(())
    }

    pub fn release_data_entry_lock(&self) -> MstResult<()> {
        let region = self.update_region("data-entry unlock", |r| {
            if r.exclusive_write_lock != 0 {
                return Err(MstError::lock(
                    "exclusive write lock set while data entry was held",
                ));
            }
            if r.data_entry_locks == 0 {
                return Err(MstError::lock("data-entry lock released but not held"));
            }
            Ok(Some(ControlRegion {
                data_entry_locks: r.data_entry_locks - 1,
                ..r
            }))
        })?;
        self.log(
            Event::LockReleased,
            &[
                ("lock", "data_entry"),
                ("del", region.data_entry_locks.to_string().as_str()),
            ],
        );
        Ok(())
    }

    pub fn acquire_exclusive_write_lock(&self) -> MstResult<()> {
        self.update_region("exclusive write lock", |r| {
            if r.data_entry_locks != 0 || r.exclusive_write_lock != 0 {
                return Ok(None);
            }
            Ok(Some(ControlRegion {
                exclusive_write_lock: 1,
                ..r
            }))
        })?;
        self.log(Event::LockAcquired, &[("lock", "exclusive_write")]);
        Ok(())
    }

    pub fn release_exclusive_write_lock(&self) -> MstResult<()> {
        self.update_region("exclusive write unlock", |r| {
            if r.exclusive_write_lock != 1 {
                return Err(MstError::lock("exclusive write lock released but not held"));
            }
            Ok(Some(ControlRegion {
                exclusive_write_lock: 0,
                ..r
            }))
        })?;
        self.log(Event::LockReleased, &[("lock", "exclusive_write")]);
        Ok(())
    }

    /// Holds the byte-range lock on the engine part of the control record.
    /// Used to serialize record-number assignment between processes.
    pub fn lock_control_record(&self) -> MstResult<RangeGuard<'_>> {
        self.retry("control record", || {
            RangeGuard::try_lock(&self.file, 0, CONTROL_ENGINE_LEN as u64)
        })
    }

    fn word_at(&self, position: Position) -> u64 {
        position.file_offset() + self.params.length_at() as u64
    }

    fn read_word(&self, at: u64) -> MstResult<i32> {
        let mut buf = [0u8; 4];
        let width = self.params.wide();
        read_exact_at(&self.file, at, &mut buf[..width])?;
        Ok(self.params.byte_order().read_int(&buf, width))
    }

    fn write_word(&self, at: u64, value: i32) -> MstResult<()> {
        let mut buf = [0u8; 4];
        let width = self.params.wide();
        self.params.byte_order().write_int(&mut buf, width, value);
        write_all_at(&self.file, at, &buf[..width])
    }

    /// Flips the lock word at `position` with `flip` under its byte-range
    /// lock. `flip` returns `None` when the word is in the wrong state.
    fn flip_word(
        &self,
        what: &str,
        position: Position,
        mut flip: impl FnMut(i32) -> Option<i32>,
    ) -> MstResult<bool> {
        let at = self.word_at(position);
        let width = self.params.wide() as u64;
        self.retry(what, || {
            let _guard = match RangeGuard::try_lock(&self.file, at, width)? {
                Some(guard) => guard,
                None => return Ok(None),
            };
            let word = self.read_word(at)?;
            match flip(word) {
                Some(value) => {
                    self.write_word(at, value)?;
                    Ok(Some(true))
                }
                None => Ok(Some(false)),
            }
        })
    }

    /// Locks the record `entry` points at. Takes and releases the
    /// data-entry lock around the attempt; while another session holds the
    /// record the attempt is retried under the policy.
    pub fn lock_record(&self, mfn: u32, entry: XrfEntry) -> MstResult<RecordLockToken> {
        if entry.status != RecordStatus::Active {
            return Err(MstError::state(format!(
                "mfn {} is {} and cannot be locked",
                mfn,
                entry.status.as_str()
            )));
        }

        self.acquire_data_entry_lock()?;
        let at = self.word_at(entry.position);
        let width = self.params.wide() as u64;
        let locked = self.retry("record lock", || {
            let _guard = match RangeGuard::try_lock(&self.file, at, width)? {
                Some(guard) => guard,
                None => return Ok(None),
            };
            let word = self.read_word(at)?;
            if word < 0 {
                return Ok(None);
            }
            if word == 0 {
                return Err(MstError::format_at_offset(
                    at,
                    format!("mfn {}: zero stored length at lock word", mfn),
                ));
            }
            self.write_word(at, -word)?;
            Ok(Some(()))
        });
        let released = self.release_data_entry_lock();
        locked.map_err(|e| {
            if e.code() == crate::errors::MstErrorCode::Lock {
                MstError::lock(format!("mfn {} is locked by another session", mfn))
            } else {
                e
            }
        })?;
        released?;

        self.log(
            Event::RecordLocked,
            &[
                ("mfn", mfn.to_string().as_str()),
                ("session", self.session.to_string().as_str()),
            ],
        );
        Ok(RecordLockToken {
            mfn,
            position: entry.position,
            session: self.session,
        })
    }

    pub fn unlock_record(&self, token: RecordLockToken) -> MstResult<()> {
        if token.session != self.session {
            return Err(MstError::lock(format!(
                "mfn {}: lock token belongs to session {}",
                token.mfn, token.session
            )));
        }
        let flipped = self.flip_word("record unlock", token.position, |word| {
            (word < 0).then_some(-word)
        })?;
        if !flipped {
            return Err(MstError::lock(format!("mfn {} is not locked", token.mfn)));
        }
        self.log(Event::RecordUnlocked, &[("mfn", token.mfn.to_string().as_str())]);
        Ok(())
    }

    /// Clears a record lock without an ownership check. Returns whether the
    /// record was locked.
    pub fn force_unlock_record(&self, mfn: u32, entry: XrfEntry) -> MstResult<bool> {
        if entry.is_tombstone() {
            return Err(MstError::state(format!("mfn {} has no master image", mfn)));
        }
        let flipped = self.flip_word("record force unlock", entry.position, |word| {
            (word < 0).then_some(-word)
        })?;
        if flipped {
            self.log(Event::RecordForceUnlocked, &[("mfn", mfn.to_string().as_str())]);
        }
        Ok(flipped)
    }

    /// Whether the record at `position` carries a lock mark.
    pub fn is_record_locked(&self, position: Position) -> MstResult<bool> {
        Ok(self.read_word(self.word_at(position))? < 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::ByteOrder;
    use crate::codec::{Encoding, RecordCodec};
    use crate::record::Record;
    use crate::xrf::XrfFlag;
    use std::time::Duration;
    use tempfile::tempfile;

    const RECORD_AT: u64 = 64;

    fn manager_for(file: Arc<File>, params: FormatParams) -> LockManager {
        LockManager::new(
            Path::new("test.mst"),
            file,
            params,
            RetryPolicy::new(3, Duration::from_millis(1)),
            7,
            Arc::new(EngineMetrics::new()),
        )
    }

    fn setup(params: FormatParams) -> (Arc<File>, XrfEntry) {
        let file = tempfile().unwrap();
        file.set_len(512).unwrap();
        let codec = RecordCodec::new(params, Encoding::Cp1252);
        let bytes = codec.encode(&Record::with_mfn(1).field_with(1, "hello")).unwrap();
        write_all_at(&file, RECORD_AT, &bytes).unwrap();
        let entry = XrfEntry::active(Position::from_file_offset(RECORD_AT), XrfFlag::New);
        (Arc::new(file), entry)
    }

    #[test]
    fn test_data_entry_lock_counts() {
        let (file, _) = setup(FormatParams::standard());
        let locks = manager_for(file, FormatParams::standard());
        locks.acquire_data_entry_lock().unwrap();
        locks.acquire_data_entry_lock().unwrap();
        assert_eq!(locks.control_region().unwrap().data_entry_locks, 2);
        locks.release_data_entry_lock().unwrap();
        locks.release_data_entry_lock().unwrap();
        assert!(locks.release_data_entry_lock().is_err());
    }

    #[test]
    fn test_exclusive_excludes_data_entry() {
        let (file, _) = setup(FormatParams::standard());
        let locks = manager_for(file, FormatParams::standard());
        locks.acquire_exclusive_write_lock().unwrap();
        let err = locks.acquire_data_entry_lock().unwrap_err();
        assert_eq!(err.code(), crate::errors::MstErrorCode::Lock);
        locks.release_exclusive_write_lock().unwrap();
        locks.acquire_data_entry_lock().unwrap();
        assert!(locks.acquire_exclusive_write_lock().is_err());
    }

    #[test]
    fn test_invariant_violation_is_reported() {
        let (file, _) = setup(FormatParams::standard());
        let mut buf = [0u8; 8];
        ByteOrder::Direct.write_i32(&mut buf[4..], -1);
        write_all_at(&file, LOCK_REGION_AT, &buf).unwrap();
        let locks = manager_for(file, FormatParams::standard());
        let err = locks.acquire_data_entry_lock().unwrap_err();
        assert!(err.message().contains("invariant"));
    }

    #[test]
    fn test_record_lock_flips_length_sign() {
        let params = FormatParams::new(ByteOrder::Swapped, true, 2, 0).unwrap();
        let (file, entry) = setup(params);
        let locks = manager_for(file, params);
        let token = locks.lock_record(1, entry).unwrap();
        assert!(locks.is_record_locked(entry.position).unwrap());
        assert!(locks.lock_record(1, entry).is_err());
        locks.unlock_record(token).unwrap();
        assert!(!locks.is_record_locked(entry.position).unwrap());
        assert_eq!(locks.control_region().unwrap().data_entry_locks, 0);
    }

    #[test]
    fn test_foreign_token_rejected() {
        let (file, entry) = setup(FormatParams::standard());
        let locks = manager_for(file, FormatParams::standard());
        let mut token = locks.lock_record(1, entry).unwrap();
        token.session = 99;
        assert!(locks.unlock_record(token).is_err());
        assert!(locks.force_unlock_record(1, entry).unwrap());
        assert!(!locks.force_unlock_record(1, entry).unwrap());
    }

    #[test]
    fn test_deleted_record_cannot_be_locked() {
        let (file, entry) = setup(FormatParams::standard());
        let locks = manager_for(file, FormatParams::standard());
        let deleted = XrfEntry::logically_deleted(entry.position, XrfFlag::Normal);
        let err = locks.lock_record(1, deleted).unwrap_err();
        assert_eq!(err.code(), crate::errors::MstErrorCode::State);
    }
}
