//! Disk engine
//!
//! Record images are appended at the control record's next write position
//! and never moved. An update either rewrites the previous image in place
//! (only when it is the last image in the file and the new encoding fits
//! its span) or appends a new image whose back pointer names the old one.
//!
//! Write order for one record: tombstones for skipped numbers, master
//! image, cross-reference pointer, control record. A crash in between
//! leaves unreachable bytes at worst; nothing is rolled back.

use std::fs::{File, OpenOptions};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::binary::{align_up, ByteOrder};
use crate::codec::{guess_encoding, Encoding, FormatParams, Leader, RecordCodec};
use crate::config::{DatabasePaths, EncodingChoice, MasterConfig, XrfStrategy};
use crate::detect::{detect_byte_order, detect_layout, platform_default_filler};
use crate::errors::{MstError, MstResult};
use crate::lock::{ControlRegion, LockManager, RecordLockToken};
use crate::observability::{log_event_with_fields, EngineMetrics, Event, MetricsSnapshot};
use crate::record::{Position, Record, RecordStatus, BLOCK_SIZE};
use crate::xrf::{DirectXrf, MemoryXrf, PagedXrf, XrfEntry, XrfFile, XrfFlag, XrfStore};

use super::buffer::RecordBuffer;
use super::control::{ControlRecord, CONTROL_LEN, FILE_TYPE_MASTER};
use super::fileio::{file_len, read_at_most, read_exact_at, write_all_at};
use super::store::MasterStore;

/// Records sampled when the encoding is chosen automatically.
const ENCODING_SAMPLE_RECORDS: u32 = 50;

pub struct DiskMaster {
    paths: DatabasePaths,
    file: Arc<File>,
    codec: RecordCodec,
    control: ControlRecord,
    xrf: Box<dyn XrfStore>,
    buffer: RecordBuffer,
    locks: Option<LockManager>,
    metrics: Arc<EngineMetrics>,
    closed: bool,
}

impl DiskMaster {
    /// Creates an empty database, replacing existing files.
    pub fn create(paths: &DatabasePaths, config: &MasterConfig) -> MstResult<Self> {
        config.validate()?;
        let params = FormatParams::new(
            config.byte_order.unwrap_or_default(),
            config.extended.unwrap_or(false),
            config.filler.unwrap_or_else(platform_default_filler),
            config.resolved_shift()?,
        )?;
        let encoding = match config.encoding_choice()? {
            EncodingChoice::Fixed(encoding) => encoding,
            EncodingChoice::Auto => Encoding::default(),
        };

        let master_path = paths.master();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&master_path)
            .map_err(|e| {
                MstError::io(format!("Failed to create master file: {}", master_path.display()), e)
            })?;

        let first =
            Position::from_file_offset(align_up(CONTROL_LEN as u64, params.record_alignment()));
        let control = ControlRecord::new(first, params.shift());
        write_all_at(&file, 0, &control.encode(params.byte_order()))?;
        file.set_len(align_up(first.file_offset(), BLOCK_SIZE))
            .map_err(|e| MstError::io("Failed to size master file", e))?;
        file.sync_all()
            .map_err(|e| MstError::io("Failed to sync master file", e))?;

        let xrf_file = XrfFile::create(&paths.xrf(), params.byte_order())?;
        let master = Self::assemble(paths, file, params, encoding, control, xrf_file, config)?;

        log_event_with_fields(
            Event::MasterCreate,
            &[
                ("format", params.describe().as_str()),
                ("encoding", encoding.name()),
                ("path", paths.base().display().to_string().as_str()),
            ],
        );
        Ok(master)
    }

    /// Opens an existing database, detecting whatever the configuration
    /// leaves unset.
    pub fn open(paths: &DatabasePaths, config: &MasterConfig) -> MstResult<Self> {
        config.validate()?;
        let master_path = paths.master();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&master_path)
            .map_err(|e| {
                MstError::io(format!("Failed to open master file: {}", master_path.display()), e)
            })?;

        let len = file_len(&file)?;
        let mut raw = [0u8; CONTROL_LEN];
        if read_at_most(&file, 0, &mut raw)? < CONTROL_LEN {
            return Err(MstError::format(format!(
                "{} is too short to hold a control record",
                master_path.display()
            )));
        }

        let order = match config.byte_order {
            Some(order) => order,
            None => detect_byte_order(&raw, len)?,
        };
        let control = ControlRecord::decode(&raw, order)?;
        if control.file_type != FILE_TYPE_MASTER {
            return Err(MstError::format(format!(
                "unsupported file type {} in {}",
                control.file_type,
                master_path.display()
            )));
        }

        let mut xrf_file = XrfFile::open(&paths.xrf(), order)?;
        let params = Self::resolve_layout(&file, &mut xrf_file, &control, order, config)?;

        let encoding = match config.encoding_choice()? {
            EncodingChoice::Fixed(encoding) => encoding,
            EncodingChoice::Auto => {
                let sample = Self::sample_field_bytes(&file, &mut xrf_file, &control, params)?;
                let encoding = guess_encoding(&sample);
                log_event_with_fields(
                    Event::EncodingGuessed,
                    &[
                        ("encoding", encoding.name()),
                        ("sample_bytes", sample.len().to_string().as_str()),
                    ],
                );
                encoding
            }
        };

        let master = Self::assemble(paths, file, params, encoding, control, xrf_file, config)?;
        log_event_with_fields(
            Event::MasterOpen,
            &[
                ("format", params.describe().as_str()),
                ("next_mfn", control.next_mfn.to_string().as_str()),
                ("path", paths.base().display().to_string().as_str()),
            ],
        );
        Ok(master)
    }

    fn resolve_layout(
        file: &File,
        xrf: &mut XrfFile,
        control: &ControlRecord,
        order: ByteOrder,
        config: &MasterConfig,
    ) -> MstResult<FormatParams> {
        let shift = control.shift;
        if let (Some(extended), Some(filler)) = (config.extended, config.filler) {
            return FormatParams::new(order, extended, filler, shift);
        }

        match detect_layout(file, xrf, control.next_mfn, order, shift)? {
            Some(params) => {
                let conflicts = config.extended.map_or(false, |e| e != params.is_extended())
                    || config.filler.map_or(false, |f| f != params.filler());
                if conflicts {
                    return Err(MstError::format(format!(
                        "configured layout disagrees with the file, which is {}",
                        params.describe()
                    )));
                }
                log_event_with_fields(
                    Event::FormatDetected,
                    &[("format", params.describe().as_str())],
                );
                Ok(params)
            }
            None => {
                let params = FormatParams::new(
                    order,
                    config.extended.unwrap_or(false),
                    config.filler.unwrap_or_else(platform_default_filler),
                    shift,
                )?;
                log_event_with_fields(
                    Event::FormatFallback,
                    &[
                        ("format", params.describe().as_str()),
                        ("reason", "no record images to probe"),
                    ],
                );
                Ok(params)
            }
        }
    }

    /// Raw field bytes of the first records, read byte-for-byte.
    fn sample_field_bytes(
        file: &File,
        xrf: &mut XrfFile,
        control: &ControlRecord,
        params: FormatParams,
    ) -> MstResult<Vec<u8>> {
        let codec = RecordCodec::new(params, Encoding::Latin1);
        let mut sample = Vec::new();
        let last = control.record_count().min(ENCODING_SAMPLE_RECORDS);
        for mfn in 1..=last {
            let (block, slot) = crate::xrf::locate(mfn)?;
            let entry = XrfEntry::unpack(xrf.read_word(block, slot)?, params.shift());
            if entry.is_tombstone() {
                continue;
            }
            let at = entry.position.file_offset();
            let mut head = vec![0u8; params.header_size()];
            read_exact_at(file, at, &mut head)?;
            let leader = codec.decode_leader(&head)?;
            let mut buf = vec![0u8; leader.length as usize];
            read_exact_at(file, at, &mut buf)?;
            for field in codec.decode(&buf)?.fields {
                sample.extend(Encoding::Latin1.encode(&field.content)?);
            }
        }
        Ok(sample)
    }

    fn assemble(
        paths: &DatabasePaths,
        file: File,
        params: FormatParams,
        encoding: Encoding,
        control: ControlRecord,
        xrf_file: XrfFile,
        config: &MasterConfig,
    ) -> MstResult<Self> {
        let metrics = Arc::new(EngineMetrics::new());
        let shift = params.shift();
        let xrf: Box<dyn XrfStore> = match config.xrf_strategy() {
            XrfStrategy::Direct => Box::new(DirectXrf::new(xrf_file, shift)),
            XrfStrategy::Paged { write_through } => Box::new(PagedXrf::new(
                xrf_file,
                shift,
                write_through,
                Arc::clone(&metrics),
            )),
            XrfStrategy::Memory => Box::new(MemoryXrf::load(xrf_file, shift)?),
        };

        let file = Arc::new(file);
        let locks = if config.multi_user {
            Some(LockManager::new(
                &paths.master(),
                Arc::clone(&file),
                params,
                config.retry_policy(),
                session_id(),
                Arc::clone(&metrics),
            ))
        } else {
            None
        };

        Ok(Self {
            paths: paths.clone(),
            file,
            codec: RecordCodec::new(params, encoding),
            control,
            xrf,
            buffer: RecordBuffer::with_capacity(params.max_record_len().min(64 * 1024)),
            locks,
            metrics,
            closed: false,
        })
    }

    pub fn paths(&self) -> &DatabasePaths {
        &self.paths
    }

    pub fn params(&self) -> &FormatParams {
        self.codec.params()
    }

    pub fn encoding(&self) -> Encoding {
        self.codec.encoding()
    }

    pub fn control(&self) -> &ControlRecord {
        &self.control
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Cross-reference pointer of `mfn`.
    pub fn entry(&mut self, mfn: u32) -> MstResult<XrfEntry> {
        self.check_mfn(mfn)?;
        self.xrf.read(mfn)
    }

    /// The lock manager; only present on multi-user handles.
    pub fn lock_manager(&self) -> MstResult<&LockManager> {
        self.locks
            .as_ref()
            .ok_or_else(|| MstError::state("locking requires a multi-user handle"))
    }

    pub fn control_region(&self) -> MstResult<ControlRegion> {
        self.lock_manager()?.control_region()
    }

    pub fn lock_record(&mut self, mfn: u32) -> MstResult<RecordLockToken> {
        let entry = self.entry(mfn)?;
        self.lock_manager()?.lock_record(mfn, entry)
    }

    pub fn unlock_record(&self, token: RecordLockToken) -> MstResult<()> {
        self.lock_manager()?.unlock_record(token)
    }

    pub fn force_unlock_record(&mut self, mfn: u32) -> MstResult<bool> {
        let entry = self.entry(mfn)?;
        self.lock_manager()?.force_unlock_record(mfn, entry)
    }

    fn refresh_control(&mut self) -> MstResult<()> {
        let mut raw = [0u8; CONTROL_LEN];
        read_exact_at(&self.file, 0, &mut raw)?;
        self.control = ControlRecord::decode(&raw, self.codec.params().byte_order())?;
        Ok(())
    }

    fn write_control(&self) -> MstResult<()> {
        let order = self.codec.params().byte_order();
        write_all_at(&self.file, 0, &self.control.encode_engine_part(order))
    }

    fn check_mfn(&mut self, mfn: u32) -> MstResult<()> {
        if mfn >= self.control.next_mfn && self.locks.is_some() {
            self.refresh_control()?;
        }
        if mfn == 0 || mfn >= self.control.next_mfn {
            return Err(MstError::mfn_out_of_range(mfn, self.control.next_mfn));
        }
        Ok(())
    }

    fn read_leader(&mut self, mfn: u32, at: u64) -> MstResult<Leader> {
        let header = self.codec.params().header_size();
        let head = self.buffer.slice_mut(header);
        read_exact_at(&self.file, at, head)?;
        let leader = self.codec.decode_leader(head)?;
        if leader.mfn != mfn {
            return Err(MstError::format_at_offset(
                at,
                format!("pointer of mfn {} leads to a leader for mfn {}", mfn, leader.mfn),
            ));
        }
        Ok(leader)
    }

    fn read_image(&mut self, mfn: u32, position: Position) -> MstResult<Record> {
        let at = position.file_offset();
        let leader = self.read_leader(mfn, at)?;
        let length = leader.length as usize;
        if length < self.codec.params().min_record_len()
            || length > self.codec.params().max_record_len()
        {
            return Err(MstError::format_at_offset(
                at,
                format!("mfn {}: stored length {} out of range", mfn, length),
            ));
        }
        let image = self.buffer.slice_mut(length);
        read_exact_at(&self.file, at, image)?;
        let record = self
            .codec
            .decode(image)
            .map_err(|e| e.with_details(format!("byte_offset: {}", at)))?;
        self.metrics.increment_records_read();
        Ok(record)
    }

    /// Appends an image at the next write position and advances it.
    fn append(&mut self, bytes: &[u8]) -> MstResult<Position> {
        let position = self.control.next_position;
        let at = position.file_offset();
        write_all_at(&self.file, at, bytes)?;

        let end = at + bytes.len() as u64;
        let next = align_up(end, self.codec.params().record_alignment());
        let wanted = align_up(next, BLOCK_SIZE);
        if file_len(&self.file)? < wanted {
            self.file
                .set_len(wanted)
                .map_err(|e| MstError::io("Failed to extend master file", e))?;
        }
        self.control.next_position = Position::from_file_offset(next);
        self.metrics.increment_records_appended();
        Ok(position)
    }

    fn write_tombstones(&mut self, from: u32, to: u32) -> MstResult<()> {
        for mfn in from..to {
            self.xrf.write(mfn, XrfEntry::tombstone())?;
        }
        let count = u64::from(to - from);
        self.metrics.add_tombstones(count);
        log_event_with_fields(
            Event::TombstonesWritten,
            &[
                ("from", from.to_string().as_str()),
                ("to", (to - 1).to_string().as_str()),
                ("count", count.to_string().as_str()),
            ],
        );
        Ok(())
    }

    fn entry_for(position: Position, status: RecordStatus, flag: XrfFlag) -> XrfEntry {
        match status {
            RecordStatus::LogicallyDeleted => XrfEntry::logically_deleted(position, flag),
            _ => XrfEntry::active(position, flag),
        }
    }

    fn finish(record: &mut Record, flag: XrfFlag) {
        record.active_status = match record.status {
            RecordStatus::Active => Some(flag.active_status()),
            _ => None,
        };
    }

    fn write_new(&mut self, record: &mut Record) -> MstResult<u32> {
        let next = self.control.next_mfn;
        let mfn = record.mfn.max(next);
        record.mfn = mfn;
        record.back_pointer = Position::NONE;

        let image = match record.status {
            RecordStatus::PhysicallyDeleted => None,
            _ => {
                let bytes = self.codec.encode(record)?;
                XrfEntry::check_position(self.control.next_position, self.xrf.shift())?;
                Some(bytes)
            }
        };

        if mfn > next {
            self.write_tombstones(next, mfn)?;
        }
        match image {
            Some(bytes) => {
                let position = self.append(&bytes)?;
                let entry = Self::entry_for(position, record.status, XrfFlag::New);
                self.xrf.write(mfn, entry)?;
            }
            None => self.write_tombstones(mfn, mfn + 1)?,
        }
        self.control.next_mfn = mfn + 1;
        Self::finish(record, XrfFlag::New);
        Ok(mfn)
    }

    fn write_update(&mut self, record: &mut Record, allow_inactive: bool) -> MstResult<u32> {
        let mfn = record.mfn;
        let prior = self.xrf.read(mfn)?;
        if prior.status != RecordStatus::Active && !allow_inactive {
            return Err(MstError::state(format!(
                "mfn {} is {}; updating it needs allow_inactive",
                mfn,
                prior.status.as_str()
            )));
        }

        if record.status == RecordStatus::PhysicallyDeleted {
            self.write_tombstones(mfn, mfn + 1)?;
            record.back_pointer = Position::NONE;
            record.active_status = None;
            return Ok(mfn);
        }

        let flag = if prior.is_tombstone() || prior.flag.is_new() {
            XrfFlag::New
        } else {
            XrfFlag::Pending
        };
        let natural = self.codec.encoded_len(record)?;

        if !prior.is_tombstone() {
            let at = prior.position.file_offset();
            let leader = self.read_leader(mfn, at)?;
            let span = leader.length as usize;
            let alignment = self.codec.params().record_alignment();
            let is_last = align_up(at + span as u64, alignment)
                == self.control.next_position.file_offset();

            if is_last && natural <= span {
                record.back_pointer = leader.back_pointer;
                let mut bytes = self.codec.encode_with_span(record, span)?;
                if leader.locked {
                    let params = self.codec.params();
                    params.byte_order().write_int(
                        &mut bytes[params.length_at()..],
                        params.wide(),
                        -(span as i32),
                    );
                }
                write_all_at(&self.file, at, &bytes)?;
                self.metrics.increment_records_rewritten();
                self.xrf
                    .write(mfn, Self::entry_for(prior.position, record.status, flag))?;
                Self::finish(record, flag);
                return Ok(mfn);
            }
            record.back_pointer = prior.position;
        } else {
            record.back_pointer = Position::NONE;
        }

        let bytes = self.codec.encode(record)?;
        XrfEntry::check_position(self.control.next_position, self.xrf.shift())?;
        let position = self.append(&bytes)?;
        self.xrf.write(mfn, Self::entry_for(position, record.status, flag))?;
        Self::finish(record, flag);
        Ok(mfn)
    }

    fn write_unlocked(&mut self, record: &mut Record, allow_inactive: bool) -> MstResult<u32> {
        let mfn = if record.mfn == 0 || record.mfn >= self.control.next_mfn {
            self.write_new(record)?
        } else {
            self.write_update(record, allow_inactive)?
        };
        self.write_control()?;
        Ok(mfn)
    }

    /// Multi-user write: data-entry lock, then the control record's byte
    /// range for the whole read-modify-write so mfn assignment and the next
    /// write position stay consistent across processes.
    fn write_shared(&mut self, record: &mut Record, allow_inactive: bool) -> MstResult<u32> {
        let Some(locks) = self.locks.take() else {
            return self.write_unlocked(record, allow_inactive);
        };
        let result = locks.acquire_data_entry_lock().and_then(|_| {
            let written = locks.lock_control_record().and_then(|_guard| {
                self.refresh_control()?;
                self.write_unlocked(record, allow_inactive)
            });
            let released = locks.release_data_entry_lock();
            let mfn = written?;
            released.map(|_| mfn)
        });
        self.locks = Some(locks);
        result
    }
}

/// Identifies lock tokens issued by one handle.
fn session_id() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (u64::from(std::process::id()) << 32) | u64::from(nanos)
}

impl MasterStore for DiskMaster {
    fn next_mfn(&self) -> u32 {
        self.control.next_mfn
    }

    fn read(&mut self, mfn: u32) -> MstResult<Record> {
        self.check_mfn(mfn)?;
        let entry = self.xrf.read(mfn)?;
        if entry.is_tombstone() {
            return Ok(Record::placeholder(mfn, RecordStatus::PhysicallyDeleted));
        }
        let mut record = self.read_image(mfn, entry.position)?;
        record.status = entry.status;
        record.active_status = match entry.status {
            RecordStatus::Active => Some(entry.flag.active_status()),
            _ => None,
        };
        Ok(record)
    }

    fn write_record(&mut self, record: &mut Record, allow_inactive: bool) -> MstResult<u32> {
        if self.closed {
            return Err(MstError::state("database handle is closed"));
        }
        self.validate(record)?;
        if self.locks.is_some() {
            self.write_shared(record, allow_inactive)
        } else {
            self.write_unlocked(record, allow_inactive)
        }
    }

    fn validate(&self, record: &Record) -> MstResult<()> {
        match record.status {
            RecordStatus::PhysicallyDeleted => Ok(()),
            _ => self.codec.encoded_len(record).map(|_| ()),
        }
    }

    fn flush(&mut self) -> MstResult<()> {
        if self.locks.is_none() {
            self.write_control()?;
        }
        self.xrf.flush()?;
        self.file
            .sync_data()
            .map_err(|e| MstError::io("Failed to sync master file", e))
    }

    fn close(&mut self) -> MstResult<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.xrf.close()?;
        self.closed = true;
        log_event_with_fields(
            Event::MasterClose,
            &[
                ("next_mfn", self.control.next_mfn.to_string().as_str()),
                ("metrics", self.metrics.to_json().as_str()),
                ("path", self.paths.base().display().to_string().as_str()),
            ],
        );
        Ok(())
    }
}

impl Drop for DiskMaster {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.close() {
            log_event_with_fields(
                Event::MasterCloseFailed,
                &[
                    ("error", err.to_string().as_str()),
                    ("path", self.paths.base().display().to_string().as_str()),
                ],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create(dir: &TempDir, config: &MasterConfig) -> DiskMaster {
        DiskMaster::create(&DatabasePaths::new(dir.path().join("db")), config).unwrap()
    }

    #[test]
    fn test_create_layout() {
        let dir = TempDir::new().unwrap();
        let master = create(&dir, &MasterConfig::default());
        assert_eq!(master.next_mfn(), 1);
        assert_eq!(master.control().next_position, Position::new(1, 32));
        let len = std::fs::metadata(dir.path().join("db.mst")).unwrap().len();
        assert_eq!(len, 512);
    }

    #[test]
    fn test_first_position_follows_shift_alignment() {
        let dir = TempDir::new().unwrap();
        let config = MasterConfig {
            shift: 6,
            ..MasterConfig::default()
        };
        let master = create(&dir, &config);
        assert_eq!(master.control().next_position, Position::new(1, 64));
        assert_eq!(master.control().shift, 6);
    }

    #[test]
    fn test_appended_records_are_aligned() {
        let dir = TempDir::new().unwrap();
        let config = MasterConfig {
            shift: 3,
            ..MasterConfig::default()
        };
        let mut master = create(&dir, &config);
        for text in ["a", "bcd", "efghijk"] {
            master.write(&mut Record::new().field_with(1, text)).unwrap();
            assert_eq!(master.control().next_position.offset % 8, 0);
        }
    }

    #[test]
    fn test_locked_record_stays_locked_after_in_place_rewrite() {
        let dir = TempDir::new().unwrap();
        let config = MasterConfig {
            multi_user: true,
            lock_retries: 2,
            lock_backoff_ms: 1,
            ..MasterConfig::default()
        };
        let mut master = create(&dir, &config);
        let mut record = Record::new().field_with(1, "hello");
        master.write(&mut record).unwrap();
        let token = master.lock_record(1).unwrap();

        record.fields[0].content = "hey".to_string();
        master.write(&mut record).unwrap();
        assert!(master.read(1).unwrap().locked);

        master.unlock_record(token).unwrap();
        assert!(!master.read(1).unwrap().locked);
    }

    #[test]
    fn test_locking_needs_multi_user() {
        let dir = TempDir::new().unwrap();
        let mut master = create(&dir, &MasterConfig::default());
        master.write(&mut Record::new().field_with(1, "x")).unwrap();
        let err = master.lock_record(1).unwrap_err();
        assert_eq!(err.code(), crate::errors::MstErrorCode::State);
    }

    #[test]
    fn test_swapped_control_on_disk() {
        let dir = TempDir::new().unwrap();
        let config = MasterConfig {
            byte_order: Some(ByteOrder::Swapped),
            ..MasterConfig::default()
        };
        let mut master = create(&dir, &config);
        master.write(&mut Record::new().field_with(1, "x")).unwrap();
        master.close().unwrap();
        let raw = std::fs::read(dir.path().join("db.mst")).unwrap();
        assert_eq!(&raw[4..8], &[0, 0, 0, 2]);
    }

    #[test]
    fn test_metrics_count_writes() {
        let dir = TempDir::new().unwrap();
        let mut master = create(&dir, &MasterConfig::default());
        master.write(&mut Record::new().field_with(1, "x")).unwrap();
        master.write(&mut Record::with_mfn(4).field_with(1, "y")).unwrap();
        master.read(4).unwrap();
        let snapshot = master.metrics();
        assert_eq!(snapshot.records_appended, 2);
        assert_eq!(snapshot.tombstones_written, 2);
        assert_eq!(snapshot.records_read, 1);
    }

    /// Pointer store whose flush always fails.
    struct UnflushableXrf;

    impl XrfStore for UnflushableXrf {
        fn read(&mut self, _mfn: u32) -> MstResult<XrfEntry> {
            Ok(XrfEntry::tombstone())
        }

        fn write(&mut self, _mfn: u32, _entry: XrfEntry) -> MstResult<()> {
            Ok(())
        }

        fn flush(&mut self) -> MstResult<()> {
            Err(MstError::state("xrf device gone"))
        }

        fn shift(&self) -> u8 {
            0
        }

        fn block_count(&self) -> u32 {
            1
        }
    }

    #[test]
    fn test_failed_close_on_drop_is_logged() {
        let dir = TempDir::new().unwrap();
        let mut master = create(&dir, &MasterConfig::default());
        master.xrf = Box::new(UnflushableXrf);

        let lines = crate::observability::capture_logs(|| drop(master));
        let failure = lines
            .iter()
            .find(|l| l.contains("MASTER_CLOSE_FAILED"))
            .expect("close failure logged");
        assert!(failure.contains("\"severity\":\"ERROR\""));
        assert!(failure.contains("xrf device gone"));
    }
}
