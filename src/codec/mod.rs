//! Record codec
//!
//! Converts a logical [`Record`] to and from its physical byte layout:
//!
//! ```text
//! +---------------------------+
//! | Leader                    | header_size() bytes, see format.rs
//! +---------------------------+
//! | Directory                 | field_count * entry_size() bytes
//! +---------------------------+  <- base
//! | Field contents            | contiguous, in directory order
//! +---------------------------+
//! | Space padding             | only when the allocation is larger
//! +---------------------------+
//! ```
//!
//! Directory offsets are relative to `base` and are the running sum of the
//! encoded lengths of the previous fields.

mod encoding;
mod format;
mod leader;

pub use encoding::{guess_encoding, Encoding};
pub use format::{
    FormatParams, LEADER_PROBE_LEN, MAX_EXTENDED_RECORD, MAX_SHIFT, MAX_STANDARD_RECORD,
};
pub use leader::{DirectoryEntry, Leader, LEADER_ACTIVE, LEADER_DELETED};

use crate::errors::{MstError, MstResult};
use crate::record::{Field, Record, RecordStatus};

/// Largest tag a 2-byte directory slot can carry.
pub const MAX_DIRECTORY_TAG: u32 = u16::MAX as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordCodec {
    params: FormatParams,
    encoding: Encoding,
}

impl RecordCodec {
    pub fn new(params: FormatParams, encoding: Encoding) -> Self {
        Self { params, encoding }
    }

    pub fn params(&self) -> &FormatParams {
        &self.params
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Encodes `record` at its natural length.
    pub fn encode(&self, record: &Record) -> MstResult<Vec<u8>> {
        self.encode_with_span(record, 0)
    }

    /// Encodes `record` into an allocation of at least `span` bytes. When
    /// the span is larger than the record, the tail is filled with spaces
    /// and the stored length covers the whole span.
    pub fn encode_with_span(&self, record: &Record, span: usize) -> MstResult<Vec<u8>> {
        let status = match record.status {
            RecordStatus::Active => LEADER_ACTIVE,
            RecordStatus::LogicallyDeleted => LEADER_DELETED,
            RecordStatus::PhysicallyDeleted => {
                return Err(MstError::state(format!(
                    "mfn {}: physically deleted records have no master image",
                    record.mfn
                )))
            }
        };

        let contents = record
            .fields
            .iter()
            .map(|f| self.encode_field(f))
            .collect::<MstResult<Vec<_>>>()?;

        if contents.len() > u16::MAX as usize {
            return Err(MstError::capacity(format!(
                "mfn {}: {} fields exceed the directory limit",
                record.mfn,
                contents.len()
            )));
        }

        let base = self.params.expected_base(contents.len());
        let logical = base + contents.iter().map(|(_, c)| c.len()).sum::<usize>();
        self.check_length(record.mfn, logical)?;
        let total = logical.max(span);
        self.check_length(record.mfn, total)?;

        let mut buf = vec![b' '; total];
        let leader = Leader {
            mfn: record.mfn,
            length: total as u32,
            locked: false,
            back_pointer: record.back_pointer,
            base: base as u32,
            field_count: contents.len() as u16,
            status,
        };
        leader.encode_into(&mut buf, &self.params);

        let header = self.params.header_size();
        let entry_size = self.params.entry_size();
        let mut offset = 0usize;
        for (i, (tag, content)) in contents.iter().enumerate() {
            let entry = DirectoryEntry {
                tag: *tag,
                offset: offset as u32,
                length: content.len() as u32,
            };
            let at = header + i * entry_size;
            entry.encode_into(&mut buf[at..at + entry_size], &self.params);
            buf[base + offset..base + offset + content.len()].copy_from_slice(content);
            offset += content.len();
        }

        Ok(buf)
    }

    /// Encoded length without padding. Validates tags, size and encoding.
    pub fn encoded_len(&self, record: &Record) -> MstResult<usize> {
        self.encode(record).map(|buf| buf.len())
    }

    /// Decodes only the leader.
    pub fn decode_leader(&self, buf: &[u8]) -> MstResult<Leader> {
        Leader::decode(buf, &self.params)
    }

    /// Decodes a full record. `buf` must hold at least the stored length.
    pub fn decode(&self, buf: &[u8]) -> MstResult<Record> {
        let leader = self.decode_leader(buf)?;
        let length = leader.length as usize;
        if length < self.params.min_record_len() || length > self.params.max_record_len() {
            return Err(MstError::format(format!(
                "mfn {}: stored length {} outside {}..={}",
                leader.mfn,
                length,
                self.params.min_record_len(),
                self.params.max_record_len()
            )));
        }
        if buf.len() < length {
            return Err(MstError::format(format!(
                "mfn {}: record truncated, expected {} bytes, got {}",
                leader.mfn,
                length,
                buf.len()
            )));
        }
        if !leader.base_matches(&self.params) {
            return Err(MstError::format(format!(
                "mfn {}: directory mismatch, base {} but {} fields need {}",
                leader.mfn,
                leader.base,
                leader.field_count,
                self.params.expected_base(leader.field_count as usize)
            )));
        }

        let header = self.params.header_size();
        let entry_size = self.params.entry_size();
        let base = leader.base as usize;
        let mut fields = Vec::with_capacity(leader.field_count as usize);
        for i in 0..leader.field_count as usize {
            let at = header + i * entry_size;
            let entry = DirectoryEntry::decode(&buf[at..at + entry_size], &self.params);
            let start = base + entry.offset as usize;
            let end = start + entry.length as usize;
            if end > length {
                return Err(MstError::format(format!(
                    "mfn {}: field {} (tag {}) ends at {} past record length {}",
                    leader.mfn, i, entry.tag, end, length
                )));
            }
            fields.push(Field {
                tag: u32::from(entry.tag),
                content: self.encoding.decode(&buf[start..end])?,
            });
        }

        let status = match leader.status {
            LEADER_ACTIVE => RecordStatus::Active,
            LEADER_DELETED => RecordStatus::LogicallyDeleted,
            other => {
                return Err(MstError::format(format!(
                    "mfn {}: unknown status word {}",
                    leader.mfn, other
                )))
            }
        };

        Ok(Record {
            mfn: leader.mfn,
            status,
            active_status: None,
            fields,
            back_pointer: leader.back_pointer,
            locked: leader.locked,
        })
    }

    fn encode_field(&self, field: &Field) -> MstResult<(u16, Vec<u8>)> {
        if field.tag == 0 || field.tag > MAX_DIRECTORY_TAG {
            return Err(MstError::range(format!(
                "tag {} does not fit a directory entry (1..={})",
                field.tag, MAX_DIRECTORY_TAG
            )));
        }
        Ok((field.tag as u16, self.encoding.encode(&field.content)?))
    }

    fn check_length(&self, mfn: u32, length: usize) -> MstResult<()> {
        if length > self.params.max_record_len() {
            return Err(MstError::capacity(format!(
                "mfn {}: record length {} exceeds maximum {}",
                mfn,
                length,
                self.params.max_record_len()
            )));
        }
        if length < self.params.min_record_len() {
            return Err(MstError::capacity(format!(
                "mfn {}: record length {} below minimum {}",
                mfn,
                length,
                self.params.min_record_len()
            )));
        }
        Ok(())
    }
}
