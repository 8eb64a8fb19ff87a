//! Control record
//!
//! ```text
//! offset  size  field
//!      0     4  ctlmfn   always 0
//!      4     4  nxtmfn   next record number to assign
//!      8     4  nxtmfb   next write position, block (1-based)
//!     12     2  nxtmfp   next write position, offset in block
//!     14     2  mftype   low byte file type (0), high byte shift
//!     16     4  reccnt   reserved
//!     20     4  mfcxx1   reserved
//!     24     4  DEL      data-entry lock holders
//!     28     4  EWL      exclusive write lock flag
//! ```
//!
//! The engine owns bytes 0..24. Bytes 24..32 belong to the lock manager and
//! are never written by the record write path.

use crate::binary::ByteOrder;
use crate::codec::MAX_SHIFT;
use crate::errors::{MstError, MstResult};
use crate::record::Position;

/// Size of the control record on disk.
pub const CONTROL_LEN: usize = 32;
/// Part of the control record written by the engine.
pub const CONTROL_ENGINE_LEN: usize = 24;
/// Start of the lock region (DEL, EWL).
pub const LOCK_REGION_AT: u64 = 24;
pub const LOCK_REGION_LEN: u64 = 8;

/// The only supported master file type.
pub const FILE_TYPE_MASTER: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRecord {
    pub next_mfn: u32,
    pub next_position: Position,
    pub file_type: u8,
    pub shift: u8,
    pub reccnt: i32,
    pub mfcxx1: i32,
    /// Data-entry lock count
    pub del: i32,
    /// Exclusive write lock flag
    pub ewl: i32,
}

impl ControlRecord {
    /// Control record of an empty database.
    pub fn new(first_position: Position, shift: u8) -> Self {
        Self {
            next_mfn: 1,
            next_position: first_position,
            file_type: FILE_TYPE_MASTER,
            shift,
            reccnt: 0,
            mfcxx1: 0,
            del: 0,
            ewl: 0,
        }
    }

    pub fn decode(buf: &[u8], order: ByteOrder) -> MstResult<Self> {
        if buf.len() < CONTROL_LEN {
            return Err(MstError::format(format!(
                "control record needs {} bytes, got {}",
                CONTROL_LEN,
                buf.len()
            )));
        }
        let next_mfn = order.read_i32(&buf[4..]);
        let next_block = order.read_i32(&buf[8..]);
        if next_mfn < 1 || next_block < 1 {
            return Err(MstError::format_at_offset(
                4,
                format!(
                    "corrupted control record: next mfn {}, next block {}",
                    next_mfn, next_block
                ),
            ));
        }
        let mftype = order.read_u16(&buf[14..]);
        let shift = (mftype >> 8) as u8;
        if shift > MAX_SHIFT {
            return Err(MstError::format_at_offset(
                14,
                format!(
                    "corrupted control record: shift {} exceeds {}",
                    shift, MAX_SHIFT
                ),
            ));
        }
        Ok(Self {
            next_mfn: next_mfn as u32,
            next_position: Position::new(next_block as u32, order.read_u16(&buf[12..])),
            file_type: (mftype & 0xFF) as u8,
            shift,
            reccnt: order.read_i32(&buf[16..]),
            mfcxx1: order.read_i32(&buf[20..]),
            del: order.read_i32(&buf[24..]),
            ewl: order.read_i32(&buf[28..]),
        })
    }

    /// Full 32-byte image, lock region included.
    pub fn encode(&self, order: ByteOrder) -> [u8; CONTROL_LEN] {
        let mut buf = [0u8; CONTROL_LEN];
        order.write_i32(&mut buf[0..], 0);
        order.write_i32(&mut buf[4..], self.next_mfn as i32);
        order.write_i32(&mut buf[8..], self.next_position.block as i32);
        order.write_u16(&mut buf[12..], self.next_position.offset);
        order.write_u16(
            &mut buf[14..],
            (u16::from(self.shift) << 8) | u16::from(self.file_type),
        );
        order.write_i32(&mut buf[16..], self.reccnt);
        order.write_i32(&mut buf[20..], self.mfcxx1);
        order.write_i32(&mut buf[24..], self.del);
        order.write_i32(&mut buf[28..], self.ewl);
        buf
    }

    /// Image of the engine-owned prefix only.
    pub fn encode_engine_part(&self, order: ByteOrder) -> [u8; CONTROL_ENGINE_LEN] {
        let full = self.encode(order);
        let mut buf = [0u8; CONTROL_ENGINE_LEN];
        buf.copy_from_slice(&full[..CONTROL_ENGINE_LEN]);
        buf
    }

    /// Number of record numbers assigned so far, tombstones included.
    pub fn record_count(&self) -> u32 {
        self.next_mfn - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_direct() {
        let mut control = ControlRecord::new(Position::new(1, 64), 3);
        control.next_mfn = 9;
        let buf = control.encode(ByteOrder::Direct);
        assert_eq!(&buf[4..8], &9i32.to_le_bytes());
        assert_eq!(&buf[8..12], &1i32.to_le_bytes());
        assert_eq!(&buf[12..14], &64u16.to_le_bytes());
        assert_eq!(&buf[14..16], &[0, 3]);
        assert_eq!(ControlRecord::decode(&buf, ByteOrder::Direct).unwrap(), control);
    }

    #[test]
    fn test_swapped_round_trip() {
        let mut control = ControlRecord::new(Position::new(7, 200), 0);
        control.del = 2;
        let buf = control.encode(ByteOrder::Swapped);
        assert_eq!(&buf[4..8], &[0, 0, 0, 1]);
        assert_eq!(ControlRecord::decode(&buf, ByteOrder::Swapped).unwrap(), control);
    }

    #[test]
    fn test_engine_part_excludes_lock_region() {
        let mut control = ControlRecord::new(Position::new(1, 32), 0);
        control.ewl = 1;
        assert_eq!(control.encode_engine_part(ByteOrder::Direct).len(), 24);
    }

    #[test]
    fn test_corrupted_control_rejected() {
        let buf = [0u8; CONTROL_LEN];
        assert!(ControlRecord::decode(&buf, ByteOrder::Direct).is_err());
        assert!(ControlRecord::decode(&buf[..10], ByteOrder::Direct).is_err());
    }

    #[test]
    fn test_oversized_shift_rejected() {
        let mut buf = ControlRecord::new(Position::new(1, 32), 0).encode(ByteOrder::Direct);
        buf[15] = MAX_SHIFT + 1;
        let err = ControlRecord::decode(&buf, ByteOrder::Direct).unwrap_err();
        assert_eq!(err.code(), crate::errors::MstErrorCode::Format);
        assert!(err.message().contains("shift"));
    }
}
