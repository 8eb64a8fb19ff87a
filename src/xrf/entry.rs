//! Packed cross-reference pointers.
//!
//! Each record number owns one signed 32-bit word:
//!
//! ```text
//!  sign | block (20 + shift bits)        | new | pending | offset >> shift (9 - shift bits)
//! ```
//!
//! With `L = 11 - shift`, `packed = (block << L) + ((offset + bias) >> shift)`
//! where the bias is 1024 for "new", 512 for "pending" and 0 otherwise. The
//! word is negated for deleted records; a negated pointer to block 1,
//! offset 0 (where the control record lives) is the physically deleted
//! tombstone.

use serde::{Deserialize, Serialize};

use crate::errors::{MstError, MstResult};
use crate::record::{ActiveStatus, Position, RecordStatus, BLOCK_SIZE};

const NEW_BIAS: u32 = 1024;
const PENDING_BIAS: u32 = 512;

/// Index-maintenance flag folded into the pointer offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XrfFlag {
    Normal,
    /// Modified since the last index update
    Pending,
    /// Created since the last index update (implies pending)
    New,
}

impl XrfFlag {
    pub fn is_pending(&self) -> bool {
        !matches!(self, XrfFlag::Normal)
    }

    pub fn is_new(&self) -> bool {
        matches!(self, XrfFlag::New)
    }

    fn bias(&self) -> u32 {
        match self {
            XrfFlag::Normal => 0,
            XrfFlag::Pending => PENDING_BIAS,
            XrfFlag::New => NEW_BIAS,
        }
    }

    pub fn active_status(&self) -> ActiveStatus {
        match self {
            XrfFlag::Normal => ActiveStatus::Normal,
            XrfFlag::Pending => ActiveStatus::PendingIndexUpdate,
            XrfFlag::New => ActiveStatus::New,
        }
    }
}

/// Unpacked pointer for one record number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct XrfEntry {
    pub position: Position,
    pub status: RecordStatus,
    pub flag: XrfFlag,
}

impl XrfEntry {
    pub fn active(position: Position, flag: XrfFlag) -> Self {
        Self {
            position,
            status: RecordStatus::Active,
            flag,
        }
    }

    pub fn logically_deleted(position: Position, flag: XrfFlag) -> Self {
        Self {
            position,
            status: RecordStatus::LogicallyDeleted,
            flag,
        }
    }

    pub fn tombstone() -> Self {
        Self {
            position: Position::new(1, 0),
            status: RecordStatus::PhysicallyDeleted,
            flag: XrfFlag::Normal,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.status == RecordStatus::PhysicallyDeleted
    }

    /// Largest block number addressable with `shift`.
    pub fn max_block(shift: u8) -> u32 {
        (1u32 << (20 + u32::from(shift))) - 1
    }

    /// Database capacity in bytes for `shift`.
    pub fn capacity_bytes(shift: u8) -> u64 {
        (u64::from(Self::max_block(shift)) + 1) * BLOCK_SIZE
    }

    /// Fails when `position` cannot be packed with `shift`.
    pub fn check_position(position: Position, shift: u8) -> MstResult<()> {
        if position.block > Self::max_block(shift) {
            return Err(MstError::capacity(format!(
                "block {} exceeds the {}-block address space of shift {}",
                position.block,
                Self::max_block(shift),
                shift
            ))
            .with_details("raise the address-space shift"));
        }
        if u64::from(position.offset) >= BLOCK_SIZE {
            return Err(MstError::range(format!(
                "offset {} outside a {}-byte block",
                position.offset, BLOCK_SIZE
            )));
        }
        if position.offset % (1u16 << shift) != 0 {
            return Err(MstError::range(format!(
                "offset {} is not a multiple of {}",
                position.offset,
                1u32 << shift
            )));
        }
        Ok(())
    }

    pub fn pack(&self, shift: u8) -> MstResult<i32> {
        let l = 11 - u32::from(shift);
        if self.is_tombstone() {
            return Ok(-(1i32 << l));
        }
        Self::check_position(self.position, shift)?;
        let biased = u32::from(self.position.offset) + self.flag.bias();
        let packed = ((self.position.block << l) + (biased >> shift)) as i32;
        Ok(match self.status {
            RecordStatus::LogicallyDeleted => -packed,
            _ => packed,
        })
    }

    /// Inverse of [`pack`](Self::pack). A zero word (never written) reads
    /// as a tombstone.
    pub fn unpack(packed: i32, shift: u8) -> Self {
        if packed == 0 {
            return Self::tombstone();
        }
        let l = 11 - u32::from(shift);
        let magnitude = packed.unsigned_abs();
        let block = magnitude >> l;
        let raw = (magnitude & (0x7FF >> shift)) << shift;
        let flag = if magnitude & (0x400 >> shift) != 0 {
            XrfFlag::New
        } else if magnitude & (0x600 >> shift) != 0 {
            XrfFlag::Pending
        } else {
            XrfFlag::Normal
        };
        let position = Position::new(block, (raw & 0x1FF) as u16);

        if packed > 0 {
            return Self::active(position, flag);
        }
        if position == Position::new(1, 0) {
            return Self::tombstone();
        }
        Self::logically_deleted(position, flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tombstone_word() {
        assert_eq!(XrfEntry::tombstone().pack(0).unwrap(), -2048);
        assert_eq!(XrfEntry::tombstone().pack(3).unwrap(), -256);
        assert!(XrfEntry::unpack(-2048, 0).is_tombstone());
    }

    #[test]
    fn test_known_packing_shift_zero() {
        let entry = XrfEntry::active(Position::new(3, 100), XrfFlag::New);
        // (3 << 11) + 100 + 1024
        assert_eq!(entry.pack(0).unwrap(), 7268);
        let pending = XrfEntry::logically_deleted(Position::new(3, 100), XrfFlag::Pending);
        assert_eq!(pending.pack(0).unwrap(), -(6144 + 612));
    }

    #[test]
    fn test_new_implies_pending() {
        let entry = XrfEntry::unpack(7268, 0);
        assert!(entry.flag.is_new());
        assert!(entry.flag.is_pending());
        assert_eq!(entry.position, Position::new(3, 100));
    }

    #[test]
    fn test_zero_word_is_tombstone() {
        assert!(XrfEntry::unpack(0, 4).is_tombstone());
    }

    #[test]
    fn test_capacity_exceeded() {
        let entry = XrfEntry::active(Position::new(1 << 20, 0), XrfFlag::Normal);
        let err = entry.pack(0).unwrap_err();
        assert_eq!(err.code(), crate::errors::MstErrorCode::Capacity);
        assert!(entry.pack(1).is_ok());
    }

    #[test]
    fn test_misaligned_offset_rejected() {
        let entry = XrfEntry::active(Position::new(2, 6), XrfFlag::Normal);
        assert!(entry.pack(2).is_err());
        assert!(entry.pack(1).is_ok());
    }

    #[test]
    fn test_capacity_per_shift() {
        assert_eq!(XrfEntry::capacity_bytes(0), 512 * 1024 * 1024);
        assert_eq!(XrfEntry::capacity_bytes(9), 256 * 1024 * 1024 * 1024);
    }
}
